use std::{str::FromStr, sync::Arc, time::Duration};

use clap::Parser;
use quoter_common::{
    models::{
        token::{Currency, CurrencyAmount},
        ChainId, QuoteType, RouterPreference, TradeType,
    },
    Address,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};
use tracing_appender::rolling;

use crate::{
    args::{QuoteConfig, SwapInputs},
    config::EngineConfig,
    engine::QuoteEngineBuilder,
    events::{ChannelObserver, QuoteEvent},
};

/// Quoter CLI - Resolves a swap quote and follows it as it is refreshed
///
/// Quotes are requested from the routing service and printed as JSON lines, one per update of
/// the trade state.
#[derive(Parser, Debug, Clone, PartialEq)]
#[clap(version = env!("CARGO_PKG_VERSION"))]
struct CliArgs {
    /// Routing service base URL. Example: https://api.example.com/v2
    #[clap(long, env = "QUOTER_ROUTER_URL")]
    router_url: Option<String>,

    /// JSON-RPC node used to follow the latest block.
    #[clap(long, env = "QUOTER_RPC_URL")]
    rpc_url: Option<String>,

    /// EIP-155 chain id of both tokens
    #[clap(short = 'c', long, default_value = "1")]
    chain_id: ChainId,

    /// Address of the token to sell
    #[clap(long)]
    token_in: String,

    #[clap(long, default_value = "18")]
    token_in_decimals: u8,

    /// Address of the token to buy
    #[clap(long)]
    token_out: String,

    #[clap(long, default_value = "18")]
    token_out_decimals: u8,

    /// Human readable amount, e.g. "1.5". Denominated in the input token unless --exact-output
    /// is set.
    #[clap(short = 'a', long)]
    amount: Option<String>,

    /// Quote the amount as the exact output of the swap.
    #[clap(long)]
    exact_output: bool,

    /// One of price, trade or skip. Decides how often the quote is refreshed.
    #[clap(long, default_value = "trade")]
    quote_type: String,

    /// Only route client side.
    #[clap(long)]
    client_side: bool,

    /// Seconds between two latest block requests.
    #[clap(long, default_value = "12")]
    block_poll_interval: u64,

    /// Maximum amount of updates to print before exiting.
    #[clap(short='n', long, default_value=None)]
    max_updates: Option<usize>,

    /// Logging folder path.
    #[clap(long, default_value = "logs")]
    log_folder: String,

    /// Enable verbose logging. This will show every resolution and cache decision.
    #[clap(long)]
    verbose: bool,
}

impl CliArgs {
    fn validate(&self) -> Result<(), String> {
        if self.block_poll_interval == 0 {
            return Err("block_poll_interval must be greater than zero".to_string());
        }
        if self.token_in.eq_ignore_ascii_case(&self.token_out) {
            return Err("token_in and token_out must differ".to_string());
        }
        Ok(())
    }

    fn trade_type(&self) -> TradeType {
        if self.exact_output {
            TradeType::ExactOutput
        } else {
            TradeType::ExactInput
        }
    }

    fn quote_config(&self) -> Result<QuoteConfig, String> {
        let quote_type = QuoteType::from_str(&self.quote_type)
            .map_err(|_| format!("Unknown quote type: {}", self.quote_type))?;
        let preference =
            if self.client_side { RouterPreference::ClientSide } else { RouterPreference::Api };
        Ok(QuoteConfig::new(quote_type, preference))
    }

    fn swap_inputs(&self) -> Result<SwapInputs, String> {
        let currency_in = currency(self.chain_id, &self.token_in, self.token_in_decimals)?;
        let currency_out = currency(self.chain_id, &self.token_out, self.token_out_decimals)?;
        let specified =
            if self.exact_output { currency_out.clone() } else { currency_in.clone() };
        let amount = self
            .amount
            .as_deref()
            .map(|amount| {
                CurrencyAmount::parse(specified, amount)
                    .map_err(|e| format!("Invalid amount {amount}: {e}"))
            })
            .transpose()?;
        Ok(SwapInputs::new(self.trade_type(), amount, Some(currency_in), Some(currency_out)))
    }
}

fn currency(chain_id: ChainId, address: &str, decimals: u8) -> Result<Currency, String> {
    let address =
        Address::from_str(address).map_err(|e| format!("Invalid token address {address}: {e}"))?;
    Ok(Currency::new(chain_id, address, decimals))
}

pub async fn run_cli() -> Result<(), String> {
    // Parse CLI Args
    let args: CliArgs = CliArgs::parse();
    args.validate()?;

    // Setup Logging
    let log_level = if args.verbose { "debug" } else { "info" };
    let (non_blocking, _guard) =
        tracing_appender::non_blocking(rolling::never(&args.log_folder, "dev_logs.log"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(non_blocking)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to set up logging subscriber: {e}"))?;

    run(args).await
}

async fn run(args: CliArgs) -> Result<(), String> {
    let inputs = args.swap_inputs()?;
    let quote_config = args.quote_config()?;
    if args.client_side {
        warn!("No client side router is bundled with the CLI, every quote will fail");
    }

    let (observer, events) = ChannelObserver::new();
    let mut builder = QuoteEngineBuilder::new(EngineConfig::default())
        .chain_id(args.chain_id)
        .block_poll_interval(Duration::from_secs(args.block_poll_interval))
        .observer(Arc::new(observer));
    if let Some(router_url) = &args.router_url {
        builder = builder.router_url(router_url);
    }
    if let Some(rpc_url) = &args.rpc_url {
        builder = builder.rpc_url(rpc_url);
    }
    let engine = builder
        .build()
        .await
        .map_err(|e| format!("Failed to start quote engine: {e}"))?;

    let event_logger = tokio::spawn(log_events(events));

    let mut subscription = engine
        .router()
        .quote(&inputs, &quote_config);
    let mut printed = 0;
    let mut view = subscription.current();
    let result = loop {
        match serde_json::to_string(&view) {
            Ok(json) => println!("{json}"),
            // Log the error but keep following the quote.
            Err(e) => error!(error = %e, "Failed to serialize trade view"),
        }
        printed += 1;
        if args
            .max_updates
            .is_some_and(|max| printed >= max)
        {
            break Ok(());
        }
        match subscription.changed().await {
            Some(next) => view = next,
            None => break Err("Quote subscription closed".to_string()),
        }
    };

    debug!(printed, "Stopped following quote");
    event_logger.abort();
    result
}

async fn log_events(mut events: UnboundedReceiver<QuoteEvent>) {
    while let Some(event) = events.recv().await {
        match &event {
            QuoteEvent::ResolutionStarted { fingerprint } => {
                debug!(%fingerprint, "Resolution started");
            }
            QuoteEvent::ResolutionSucceeded { fingerprint, result } => {
                info!(%fingerprint, settled = result.is_settled(), "Resolution succeeded");
            }
            QuoteEvent::ResolutionFailed { fingerprint, error } => {
                warn!(%fingerprint, kind = %error.kind, message = %error.message, "Resolution failed");
            }
        }
    }
}
