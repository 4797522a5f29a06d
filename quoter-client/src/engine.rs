use std::{sync::Arc, time::Duration};

use quoter_common::models::ChainId;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use url::Url;

use crate::{
    blocks::{BlockProviderError, BlockTracker, JsonRpcBlockProvider},
    cache::QueryCache,
    config::EngineConfig,
    events::QuoteObserver,
    local::{ClientSideRouter, DisabledRouter},
    resolver::Resolver,
    rpc::{HttpRoutingClient, HttpRoutingClientOptions, RoutingClient, RoutingError},
    scheduler::QuoteScheduler,
    source::{LocalQuoteSource, RemoteQuoteSource},
    trade::RouterTrade,
};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Error during engine set up: {0}")]
    SetUpError(String),

    #[error("Routing client error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Block provider error: {0}")]
    BlockProvider(#[from] BlockProviderError),
}

/// A running engine. Dropping it stops its background tasks.
pub struct QuoteEngine {
    router: RouterTrade,
    tasks: Vec<JoinHandle<()>>,
}

impl QuoteEngine {
    pub fn router(&self) -> &RouterTrade {
        &self.router
    }

    pub fn scheduler(&self) -> &QuoteScheduler {
        self.router.scheduler()
    }

    pub fn blocks(&self) -> &BlockTracker {
        self.router.blocks()
    }
}

impl Drop for QuoteEngine {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

pub struct QuoteEngineBuilder {
    config: EngineConfig,
    chain_id: ChainId,
    router_url: Option<String>,
    rpc_url: Option<String>,
    block_poll_interval: Duration,
    routing_client: Option<Arc<dyn RoutingClient>>,
    local_router: Arc<dyn ClientSideRouter>,
    observer: Option<Arc<dyn QuoteObserver>>,
    cache_name: String,
}

impl QuoteEngineBuilder {
    /// Creates a builder for mainnet without a routing service, block source or local router.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            chain_id: 1,
            router_url: None,
            rpc_url: None,
            block_poll_interval: Duration::from_secs(12),
            routing_client: None,
            local_router: Arc::new(DisabledRouter),
            observer: None,
            cache_name: "quotes".to_string(),
        }
    }

    /// Base url of the routing service. Requests are only sent remotely when this is set.
    pub fn router_url(mut self, router_url: &str) -> Self {
        self.router_url = Some(router_url.to_string());
        self
    }

    pub fn chain_id(mut self, chain_id: ChainId) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// JSON-RPC node polled for the latest block.
    ///
    /// Without it the latest block is unknown until it is reported through
    /// [`QuoteEngine::blocks`], and every trade stays loading.
    pub fn rpc_url(mut self, rpc_url: &str) -> Self {
        self.rpc_url = Some(rpc_url.to_string());
        self
    }

    pub fn block_poll_interval(mut self, interval: Duration) -> Self {
        self.block_poll_interval = interval;
        self
    }

    /// Replaces the default HTTP routing client.
    pub fn routing_client(mut self, client: Arc<dyn RoutingClient>) -> Self {
        self.routing_client = Some(client);
        self
    }

    pub fn local_router(mut self, router: Arc<dyn ClientSideRouter>) -> Self {
        self.local_router = router;
        self
    }

    /// Receives lifecycle events of every quote requested through the engine.
    pub fn observer(mut self, observer: Arc<dyn QuoteObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Name of the quote cache, used to label its metrics.
    pub fn cache_name(mut self, name: &str) -> Self {
        self.cache_name = name.to_string();
        self
    }

    /// Wires up the engine and starts its background tasks.
    pub async fn build(self) -> Result<QuoteEngine, EngineError> {
        info!("Running with version: {}", option_env!("CARGO_PKG_VERSION").unwrap_or("unknown"));

        let router_url = self
            .router_url
            .as_deref()
            .map(|url| {
                Url::parse(url)
                    .map_err(|e| EngineError::SetUpError(format!("Invalid router url {url}: {e}")))
            })
            .transpose()?;
        if router_url.is_none() {
            info!("No routing service configured, quoting client side only");
        }

        let routing_client = match self.routing_client {
            Some(client) => client,
            None => Arc::new(HttpRoutingClient::new(
                HttpRoutingClientOptions::new()
                    .with_protocols(self.config.protocols().to_vec())
                    .with_timeout(Some(self.config.remote_timeout())),
            )?),
        };
        let resolver = Resolver::new(
            RemoteQuoteSource::new(routing_client, self.config.remote_timeout()),
            LocalQuoteSource::new(self.local_router, self.config.protocols().to_vec()),
        );

        let cache = Arc::new(QueryCache::new(
            &self.cache_name,
            self.config.stale_time(),
            self.config.gc_time(),
        ));
        let mut tasks = vec![cache.spawn_gc(gc_period(self.config.gc_time()))];

        let blocks = BlockTracker::new(self.chain_id);
        match self.rpc_url.as_deref() {
            Some(rpc_url) => {
                let provider = JsonRpcBlockProvider::new(rpc_url)?;
                tasks.push(blocks.spawn_poller(provider, self.block_poll_interval));
            }
            None => {
                warn!(chain_id = self.chain_id, "No block source configured, trades stay loading until blocks are reported");
            }
        }

        let scheduler = QuoteScheduler::new(cache, Arc::new(resolver));
        let mut router = RouterTrade::new(scheduler, blocks, self.config, router_url);
        if let Some(observer) = self.observer {
            router = router.with_observer(observer);
        }
        Ok(QuoteEngine { router, tasks })
    }
}

/// Sweeps run twice per gc period so entries are evicted at most half a period late.
fn gc_period(gc_time: Duration) -> Duration {
    (gc_time / 2).max(Duration::from_secs(1))
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use quoter_common::models::{token::CurrencyAmount, QuoteType, RouterPreference, TradeType};

    use super::*;
    use crate::{
        args::{QuoteConfig, SwapInputs},
        events::ChannelObserver,
        local::MockClientSideRouter,
        quote::TradeState,
        rpc::{MockRoutingClient, RemoteQuote},
        testing::{quote_data, usdc, weth},
    };

    fn inputs() -> SwapInputs {
        SwapInputs::new(
            TradeType::ExactInput,
            Some(CurrencyAmount::parse(usdc(), "1").unwrap()),
            Some(usdc()),
            Some(weth()),
        )
    }

    #[tokio::test]
    async fn test_invalid_router_url() {
        let res = QuoteEngineBuilder::new(EngineConfig::default())
            .router_url("not a url")
            .build()
            .await;

        assert!(matches!(res, Err(EngineError::SetUpError(_))));
    }

    #[tokio::test]
    async fn test_invalid_rpc_url() {
        let res = QuoteEngineBuilder::new(EngineConfig::default())
            .rpc_url("::")
            .build()
            .await;

        assert!(matches!(res, Err(EngineError::BlockProvider(BlockProviderError::UrlParsing(..)))));
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_engine_quotes_through_routing_service() {
        let mut client = MockRoutingClient::new();
        client
            .expect_get_quote()
            .withf(|request| {
                request
                    .router_url
                    .as_ref()
                    .map(Url::as_str) ==
                    Some("https://routing.example.com/v2/")
            })
            .returning(|_| Ok(RemoteQuote::Quote(quote_data(42, 1_000_000, 7))));
        let mut local = MockClientSideRouter::new();
        local.expect_compute_route().never();
        let (observer, mut events) = ChannelObserver::new();

        let engine = QuoteEngineBuilder::new(EngineConfig::default())
            .router_url("https://routing.example.com/v2")
            .routing_client(Arc::new(client))
            .local_router(Arc::new(local))
            .observer(Arc::new(observer))
            .build()
            .await
            .unwrap();
        engine.blocks().update(42);

        let mut sub = engine
            .router()
            .quote(&inputs(), &QuoteConfig::new(QuoteType::Trade, RouterPreference::Api));
        let view = sub.changed().await.unwrap();

        assert_eq!(view.state, TradeState::Valid);
        assert_eq!(view.block_number, Some(42));
        let started = events.recv().await.unwrap();
        let finished = events.recv().await.unwrap();
        assert!(!started.is_terminal());
        assert!(finished.is_terminal());
    }

    #[test]
    fn test_gc_period() {
        assert_eq!(gc_period(Duration::from_secs(300)), Duration::from_secs(150));
        assert_eq!(gc_period(Duration::ZERO), Duration::from_secs(1));
    }
}
