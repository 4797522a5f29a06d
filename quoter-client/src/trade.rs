//! Consumer facing trade state.
//!
//! Combines a quote subscription with the latest block into a [`TradeView`]: the trade to show and
//! whether it is valid, still loading, unroutable or invalid.
use std::{sync::Arc, time::Duration};

use quoter_common::models::trade::InterfaceTrade;
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;
use url::Url;

use crate::{
    args::{build_request, QuoteConfig, QuoteRequest, SwapInputs},
    blocks::BlockTracker,
    config::EngineConfig,
    events::QuoteObserver,
    freshness::gate,
    quote::{QuoteResult, TradeState},
    scheduler::{QuoteScheduler, QuoteSubscription, QuoteView},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeView {
    pub state: TradeState,
    pub trade: Option<InterfaceTrade>,
    pub gas_use_estimate_usd: Option<f64>,
    /// Block the trade was priced at.
    pub block_number: Option<u64>,
}

impl TradeView {
    fn without_trade(state: TradeState) -> Self {
        Self { state, trade: None, gas_use_estimate_usd: None, block_number: None }
    }
}

/// Derives what to show from the current quote and the latest block.
pub fn derive_trade_view(
    amount_specified: bool,
    quote: &QuoteView,
    latest_block: Option<u64>,
) -> TradeView {
    if !amount_specified || quote.is_error() || quote.fingerprint.is_none() {
        return TradeView::without_trade(TradeState::Invalid);
    }
    match &quote.result {
        QuoteResult::NotFound => TradeView::without_trade(TradeState::NoRouteFound),
        QuoteResult::Success(result) => TradeView {
            state: gate(&quote.result, latest_block),
            trade: Some(result.trade.clone()),
            gas_use_estimate_usd: result.gas_use_estimate_usd,
            block_number: Some(result.block_number),
        },
        QuoteResult::Loading | QuoteResult::Error(_) => {
            TradeView::without_trade(TradeState::Loading)
        }
    }
}

/// Entry point for trade quotes.
#[derive(Clone)]
pub struct RouterTrade {
    scheduler: QuoteScheduler,
    blocks: BlockTracker,
    config: EngineConfig,
    router_url: Option<Url>,
    observer: Option<Arc<dyn QuoteObserver>>,
}

impl RouterTrade {
    pub fn new(
        scheduler: QuoteScheduler,
        blocks: BlockTracker,
        config: EngineConfig,
        router_url: Option<Url>,
    ) -> Self {
        Self { scheduler, blocks, config, router_url, observer: None }
    }

    /// Attaches an observer to every request made through this instance.
    pub fn with_observer(mut self, observer: Arc<dyn QuoteObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn scheduler(&self) -> &QuoteScheduler {
        &self.scheduler
    }

    pub fn blocks(&self) -> &BlockTracker {
        &self.blocks
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Subscribes to the best trade for `inputs`.
    pub fn quote(&self, inputs: &SwapInputs, quote_config: &QuoteConfig) -> TradeSubscription {
        let (request, poll_interval, amount_specified) = self.prepare(inputs, quote_config);
        TradeSubscription {
            router: self.clone(),
            quote: self
                .scheduler
                .use_quote(request, poll_interval),
            blocks: self.blocks.subscribe(),
            amount_specified,
        }
    }

    fn prepare(
        &self,
        inputs: &SwapInputs,
        quote_config: &QuoteConfig,
    ) -> (Option<QuoteRequest>, Option<Duration>, bool) {
        let request =
            build_request(inputs, quote_config, self.router_url.as_ref()).map(|request| {
                match &self.observer {
                    Some(observer) => request.with_observer(observer.clone()),
                    None => request,
                }
            });
        let amount_specified = inputs.amount_specified.is_some();
        let poll_interval = self
            .config
            .polling_interval(amount_specified, quote_config.quote_type);
        debug!(
            has_request = request.is_some(),
            ?poll_interval,
            quote_type = %quote_config.quote_type,
            "Prepared trade quote"
        );
        (request, poll_interval, amount_specified)
    }
}

pub struct TradeSubscription {
    router: RouterTrade,
    quote: QuoteSubscription,
    blocks: watch::Receiver<Option<u64>>,
    amount_specified: bool,
}

impl TradeSubscription {
    pub fn current(&self) -> TradeView {
        derive_trade_view(self.amount_specified, &self.quote.current(), *self.blocks.borrow())
    }

    /// Waits for a new quote or a new block and returns the resulting view.
    ///
    /// Returns `None` once the engine has shut down.
    pub async fn changed(&mut self) -> Option<TradeView> {
        tokio::select! {
            res = self.quote.changed() => {
                res.ok()?;
            }
            res = self.blocks.changed() => {
                res.ok()?;
                self.blocks.borrow_and_update();
            }
        }
        Some(self.current())
    }

    /// Re-targets the subscription to new inputs.
    pub fn update(&mut self, inputs: &SwapInputs, quote_config: &QuoteConfig) {
        let (request, poll_interval, amount_specified) = self.router.prepare(inputs, quote_config);
        self.amount_specified = amount_specified;
        self.quote
            .update(request, poll_interval);
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use quoter_common::models::{token::CurrencyAmount, QuoteType, RouterPreference, TradeType};

    use super::*;
    use crate::{
        cache::QueryCache,
        error::QuoteError,
        resolver::MockQuoteResolver,
        testing::{quote_data, request, usdc, weth},
        transform::transform_quote,
    };

    fn success_view(block_number: u64) -> QuoteView {
        let request = request(10, RouterPreference::Api);
        QuoteView {
            fingerprint: Some(request.fingerprint()),
            result: QuoteResult::Success(
                transform_quote(&request, quote_data(block_number, 10, 5)).unwrap(),
            ),
        }
    }

    fn view(result: QuoteResult) -> QuoteView {
        QuoteView { fingerprint: Some(request(10, RouterPreference::Api).fingerprint()), result }
    }

    #[test]
    fn test_no_amount_is_invalid() {
        assert_eq!(derive_trade_view(false, &success_view(1), Some(1)).state, TradeState::Invalid);
    }

    #[test]
    fn test_error_is_invalid() {
        let quote = view(QuoteResult::Error(QuoteError::transient_msg("timeout")));

        assert_eq!(derive_trade_view(true, &quote, Some(1)), TradeView::without_trade(TradeState::Invalid));
    }

    #[test]
    fn test_no_request_is_invalid() {
        let quote = QuoteView { fingerprint: None, result: QuoteResult::Loading };

        assert_eq!(derive_trade_view(true, &quote, Some(1)).state, TradeState::Invalid);
    }

    #[test]
    fn test_not_found() {
        let quote = view(QuoteResult::NotFound);

        assert_eq!(derive_trade_view(true, &quote, Some(1)).state, TradeState::NoRouteFound);
    }

    #[test]
    fn test_loading_without_trade() {
        let quote = view(QuoteResult::Loading);

        assert_eq!(derive_trade_view(true, &quote, Some(1)), TradeView::without_trade(TradeState::Loading));
    }

    #[test]
    fn test_valid_and_behind_keep_trade() {
        let valid = derive_trade_view(true, &success_view(100), Some(100));
        let behind = derive_trade_view(true, &success_view(99), Some(100));

        assert_eq!(valid.state, TradeState::Valid);
        assert_eq!(valid.gas_use_estimate_usd, Some(2.5));
        assert_eq!(behind.state, TradeState::Loading);
        assert_eq!(behind.trade, valid.trade);
        assert_eq!(behind.block_number, Some(99));
    }

    #[tokio::test(start_paused = true)]
    async fn test_router_trade_follows_blocks() {
        let mut resolver = MockQuoteResolver::new();
        resolver
            .expect_resolve()
            .times(1)
            .returning(|request| {
                QuoteResult::Success(transform_quote(request, quote_data(50, 1_000_000, 9)).unwrap())
            });
        let config = EngineConfig::default();
        let cache = QueryCache::new("test", config.stale_time(), config.gc_time());
        let scheduler = QuoteScheduler::new(Arc::new(cache), Arc::new(resolver));
        let blocks = BlockTracker::new(1);
        blocks.update(50);
        let router = RouterTrade::new(scheduler, blocks.clone(), config, None);
        let inputs = SwapInputs::new(
            TradeType::ExactInput,
            Some(CurrencyAmount::parse(usdc(), "1").unwrap()),
            Some(usdc()),
            Some(weth()),
        );

        let mut sub = router.quote(&inputs, &QuoteConfig::new(QuoteType::Skip, RouterPreference::Api));
        assert_eq!(sub.current().state, TradeState::Loading);

        let valid = sub.changed().await.unwrap();
        assert_eq!(valid.state, TradeState::Valid);

        blocks.update(51);
        let behind = sub.changed().await.unwrap();
        assert_eq!(behind.state, TradeState::Loading);
        assert!(behind.trade.is_some());

        sub.update(&SwapInputs { currency_out: None, ..inputs }, &QuoteConfig::default());
        assert_eq!(sub.current().state, TradeState::Invalid);
    }
}
