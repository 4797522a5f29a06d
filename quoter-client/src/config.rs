use std::time::Duration;

use quoter_common::models::{Protocol, QuoteType};

/// Engine wide timing and routing settings.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    stale_time: Duration,
    gc_time: Duration,
    price_poll_interval: Duration,
    trade_poll_interval: Duration,
    remote_timeout: Duration,
    protocols: Vec<Protocol>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(10),
            gc_time: Duration::from_secs(5 * 60),
            price_poll_interval: Duration::from_secs(2 * 60),
            trade_poll_interval: Duration::from_secs(15),
            remote_timeout: Duration::from_secs(15),
            protocols: Protocol::SUPPORTED.to_vec(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Age after which a cached result is refreshed when a subscriber attaches.
    pub fn stale_time(&self) -> Duration {
        self.stale_time
    }

    /// How long an entry without subscribers stays cached.
    pub fn gc_time(&self) -> Duration {
        self.gc_time
    }

    pub fn price_poll_interval(&self) -> Duration {
        self.price_poll_interval
    }

    pub fn trade_poll_interval(&self) -> Duration {
        self.trade_poll_interval
    }

    /// Upper bound for a single routing service request before falling back.
    pub fn remote_timeout(&self) -> Duration {
        self.remote_timeout
    }

    pub fn protocols(&self) -> &[Protocol] {
        &self.protocols
    }

    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    pub fn with_gc_time(mut self, gc_time: Duration) -> Self {
        self.gc_time = gc_time;
        self
    }

    pub fn with_price_poll_interval(mut self, interval: Duration) -> Self {
        self.price_poll_interval = interval;
        self
    }

    pub fn with_trade_poll_interval(mut self, interval: Duration) -> Self {
        self.trade_poll_interval = interval;
        self
    }

    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    pub fn with_protocols(mut self, protocols: Vec<Protocol>) -> Self {
        self.protocols = protocols;
        self
    }

    /// Refresh interval of a quote.
    ///
    /// Quotes without an amount are never polled, neither are `Skip` quotes.
    pub fn polling_interval(
        &self,
        amount_specified: bool,
        quote_type: QuoteType,
    ) -> Option<Duration> {
        if !amount_specified {
            return None;
        }
        match quote_type {
            QuoteType::Price => Some(self.price_poll_interval),
            QuoteType::Trade => Some(self.trade_poll_interval),
            QuoteType::Skip => None,
        }
    }
}
