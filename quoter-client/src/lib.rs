//! Swap quote resolution.
//!
//! Quotes are resolved by the routing service first and by a client side router when the service
//! cannot answer. Results are cached per request fingerprint, shared between subscribers, refreshed
//! on a poll interval and gated on the latest block before they are shown as valid trades.
pub mod args;
pub mod blocks;
pub mod cache;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod freshness;
pub mod local;
pub mod multicall;
pub mod quote;
pub mod resolver;
pub mod rpc;
pub mod scheduler;
pub mod source;
pub mod trade;
pub mod transform;

#[cfg(test)]
pub(crate) mod testing;

pub use args::{build_request, Fingerprint, QuoteConfig, QuoteRequest, SwapInputs};
pub use engine::{EngineError, QuoteEngine, QuoteEngineBuilder};
pub use error::QuoteError;
pub use quote::{QuoteResult, TradeResult, TradeState};
pub use rpc::{HttpRoutingClient, RoutingClient};
pub use trade::{RouterTrade, TradeSubscription, TradeView};
