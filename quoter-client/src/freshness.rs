//! Block based freshness of quotes.
//!
//! A quote priced at an older block than the chain's latest known block is shown as loading, but
//! its trade is kept so it can still be displayed. This gate never discards or refetches anything,
//! time based refreshes are the scheduler's job.
use crate::quote::{QuoteResult, TradeState};

/// Whether a quote priced at `block_number` is current. An unknown latest block is never current.
pub fn is_current(block_number: u64, latest_block: Option<u64>) -> bool {
    latest_block.is_some_and(|latest| block_number >= latest)
}

pub fn gate(result: &QuoteResult, latest_block: Option<u64>) -> TradeState {
    match result {
        QuoteResult::Success(trade) if is_current(trade.block_number, latest_block) => {
            TradeState::Valid
        }
        QuoteResult::Success(_) | QuoteResult::Loading => TradeState::Loading,
        QuoteResult::NotFound => TradeState::NoRouteFound,
        QuoteResult::Error(_) => TradeState::Invalid,
    }
}
