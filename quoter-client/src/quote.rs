use quoter_common::models::trade::InterfaceTrade;
use serde::{Deserialize, Serialize};

use crate::error::QuoteError;

/// A routed trade together with the block it was priced at.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeResult {
    pub trade: InterfaceTrade,
    pub gas_use_estimate_usd: Option<f64>,
    pub block_number: u64,
}

/// Outcome of resolving a quote request.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum QuoteResult {
    Success(TradeResult),
    /// The pair cannot be routed. This is an answer, not an error.
    NotFound,
    /// Nothing usable yet.
    #[default]
    Loading,
    Error(QuoteError),
}

impl QuoteResult {
    pub fn is_error(&self) -> bool {
        matches!(self, QuoteResult::Error(_))
    }

    /// Success and not found are both final answers that may be cached.
    pub fn is_settled(&self) -> bool {
        matches!(self, QuoteResult::Success(_) | QuoteResult::NotFound)
    }

    pub fn as_success(&self) -> Option<&TradeResult> {
        match self {
            QuoteResult::Success(result) => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&QuoteError> {
        match self {
            QuoteResult::Error(err) => Some(err),
            _ => None,
        }
    }
}

/// A definitive "no route" ends up as `NotFound`, every other error as `Error`.
impl From<Result<TradeResult, QuoteError>> for QuoteResult {
    fn from(result: Result<TradeResult, QuoteError>) -> Self {
        match result {
            Ok(trade) => QuoteResult::Success(trade),
            Err(QuoteError::NoRoute) => QuoteResult::NotFound,
            Err(err) => QuoteResult::Error(err),
        }
    }
}

/// State of a trade as presented to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeState {
    Invalid,
    NoRouteFound,
    Loading,
    Valid,
}
