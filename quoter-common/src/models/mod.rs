pub mod token;
pub mod trade;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// EIP-155 chain identifier.
pub type ChainId = u64;

/// Whether the specified amount is the exact input or the exact output of a swap.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TradeType {
    #[default]
    ExactInput,
    ExactOutput,
}

impl TradeType {
    pub fn is_exact_input(&self) -> bool {
        matches!(self, TradeType::ExactInput)
    }
}

/// Which quote source a request prefers.
///
/// `Api` tries the routing service first and falls back to client side routing. `ClientSide`
/// only routes locally. `Skip` marks requests that must never be polled.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RouterPreference {
    #[default]
    Api,
    ClientSide,
    Skip,
}

/// The intent behind a quote, which decides how often it is refreshed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum QuoteType {
    /// Informational pricing, refreshed rarely.
    Price,
    /// A quote the user is about to execute.
    #[default]
    Trade,
    Skip,
}

/// Liquidity protocols a route may use.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Protocol {
    V2,
    V3,
    Mixed,
}

impl Protocol {
    /// Protocols the engine quotes against, in the order sent to the routing service.
    pub const SUPPORTED: [Protocol; 3] = [Protocol::V2, Protocol::V3, Protocol::Mixed];

    /// Comma separated lowercase list, as expected by the routing service.
    pub fn csv(protocols: &[Protocol]) -> String {
        protocols
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}
