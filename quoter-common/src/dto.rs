//! Data Transfer Objects (or structs)
//!
//! These structs serialise and deserialize messages exchanged with the routing service, they
//! should be very simple and ideally not contain any business logic.
use serde::{Deserialize, Serialize};

use crate::{models::ChainId, serde_primitives::number_or_string};

/// Error code the routing service returns when no route exists for a pair.
pub const NO_ROUTE_ERROR_CODE: &str = "NO_ROUTE";

/// Trade direction as spelled in the quote query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuoteQueryType {
    #[serde(rename = "exactIn")]
    ExactIn,
    #[serde(rename = "exactOut")]
    ExactOut,
}

/// Query parameters of `GET {router_url}/quote`.
///
/// Field order is the order the parameters appear in the query string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteQueryParams {
    pub protocols: String,
    pub token_in_address: String,
    pub token_in_chain_id: ChainId,
    pub token_out_address: String,
    pub token_out_chain_id: ChainId,
    pub amount: String,
    #[serde(rename = "type")]
    pub trade_type: QuoteQueryType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInRoute {
    pub address: String,
    #[serde(deserialize_with = "number_or_string::deserialize")]
    pub chain_id: u64,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(deserialize_with = "number_or_string::deserialize")]
    pub decimals: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveInRoute {
    pub token: TokenInRoute,
    pub quotient: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct V3PoolInRoute {
    #[serde(default)]
    pub address: Option<String>,
    pub token_in: TokenInRoute,
    pub token_out: TokenInRoute,
    #[serde(default)]
    pub sqrt_ratio_x96: Option<String>,
    #[serde(default)]
    pub liquidity: Option<String>,
    #[serde(default)]
    pub tick_current: Option<String>,
    #[serde(default)]
    pub fee: Option<String>,
    #[serde(default)]
    pub amount_in: Option<String>,
    #[serde(default)]
    pub amount_out: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct V2PoolInRoute {
    #[serde(default)]
    pub address: Option<String>,
    pub token_in: TokenInRoute,
    pub token_out: TokenInRoute,
    #[serde(default)]
    pub reserve0: Option<ReserveInRoute>,
    #[serde(default)]
    pub reserve1: Option<ReserveInRoute>,
    #[serde(default)]
    pub amount_in: Option<String>,
    #[serde(default)]
    pub amount_out: Option<String>,
}

/// One hop of a route as returned by the routing service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PoolInRoute {
    #[serde(rename = "v3-pool")]
    V3(V3PoolInRoute),
    #[serde(rename = "v2-pool")]
    V2(V2PoolInRoute),
}

impl PoolInRoute {
    pub fn token_in(&self) -> &TokenInRoute {
        match self {
            PoolInRoute::V3(p) => &p.token_in,
            PoolInRoute::V2(p) => &p.token_in,
        }
    }

    pub fn token_out(&self) -> &TokenInRoute {
        match self {
            PoolInRoute::V3(p) => &p.token_out,
            PoolInRoute::V2(p) => &p.token_out,
        }
    }

    pub fn amount_in(&self) -> Option<&str> {
        match self {
            PoolInRoute::V3(p) => p.amount_in.as_deref(),
            PoolInRoute::V2(p) => p.amount_in.as_deref(),
        }
    }

    pub fn amount_out(&self) -> Option<&str> {
        match self {
            PoolInRoute::V3(p) => p.amount_out.as_deref(),
            PoolInRoute::V2(p) => p.amount_out.as_deref(),
        }
    }

    pub fn address(&self) -> Option<&str> {
        match self {
            PoolInRoute::V3(p) => p.address.as_deref(),
            PoolInRoute::V2(p) => p.address.as_deref(),
        }
    }
}

/// Successful quote payload.
///
/// The local router produces the same shape so both sources share one transform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteData {
    #[serde(default)]
    pub quote_id: Option<String>,
    pub block_number: String,
    pub amount: String,
    #[serde(default)]
    pub amount_decimals: Option<String>,
    pub quote: String,
    #[serde(default)]
    pub quote_decimals: Option<String>,
    #[serde(default)]
    pub quote_gas_adjusted: Option<String>,
    #[serde(default)]
    pub gas_price_wei: Option<String>,
    #[serde(default)]
    pub gas_use_estimate: Option<String>,
    #[serde(default, rename = "gasUseEstimateUSD")]
    pub gas_use_estimate_usd: Option<String>,
    pub route: Vec<Vec<PoolInRoute>>,
    #[serde(default)]
    pub route_string: Option<String>,
}

/// Error body returned by the routing service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingErrorBody {
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl RoutingErrorBody {
    pub fn is_no_route(&self) -> bool {
        self.error_code.as_deref() == Some(NO_ROUTE_ERROR_CODE)
    }
}
