//! Conversion of raw quote payloads into trades.
//!
//! Both the routing service and the client side router answer with [`QuoteData`], this module
//! turns that into an [`InterfaceTrade`] and checks that the routes actually connect the requested
//! tokens.
use std::str::FromStr;

use quoter_common::{
    dto::{PoolInRoute, QuoteData, TokenInRoute},
    models::{
        trade::{InterfaceTrade, Pool, Route, RouteToken},
        Protocol,
    },
    Address, U256,
};
use thiserror::Error;

use crate::{args::QuoteRequest, quote::TradeResult};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TransformError {
    #[error("Quote contains no routes")]
    EmptyRoutes,
    #[error("Route {0} contains no pools")]
    EmptyRoute(usize),
    #[error("Route {index} does not {side} at the requested token")]
    Disconnected { index: usize, side: &'static str },
    #[error("Route {0} is missing amountIn or amountOut")]
    MissingAmounts(usize),
    #[error("Invalid {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

pub fn transform_quote(
    request: &QuoteRequest,
    data: QuoteData,
) -> Result<TradeResult, TransformError> {
    let block_number = data
        .block_number
        .trim()
        .parse::<u64>()
        .map_err(|_| invalid("blockNumber", &data.block_number))?;
    if data.route.is_empty() {
        return Err(TransformError::EmptyRoutes);
    }

    let routes = data
        .route
        .iter()
        .enumerate()
        .map(|(index, hops)| transform_route(request, index, hops))
        .collect::<Result<Vec<_>, _>>()?;

    // The USD estimate is informational, a garbled value is dropped rather than failing the quote.
    let gas_use_estimate_usd = data
        .gas_use_estimate_usd
        .as_deref()
        .and_then(|v| v.trim().parse::<f64>().ok());

    Ok(TradeResult {
        trade: InterfaceTrade::new(request.trade_type, routes),
        gas_use_estimate_usd,
        block_number,
    })
}

fn transform_route(
    request: &QuoteRequest,
    index: usize,
    hops: &[PoolInRoute],
) -> Result<Route, TransformError> {
    let (first, last) = match (hops.first(), hops.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(TransformError::EmptyRoute(index)),
    };

    let pools = hops
        .iter()
        .map(transform_pool)
        .collect::<Result<Vec<_>, _>>()?;

    if pools
        .first()
        .map(|p| p.token_in.address) !=
        Some(request.token_in.address)
    {
        return Err(TransformError::Disconnected { index, side: "start" });
    }
    if pools
        .last()
        .map(|p| p.token_out.address) !=
        Some(request.token_out.address)
    {
        return Err(TransformError::Disconnected { index, side: "end" });
    }

    let (input_amount, output_amount) = match (first.amount_in(), last.amount_out()) {
        (Some(amount_in), Some(amount_out)) => {
            (parse_amount("amountIn", amount_in)?, parse_amount("amountOut", amount_out)?)
        }
        _ => return Err(TransformError::MissingAmounts(index)),
    };

    let protocol = route_protocol(&pools);
    Ok(Route { protocol, pools, input_amount, output_amount })
}

fn transform_pool(pool: &PoolInRoute) -> Result<Pool, TransformError> {
    let (protocol, fee) = match pool {
        PoolInRoute::V3(p) => (
            Protocol::V3,
            p.fee
                .as_deref()
                .map(|fee| {
                    fee.trim()
                        .parse::<u32>()
                        .map_err(|_| invalid("fee", fee))
                })
                .transpose()?,
        ),
        PoolInRoute::V2(_) => (Protocol::V2, None),
    };
    Ok(Pool {
        protocol,
        address: pool
            .address()
            .map(|a| parse_address("pool address", a))
            .transpose()?,
        token_in: transform_token(pool.token_in())?,
        token_out: transform_token(pool.token_out())?,
        fee,
    })
}

fn transform_token(token: &TokenInRoute) -> Result<RouteToken, TransformError> {
    Ok(RouteToken {
        address: parse_address("token address", &token.address)?,
        chain_id: token.chain_id,
        symbol: token.symbol.clone(),
        decimals: u8::try_from(token.decimals)
            .map_err(|_| invalid("decimals", &token.decimals.to_string()))?,
    })
}

fn route_protocol(pools: &[Pool]) -> Protocol {
    if pools
        .iter()
        .all(|p| p.protocol == Protocol::V3)
    {
        Protocol::V3
    } else if pools
        .iter()
        .all(|p| p.protocol == Protocol::V2)
    {
        Protocol::V2
    } else {
        Protocol::Mixed
    }
}

fn parse_address(field: &'static str, value: &str) -> Result<Address, TransformError> {
    Address::from_str(value.trim()).map_err(|_| invalid(field, value))
}

fn parse_amount(field: &'static str, value: &str) -> Result<U256, TransformError> {
    U256::from_str_radix(value.trim(), 10).map_err(|_| invalid(field, value))
}

fn invalid(field: &'static str, value: &str) -> TransformError {
    TransformError::InvalidField { field, value: value.to_string() }
}
