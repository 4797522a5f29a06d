//! Priced trade routes as consumed by the engine's callers.
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use super::{ChainId, Protocol, TradeType};
use crate::serde_primitives::u256_dec;

/// Token as reported inside a route.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteToken {
    pub address: Address,
    pub chain_id: ChainId,
    pub symbol: Option<String>,
    pub decimals: u8,
}

/// A single hop of a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub protocol: Protocol,
    pub address: Option<Address>,
    pub token_in: RouteToken,
    pub token_out: RouteToken,
    /// Fee tier in hundredths of a basis point, only known for v3 pools.
    pub fee: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub protocol: Protocol,
    pub pools: Vec<Pool>,
    #[serde(with = "u256_dec")]
    pub input_amount: U256,
    #[serde(with = "u256_dec")]
    pub output_amount: U256,
}

impl Route {
    /// Token addresses visited by this route, input first.
    pub fn path(&self) -> Vec<Address> {
        let mut path: Vec<Address> = self
            .pools
            .first()
            .map(|p| p.token_in.address)
            .into_iter()
            .collect();
        path.extend(
            self.pools
                .iter()
                .map(|p| p.token_out.address),
        );
        path
    }
}

/// A trade split over one or more routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceTrade {
    pub trade_type: TradeType,
    pub routes: Vec<Route>,
}

impl InterfaceTrade {
    pub fn new(trade_type: TradeType, routes: Vec<Route>) -> Self {
        Self { trade_type, routes }
    }

    pub fn input_amount(&self) -> U256 {
        self.routes
            .iter()
            .fold(U256::ZERO, |acc, r| acc.saturating_add(r.input_amount))
    }

    pub fn output_amount(&self) -> U256 {
        self.routes
            .iter()
            .fold(U256::ZERO, |acc, r| acc.saturating_add(r.output_amount))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn token(byte: u8) -> RouteToken {
        RouteToken {
            address: Address::repeat_byte(byte),
            chain_id: 1,
            symbol: None,
            decimals: 18,
        }
    }

    fn route(input: u64, output: u64, hops: &[u8]) -> Route {
        let pools = hops
            .windows(2)
            .map(|w| Pool {
                protocol: Protocol::V3,
                address: None,
                token_in: token(w[0]),
                token_out: token(w[1]),
                fee: Some(500),
            })
            .collect();
        Route {
            protocol: Protocol::V3,
            pools,
            input_amount: U256::from(input),
            output_amount: U256::from(output),
        }
    }

    #[test]
    fn test_trade_amounts_sum_routes() {
        let trade = InterfaceTrade::new(
            TradeType::ExactInput,
            vec![route(60, 30, &[1, 2]), route(40, 21, &[1, 3, 2])],
        );

        assert_eq!(trade.input_amount(), U256::from(100u64));
        assert_eq!(trade.output_amount(), U256::from(51u64));
    }

    #[test]
    fn test_route_path() {
        let r = route(1, 1, &[1, 3, 2]);

        assert_eq!(
            r.path(),
            vec![Address::repeat_byte(1), Address::repeat_byte(3), Address::repeat_byte(2)]
        );
    }
}
