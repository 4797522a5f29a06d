//! Fixtures shared by the unit tests of this crate.
use quoter_common::{
    dto::QuoteData,
    models::{token::Currency, RouterPreference, TradeType},
    Address, U256,
};
use url::Url;

use crate::args::{QuoteRequest, TokenRef};

pub fn usdc() -> Currency {
    Currency::new(1, Address::repeat_byte(0xa0), 6).with_symbol("USDC")
}

pub fn weth() -> Currency {
    Currency::new(1, Address::repeat_byte(0xc0), 18).with_symbol("WETH")
}

pub fn dai() -> Currency {
    Currency::new(1, Address::repeat_byte(0x6b), 18).with_symbol("DAI")
}

/// An exact input USDC -> WETH request for `amount` raw units.
pub fn request(amount: u64, preference: RouterPreference) -> QuoteRequest {
    QuoteRequest::new(
        TradeType::ExactInput,
        Some(U256::from(amount)),
        TokenRef::from(&usdc()),
        TokenRef::from(&weth()),
        preference,
    )
}

pub fn remote_request(amount: u64, router_url: &str) -> QuoteRequest {
    request(amount, RouterPreference::Api)
        .with_router_url(Url::parse(router_url).expect("valid url"))
}

/// Routing service payload for a single hop USDC -> WETH v3 route.
pub fn quote_json(block_number: u64, amount_in: u64, amount_out: u64) -> String {
    format!(
        r#"{{
            "blockNumber": "{block_number}",
            "amount": "{amount_in}",
            "quote": "{amount_out}",
            "gasUseEstimateUSD": "2.5",
            "route": [[
                {{
                    "type": "v3-pool",
                    "address": "0x8888888888888888888888888888888888888888",
                    "tokenIn": {{"address": "0xa0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0", "chainId": 1, "symbol": "USDC", "decimals": "6"}},
                    "tokenOut": {{"address": "0xc0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0", "chainId": 1, "symbol": "WETH", "decimals": "18"}},
                    "fee": "500",
                    "amountIn": "{amount_in}",
                    "amountOut": "{amount_out}"
                }}
            ]]
        }}"#
    )
}

pub fn quote_data(block_number: u64, amount_in: u64, amount_out: u64) -> QuoteData {
    serde_json::from_str(&quote_json(block_number, amount_in, amount_out)).expect("valid quote")
}
