use std::{
    fmt,
    hash::{Hash, Hasher},
};

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ChainId;
use crate::serde_primitives::u256_dec;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("Amount is empty")]
    Empty,
    #[error("Invalid character in amount: {0}")]
    InvalidDigit(String),
    #[error("Amount has more than {0} decimal places")]
    ExcessPrecision(u8),
    #[error("Amount does not fit into 256 bits")]
    Overflow,
}

/// A fungible currency on a specific chain.
///
/// Two currencies are the same if they live on the same chain at the same address, symbol and
/// decimals are metadata only.
#[derive(Debug, Clone, Deserialize, Serialize, Eq)]
pub struct Currency {
    pub chain_id: ChainId,
    pub address: Address,
    pub decimals: u8,
    pub symbol: Option<String>,
}

impl Currency {
    pub fn new(chain_id: ChainId, address: Address, decimals: u8) -> Self {
        Self { chain_id, address, decimals, symbol: None }
    }

    pub fn with_symbol(mut self, symbol: &str) -> Self {
        self.symbol = Some(symbol.to_string());
        self
    }

    /// Lowercase, `0x` prefixed hex representation of the address.
    pub fn address_hex(&self) -> String {
        format!("0x{}", hex::encode(self.address.as_slice()))
    }
}

impl PartialEq for Currency {
    fn eq(&self, other: &Self) -> bool {
        self.chain_id == other.chain_id && self.address == other.address
    }
}

impl Hash for Currency {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.chain_id.hash(state);
        self.address.hash(state);
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.symbol {
            Some(symbol) => write!(f, "{symbol}"),
            None => write!(f, "{}:{}", self.chain_id, self.address_hex()),
        }
    }
}

/// An amount of a currency, stored in the currency's smallest unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct CurrencyAmount {
    pub currency: Currency,
    #[serde(with = "u256_dec")]
    pub raw: U256,
}

impl CurrencyAmount {
    pub fn from_raw(currency: Currency, raw: U256) -> Self {
        Self { currency, raw }
    }

    /// Parses a human readable decimal amount (e.g. `"1.5"`) into smallest units.
    ///
    /// Fractional digits beyond the currency's decimals are rejected rather than truncated.
    pub fn parse(currency: Currency, value: &str) -> Result<Self, AmountError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(AmountError::Empty);
        }
        let (int_part, frac_part) = value
            .split_once('.')
            .unwrap_or((value, ""));
        if let Some(c) = int_part
            .chars()
            .chain(frac_part.chars())
            .find(|c| !c.is_ascii_digit())
        {
            return Err(AmountError::InvalidDigit(c.to_string()));
        }
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(AmountError::Empty);
        }
        let decimals = currency.decimals as usize;
        if frac_part.len() > decimals {
            return Err(AmountError::ExcessPrecision(currency.decimals));
        }

        let mut digits = String::with_capacity(int_part.len() + decimals);
        digits.push_str(int_part);
        digits.push_str(frac_part);
        digits.extend(std::iter::repeat('0').take(decimals - frac_part.len()));
        if digits.is_empty() {
            digits.push('0');
        }

        let raw = U256::from_str_radix(&digits, 10).map_err(|_| AmountError::Overflow)?;
        Ok(Self { currency, raw })
    }

    /// Decimal representation in whole units, trailing zeros removed.
    pub fn to_exact(&self) -> String {
        let decimals = self.currency.decimals as usize;
        let digits = self.raw.to_string();
        if decimals == 0 {
            return digits;
        }
        let padded = format!("{digits:0>width$}", width = decimals + 1);
        let (int_part, frac_part) = padded.split_at(padded.len() - decimals);
        let frac_part = frac_part.trim_end_matches('0');
        if frac_part.is_empty() {
            int_part.to_string()
        } else {
            format!("{int_part}.{frac_part}")
        }
    }
}

impl fmt::Display for CurrencyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_exact(), self.currency)
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use rstest::rstest;

    use super::*;

    fn usdc() -> Currency {
        Currency::new(
            1,
            Address::from_str("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48").unwrap(),
            6,
        )
        .with_symbol("USDC")
    }

    #[rstest]
    #[case("1", 1_000_000u64)]
    #[case("1.5", 1_500_000u64)]
    #[case("0.000001", 1u64)]
    #[case(".25", 250_000u64)]
    #[case("007", 7_000_000u64)]
    #[case("  2.0 ", 2_000_000u64)]
    fn test_parse_amount(#[case] input: &str, #[case] expected: u64) {
        let amount = CurrencyAmount::parse(usdc(), input).expect("parse failed");

        assert_eq!(amount.raw, U256::from(expected));
    }

    #[rstest]
    #[case("", AmountError::Empty)]
    #[case(".", AmountError::Empty)]
    #[case("1.0000001", AmountError::ExcessPrecision(6))]
    #[case("1,5", AmountError::InvalidDigit(",".to_string()))]
    #[case("-1", AmountError::InvalidDigit("-".to_string()))]
    fn test_parse_amount_errors(#[case] input: &str, #[case] expected: AmountError) {
        let res = CurrencyAmount::parse(usdc(), input);

        assert_eq!(res, Err(expected));
    }

    #[test]
    fn test_to_exact() {
        let amount = CurrencyAmount::from_raw(usdc(), U256::from(1_230_000u64));

        assert_eq!(amount.to_exact(), "1.23");
        assert_eq!(amount.to_string(), "1.23 USDC");
    }

    #[test]
    fn test_currency_identity_ignores_metadata() {
        let plain = Currency::new(1, usdc().address, 18);

        assert_eq!(plain, usdc());
        assert_ne!(Currency::new(10, usdc().address, 6), usdc());
        assert_eq!(usdc().address_hex(), "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
    }
}
