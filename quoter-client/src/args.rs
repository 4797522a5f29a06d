//! Quote request construction.
//!
//! A [`QuoteRequest`] is the normalized, hashable description of what to quote. Two requests with
//! the same [`Fingerprint`] are the same query and share one cache entry.
use std::{fmt, sync::Arc};

use quoter_common::{
    models::{
        token::{Currency, CurrencyAmount},
        ChainId, QuoteType, RouterPreference, TradeType,
    },
    Address, U256,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use crate::{error::QuoteError, events::QuoteObserver};

/// Token identity as sent to routers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenRef {
    pub address: Address,
    pub chain_id: ChainId,
}

impl TokenRef {
    pub fn new(address: Address, chain_id: ChainId) -> Self {
        Self { address, chain_id }
    }

    pub fn address_hex(&self) -> String {
        format!("0x{}", hex::encode(self.address.as_slice()))
    }
}

impl From<&Currency> for TokenRef {
    fn from(currency: &Currency) -> Self {
        Self { address: currency.address, chain_id: currency.chain_id }
    }
}

/// Canonical cache key of a request.
///
/// Serialized with sorted keys, lowercase addresses and decimal amounts so equal requests always
/// produce the same key. Observers are not part of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Fingerprint(Arc<str>);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone)]
pub struct QuoteRequest {
    pub trade_type: TradeType,
    /// Raw amount of the specified currency. Required for remote routing.
    pub amount: Option<U256>,
    pub token_in: TokenRef,
    pub token_out: TokenRef,
    pub router_preference: RouterPreference,
    pub router_url: Option<Url>,
    /// Receives resolution events for this request.
    pub observer: Option<Arc<dyn QuoteObserver>>,
}

impl QuoteRequest {
    pub fn new(
        trade_type: TradeType,
        amount: Option<U256>,
        token_in: TokenRef,
        token_out: TokenRef,
        router_preference: RouterPreference,
    ) -> Self {
        Self {
            trade_type,
            amount,
            token_in,
            token_out,
            router_preference,
            router_url: None,
            observer: None,
        }
    }

    /// Sets the routing service base url, normalized to end with a slash.
    pub fn with_router_url(mut self, url: Url) -> Self {
        self.router_url = Some(normalize_router_url(url));
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn QuoteObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn fingerprint(&self) -> Fingerprint {
        // serde_json's map is a BTreeMap here, so keys come out sorted.
        let value = json!({
            "amount": self.amount.map(|a| a.to_string()),
            "routerPreference": self.router_preference,
            "routerUrl": self.router_url.as_ref().map(Url::as_str),
            "tokenInAddress": self.token_in.address_hex(),
            "tokenInChainId": self.token_in.chain_id,
            "tokenOutAddress": self.token_out.address_hex(),
            "tokenOutChainId": self.token_out.chain_id,
            "tradeType": self.trade_type,
        });
        Fingerprint(Arc::from(value.to_string()))
    }

    pub fn validate(&self) -> Result<(), QuoteError> {
        if self.token_in == self.token_out {
            return Err(QuoteError::Invalid("input and output token are identical".to_string()));
        }
        Ok(())
    }

    /// The routing service needs a url and an amount, and is only asked when preferred.
    pub fn is_remote_eligible(&self) -> bool {
        self.router_preference == RouterPreference::Api &&
            self.router_url.is_some() &&
            self.amount.is_some()
    }
}

impl fmt::Debug for QuoteRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuoteRequest")
            .field("trade_type", &self.trade_type)
            .field("amount", &self.amount)
            .field("token_in", &self.token_in)
            .field("token_out", &self.token_out)
            .field("router_preference", &self.router_preference)
            .field("router_url", &self.router_url.as_ref().map(Url::as_str))
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl PartialEq for QuoteRequest {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint() == other.fingerprint()
    }
}

impl Eq for QuoteRequest {}

fn normalize_router_url(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// What the user has entered so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SwapInputs {
    pub trade_type: TradeType,
    pub amount_specified: Option<CurrencyAmount>,
    pub currency_in: Option<Currency>,
    pub currency_out: Option<Currency>,
}

impl SwapInputs {
    pub fn new(
        trade_type: TradeType,
        amount_specified: Option<CurrencyAmount>,
        currency_in: Option<Currency>,
        currency_out: Option<Currency>,
    ) -> Self {
        Self { trade_type, amount_specified, currency_in, currency_out }
    }

    /// The currency the specified amount must be denominated in.
    pub fn specified_currency(&self) -> Option<&Currency> {
        match self.trade_type {
            TradeType::ExactInput => self.currency_in.as_ref(),
            TradeType::ExactOutput => self.currency_out.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QuoteConfig {
    pub quote_type: QuoteType,
    pub preference: RouterPreference,
}

impl QuoteConfig {
    pub fn new(quote_type: QuoteType, preference: RouterPreference) -> Self {
        Self { quote_type, preference }
    }
}

/// Normalizes swap inputs into a request.
///
/// Returns `None` when there is nothing to quote: a currency is missing, both sides are the same
/// currency, or the amount is not denominated in the specified side's currency.
pub fn build_request(
    inputs: &SwapInputs,
    config: &QuoteConfig,
    router_url: Option<&Url>,
) -> Option<QuoteRequest> {
    let currency_in = inputs.currency_in.as_ref()?;
    let currency_out = inputs.currency_out.as_ref()?;
    if currency_in == currency_out {
        return None;
    }
    if let Some(amount) = &inputs.amount_specified {
        if Some(&amount.currency) != inputs.specified_currency() {
            return None;
        }
    }

    let preference = if config.quote_type == QuoteType::Skip {
        RouterPreference::Skip
    } else {
        config.preference
    };

    let mut request = QuoteRequest::new(
        inputs.trade_type,
        inputs
            .amount_specified
            .as_ref()
            .map(|a| a.raw),
        currency_in.into(),
        currency_out.into(),
        preference,
    );
    if let Some(url) = router_url {
        request = request.with_router_url(url.clone());
    }
    Some(request)
}
