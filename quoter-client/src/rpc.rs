//! # Routing service client
//!
//! Thin HTTP client for the remote routing service. It asks `GET {router_url}/quote` for a route
//! and tells a definitive "no route" apart from failures. Retries are not done here, a failed
//! request is simply tried again on the next poll tick.
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use quoter_common::{
    display::truncate,
    dto::{QuoteData, QuoteQueryParams, QuoteQueryType, RoutingErrorBody},
    models::{Protocol, TradeType},
};
use reqwest::{header, Client, ClientBuilder};
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

use crate::args::QuoteRequest;

#[derive(Error, Debug)]
pub enum RoutingError {
    /// The request cannot be sent to the routing service at all.
    #[error("Request is not routable remotely: {0}")]
    NotEligible(String),

    /// The request data is not correctly formed.
    #[error("Failed to format request: {0}")]
    FormatRequest(String),

    /// Errors forwarded from the HTTP protocol.
    #[error("Unexpected HTTP client error: {0}")]
    HttpClient(String, #[source] reqwest::Error),

    /// The response from the server could not be parsed correctly.
    #[error("Failed to parse response: {0}")]
    ParseResponse(String),

    #[error("Routing service responded with status {status}: {detail}")]
    Status { status: u16, detail: String },
}

/// Answer of the routing service.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteQuote {
    Quote(QuoteData),
    NoRoute,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait RoutingClient: Send + Sync {
    /// Requests a route for a remote eligible request.
    async fn get_quote(&self, request: &QuoteRequest) -> Result<RemoteQuote, RoutingError>;
}

/// Configuration options for HttpRoutingClient
#[derive(Debug, Clone)]
pub struct HttpRoutingClientOptions {
    /// Protocols the routing service may route through
    pub protocols: Vec<Protocol>,
    /// Transport level timeout, applied on top of the engine's own remote timeout
    pub timeout: Option<Duration>,
}

impl Default for HttpRoutingClientOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpRoutingClientOptions {
    pub fn new() -> Self {
        Self { protocols: Protocol::SUPPORTED.to_vec(), timeout: None }
    }

    pub fn with_protocols(mut self, protocols: Vec<Protocol>) -> Self {
        self.protocols = protocols;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpRoutingClient {
    http_client: Client,
    protocols: Vec<Protocol>,
}

impl HttpRoutingClient {
    pub fn new(options: HttpRoutingClientOptions) -> Result<Self, RoutingError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        let user_agent = format!("quoter-client-{version}", version = env!("CARGO_PKG_VERSION"));
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_str(&user_agent)
                .map_err(|e| RoutingError::FormatRequest(format!("Invalid user agent format: {e}")))?,
        );

        let mut builder = ClientBuilder::new().default_headers(headers);
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| RoutingError::HttpClient(e.to_string(), e))?;
        Ok(Self { http_client: client, protocols: options.protocols })
    }
}

/// Builds the query string of a quote request.
pub fn quote_query_params(
    request: &QuoteRequest,
    protocols: &[Protocol],
) -> Result<QuoteQueryParams, RoutingError> {
    let amount = request
        .amount
        .ok_or_else(|| RoutingError::NotEligible("no amount specified".to_string()))?;
    Ok(QuoteQueryParams {
        protocols: Protocol::csv(protocols),
        token_in_address: request.token_in.address_hex(),
        token_in_chain_id: request.token_in.chain_id,
        token_out_address: request.token_out.address_hex(),
        token_out_chain_id: request.token_out.chain_id,
        amount: amount.to_string(),
        trade_type: match request.trade_type {
            TradeType::ExactInput => QuoteQueryType::ExactIn,
            TradeType::ExactOutput => QuoteQueryType::ExactOut,
        },
    })
}

#[async_trait]
impl RoutingClient for HttpRoutingClient {
    #[instrument(skip_all, fields(token_in = %request.token_in.address_hex(), token_out = %request.token_out.address_hex()))]
    async fn get_quote(&self, request: &QuoteRequest) -> Result<RemoteQuote, RoutingError> {
        let base = request
            .router_url
            .as_ref()
            .ok_or_else(|| RoutingError::NotEligible("no router url configured".to_string()))?;
        let params = quote_query_params(request, &self.protocols)?;

        let uri = format!("{}/quote", base.as_str().trim_end_matches('/'));
        debug!(%uri, "Sending quote request to routing service");
        trace!(?params, "Sending request to routing service");

        let response = self
            .http_client
            .get(&uri)
            .query(&params)
            .send()
            .await
            .map_err(|e| RoutingError::HttpClient(e.to_string(), e))?;
        let status = response.status();
        trace!(%status, "Received response from routing service");

        let body = response
            .text()
            .await
            .map_err(|e| RoutingError::ParseResponse(e.to_string()))?;

        // The no route answer has been observed with both 200 and 404 status codes.
        let error_body = serde_json::from_str::<RoutingErrorBody>(&body).ok();
        if error_body
            .as_ref()
            .is_some_and(RoutingErrorBody::is_no_route)
        {
            debug!("Routing service found no route");
            return Ok(RemoteQuote::NoRoute);
        }

        if !status.is_success() {
            let detail = error_body
                .and_then(|b| b.detail)
                .unwrap_or_else(|| truncate(&body, 256));
            warn!(%status, %detail, "Routing service returned an error");
            return Err(RoutingError::Status { status: status.as_u16(), detail });
        }

        let quote = serde_json::from_str::<QuoteData>(&body).map_err(|err| {
            RoutingError::ParseResponse(format!("Error: {err}, Body: {}", truncate(&body, 512)))
        })?;
        trace!(?quote, "Received quote from routing service");
        Ok(RemoteQuote::Quote(quote))
    }
}
