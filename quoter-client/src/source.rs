//! Quote sources.
//!
//! Each source turns a [`QuoteRequest`] into a [`QuoteResult`] and never fails outright, errors
//! are classified into [`QuoteError`] so the resolver can decide whether to fall back.
use std::{sync::Arc, time::Duration};

use quoter_common::models::{Protocol, RouterPreference};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::{
    args::QuoteRequest,
    error::QuoteError,
    local::{ClientSideRouter, RouteResult},
    quote::{QuoteResult, TradeResult},
    rpc::{RemoteQuote, RoutingClient},
    transform::transform_quote,
};

/// The routing service, bounded by a timeout.
#[derive(Clone)]
pub struct RemoteQuoteSource {
    client: Arc<dyn RoutingClient>,
    timeout: Duration,
}

impl RemoteQuoteSource {
    pub fn new(client: Arc<dyn RoutingClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn is_eligible(&self, request: &QuoteRequest) -> bool {
        request.is_remote_eligible()
    }

    pub async fn fetch(&self, request: &QuoteRequest) -> QuoteResult {
        self.try_fetch(request).await.into()
    }

    async fn try_fetch(&self, request: &QuoteRequest) -> Result<TradeResult, QuoteError> {
        let response = timeout(self.timeout, self.client.get_quote(request))
            .await
            .map_err(|_| {
                QuoteError::transient_msg(format!(
                    "routing service did not answer within {:?}",
                    self.timeout
                ))
            })?
            .map_err(|err| QuoteError::transient(err.to_string(), err))?;
        match response {
            RemoteQuote::NoRoute => Err(QuoteError::NoRoute),
            RemoteQuote::Quote(data) => transform_quote(request, data).map_err(|err| {
                QuoteError::transient("routing service returned an unusable quote", err)
            }),
        }
    }
}

/// The embedder supplied client side router.
#[derive(Clone)]
pub struct LocalQuoteSource {
    router: Arc<dyn ClientSideRouter>,
    protocols: Vec<Protocol>,
}

impl LocalQuoteSource {
    pub fn new(router: Arc<dyn ClientSideRouter>, protocols: Vec<Protocol>) -> Self {
        Self { router, protocols }
    }

    /// The local router is the last resort, it takes every request.
    pub fn is_eligible(&self, _request: &QuoteRequest) -> bool {
        true
    }

    pub async fn fetch(&self, request: &QuoteRequest) -> QuoteResult {
        self.try_fetch(request).await.into()
    }

    async fn try_fetch(&self, request: &QuoteRequest) -> Result<TradeResult, QuoteError> {
        if request.router_preference == RouterPreference::Skip {
            debug!("Routing skip request client side");
        }
        let route = self
            .router
            .compute_route(request, &self.protocols)
            .await
            .map_err(|err| {
                warn!(error = %err, "GetQuote failed on client");
                QuoteError::unknown(err)
            })?;
        match route {
            RouteResult::NotFound => Err(QuoteError::NoRoute),
            RouteResult::Success(data) => transform_quote(request, data).map_err(|err| {
                QuoteError::transient("client side router returned an unusable quote", err)
            }),
        }
    }
}
