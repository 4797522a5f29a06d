//! Client side routing.
//!
//! The engine does not ship a router of its own, embedders plug one in through
//! [`ClientSideRouter`]. It must answer with the same payload shape as the routing service.
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use quoter_common::{dto::QuoteData, models::Protocol};

use crate::args::QuoteRequest;

/// Answer of a client side router.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteResult {
    Success(QuoteData),
    NotFound,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClientSideRouter: Send + Sync {
    /// Routes `request` locally over the given protocols.
    ///
    /// An `Err` means the router itself failed, not that no route exists.
    async fn compute_route(
        &self,
        request: &QuoteRequest,
        protocols: &[Protocol],
    ) -> anyhow::Result<RouteResult>;
}

/// Router used when no client side routing is available. Every request fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledRouter;

#[async_trait]
impl ClientSideRouter for DisabledRouter {
    async fn compute_route(
        &self,
        _request: &QuoteRequest,
        _protocols: &[Protocol],
    ) -> anyhow::Result<RouteResult> {
        anyhow::bail!("client side routing is not available")
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use quoter_common::models::RouterPreference;

    use super::*;
    use crate::testing::request;

    #[tokio::test]
    async fn test_disabled_router_fails() {
        let router: Arc<dyn ClientSideRouter> = Arc::new(DisabledRouter);

        let err = router
            .compute_route(&request(1, RouterPreference::ClientSide), &Protocol::SUPPORTED)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "client side routing is not available");
    }
}
