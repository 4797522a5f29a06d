//! Two stage quote resolution.
//!
//! A request is first sent to the routing service when it is eligible for it. Any failure there
//! falls through to the client side router, whose answer is final.
use async_trait::async_trait;
use metrics::counter;
#[cfg(test)]
use mockall::automock;
use tracing::{debug, instrument, warn};

use crate::{
    args::QuoteRequest,
    error::QuoteError,
    events::QuoteEvent,
    quote::QuoteResult,
    source::{LocalQuoteSource, RemoteQuoteSource},
};

/// Result of running one stage of the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Done(QuoteResult),
    /// The stage could not answer, the next stage should try.
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Remote,
    Local,
}

impl Stage {
    const PIPELINE: [Stage; 2] = [Stage::Remote, Stage::Local];

    fn name(&self) -> &'static str {
        match self {
            Stage::Remote => "remote",
            Stage::Local => "local",
        }
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait QuoteResolver: Send + Sync {
    /// Resolves a request to a final result. Never panics and never returns `Loading`.
    async fn resolve(&self, request: &QuoteRequest) -> QuoteResult;
}

#[derive(Clone)]
pub struct Resolver {
    remote: RemoteQuoteSource,
    local: LocalQuoteSource,
}

impl Resolver {
    pub fn new(remote: RemoteQuoteSource, local: LocalQuoteSource) -> Self {
        Self { remote, local }
    }

    async fn run_stage(&self, stage: Stage, request: &QuoteRequest) -> StageOutcome {
        match stage {
            Stage::Remote => {
                if !self.remote.is_eligible(request) {
                    debug!("Request not eligible for the routing service");
                    return StageOutcome::Continue;
                }
                match self.remote.fetch(request).await {
                    QuoteResult::Error(err) => {
                        warn!(error = %err, "GetQuote failed on API, falling back to client");
                        counter!("quote_remote_fallbacks").increment(1);
                        StageOutcome::Continue
                    }
                    result => StageOutcome::Done(result),
                }
            }
            Stage::Local => {
                if !self.local.is_eligible(request) {
                    return StageOutcome::Continue;
                }
                StageOutcome::Done(self.local.fetch(request).await)
            }
        }
    }

    async fn run_pipeline(&self, request: &QuoteRequest) -> QuoteResult {
        if let Err(err) = request.validate() {
            return QuoteResult::Error(err);
        }
        for stage in Stage::PIPELINE {
            if let StageOutcome::Done(result) = self.run_stage(stage, request).await {
                debug!(stage = stage.name(), "Quote resolved");
                return result;
            }
        }
        QuoteResult::Error(QuoteError::Unknown {
            message: "no stage produced a quote".to_string(),
            cause: None,
        })
    }
}

fn notify(request: &QuoteRequest, event: QuoteEvent) {
    if let Some(observer) = &request.observer {
        observer.on_event(&event);
    }
}

#[async_trait]
impl QuoteResolver for Resolver {
    #[instrument(skip_all, fields(fingerprint = %request.fingerprint()))]
    async fn resolve(&self, request: &QuoteRequest) -> QuoteResult {
        let fingerprint = request.fingerprint();
        notify(request, QuoteEvent::ResolutionStarted { fingerprint: fingerprint.clone() });
        counter!("quote_resolutions").increment(1);

        let result = self.run_pipeline(request).await;

        match &result {
            QuoteResult::Error(err) => {
                counter!("quote_resolution_errors", "kind" => err.kind().to_string()).increment(1);
                notify(
                    request,
                    QuoteEvent::ResolutionFailed { fingerprint, error: err.classify() },
                );
            }
            _ => notify(request, QuoteEvent::ResolutionSucceeded { fingerprint, result: result.clone() }),
        }
        result
    }
}
