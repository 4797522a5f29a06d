//! Resolution lifecycle events.
//!
//! Every resolution reports `ResolutionStarted` followed by exactly one of `ResolutionSucceeded`
//! or `ResolutionFailed` to the observer attached to the request that triggered it.
#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;
use tracing::trace;

use crate::{args::Fingerprint, error::ClassifiedError, quote::QuoteResult};

#[derive(Debug, Clone, PartialEq)]
pub enum QuoteEvent {
    ResolutionStarted { fingerprint: Fingerprint },
    /// Carries either a successful trade or a not found answer.
    ResolutionSucceeded { fingerprint: Fingerprint, result: QuoteResult },
    ResolutionFailed { fingerprint: Fingerprint, error: ClassifiedError },
}

impl QuoteEvent {
    pub fn fingerprint(&self) -> &Fingerprint {
        match self {
            QuoteEvent::ResolutionStarted { fingerprint } |
            QuoteEvent::ResolutionSucceeded { fingerprint, .. } |
            QuoteEvent::ResolutionFailed { fingerprint, .. } => fingerprint,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, QuoteEvent::ResolutionStarted { .. })
    }
}

#[cfg_attr(test, automock)]
pub trait QuoteObserver: Send + Sync {
    /// Must not block, it is called inline by the resolver.
    fn on_event(&self, event: &QuoteEvent);
}

/// Forwards events into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<QuoteEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<QuoteEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl QuoteObserver for ChannelObserver {
    fn on_event(&self, event: &QuoteEvent) {
        if self.tx.send(event.clone()).is_err() {
            trace!("Event receiver dropped, discarding quote event");
        }
    }
}
