use std::{error::Error as StdError, fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Underlying failure attached to a [`QuoteError`].
pub type ErrorCause = Arc<dyn StdError + Send + Sync>;

/// Why a quote could not be produced.
///
/// `NoRoute` is not a failure: it is the definitive answer that the pair cannot be routed. Sources
/// return it like any other error and it is turned into [`crate::quote::QuoteResult::NotFound`]
/// on the way out.
#[derive(Error, Debug, Clone)]
pub enum QuoteError {
    /// The request was absent or malformed. Never retried.
    #[error("Invalid quote request: {0}")]
    Invalid(String),

    #[error("No route found")]
    NoRoute,

    /// Timeouts, transport errors and malformed payloads. Retried on the next poll tick.
    #[error("Transient failure: {message}")]
    Transient { message: String, cause: Option<ErrorCause> },

    /// Anything else, e.g. the client side router raising.
    #[error("Unknown failure: {message}")]
    Unknown { message: String, cause: Option<ErrorCause> },
}

impl QuoteError {
    pub fn transient<E>(message: impl Into<String>, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Transient { message: message.into(), cause: Some(Arc::new(cause)) }
    }

    pub fn transient_msg(message: impl Into<String>) -> Self {
        Self::Transient { message: message.into(), cause: None }
    }

    /// Wraps an arbitrary failure, keeping it as the cause.
    pub fn unknown(err: anyhow::Error) -> Self {
        let message = err.to_string();
        let cause: Box<dyn StdError + Send + Sync> = err.into();
        Self::Unknown { message, cause: Some(Arc::from(cause)) }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            QuoteError::Invalid(_) => ErrorKind::Invalid,
            QuoteError::NoRoute => ErrorKind::NoRoute,
            QuoteError::Transient { .. } => ErrorKind::Transient,
            QuoteError::Unknown { .. } => ErrorKind::Unknown,
        }
    }

    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            QuoteError::Transient { cause, .. } | QuoteError::Unknown { cause, .. } => {
                cause.as_deref()
            }
            _ => None,
        }
    }

    /// Serializable view of the error for observers.
    pub fn classify(&self) -> ClassifiedError {
        ClassifiedError { kind: self.kind(), message: self.to_string() }
    }
}

/// Errors compare by kind and message, causes are not comparable.
impl PartialEq for QuoteError {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind() && self.to_string() == other.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Invalid,
    NoRoute,
    Transient,
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Invalid => "invalid",
            ErrorKind::NoRoute => "no_route",
            ErrorKind::Transient => "transient",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
}
