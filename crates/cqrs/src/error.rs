//! Dispatch and configuration errors.

use thiserror::Error;

use crate::handler::HandlerError;

/// Failure of a single-handler dispatch (result commands, queries) or of the
/// worker pool.
///
/// Fire-and-forget commands never surface handler errors through this type;
/// they report a boolean instead.
#[derive(Debug, Error)]
pub enum BusError {
    /// Nothing is registered for the message's kind.
    #[error("no handler registered for {kind}")]
    NoHandlerRegistered { kind: &'static str },

    /// The handler returned an error. Displays exactly as the original error.
    #[error(transparent)]
    Handler(HandlerError),

    /// The handler panicked.
    #[error("handler for {kind} panicked: {message}")]
    HandlerPanicked { kind: &'static str, message: String },

    /// Bounded pool refused the submission.
    #[error("worker pool saturated: {limit} dispatches already in flight")]
    Saturated { limit: usize },

    /// The pool went away before the dispatch completed.
    #[error("worker pool dropped the dispatch before it completed")]
    WorkerLost,
}

impl BusError {
    pub fn no_handler(kind: &'static str) -> Self {
        Self::NoHandlerRegistered { kind }
    }

    pub fn is_no_handler(&self) -> bool {
        matches!(self, BusError::NoHandlerRegistered { .. })
    }

    /// The error raised by the handler, if that is what this is.
    pub fn handler_error(&self) -> Option<&HandlerError> {
        match self {
            BusError::Handler(err) => Some(err),
            _ => None,
        }
    }

    pub fn into_handler_error(self) -> Result<HandlerError, Self> {
        match self {
            BusError::Handler(err) => Ok(err),
            other => Err(other),
        }
    }
}

/// Invalid bus configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("failed to build worker runtime: {0}")]
    Runtime(#[from] std::io::Error),
}
