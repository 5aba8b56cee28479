use crate::context::SharedError;
use crate::policy::RecoveryStrategy;
use pipeline_resilience_core::ResilienceError;
use std::time::Duration;
use thiserror::Error;

/// Why a recovery step did not produce a value.
#[derive(Debug, Clone, Error)]
pub enum RecoveryError {
    /// The request was not answered before its deadline.
    #[error("{strategy} request exceeded its {deadline:?} deadline")]
    Timeout {
        strategy: RecoveryStrategy,
        deadline: Duration,
    },

    /// The manager has no request channel or handler attached.
    #[error("no recovery handler attached")]
    NoHandler,

    /// The handler dropped the request without answering.
    #[error("recovery handler dropped the request")]
    HandlerDropped,

    /// The handler answered without a value.
    #[error("recovery handler returned no result")]
    NoResult,

    /// The retried or fallback operation failed.
    #[error("recovery operation failed: {0}")]
    Operation(SharedError),

    /// No strategy recovered the original error.
    #[error("unrecovered: {0}")]
    Unrecovered(SharedError),
}

impl RecoveryError {
    /// Returns true for deadline expiries.
    pub fn is_timeout(&self) -> bool {
        matches!(self, RecoveryError::Timeout { .. })
    }

    /// Converts into the shared error type, naming `strategy` as the last one tried.
    pub fn into_resilience<E>(self, strategy: RecoveryStrategy) -> ResilienceError<E> {
        match self {
            RecoveryError::Timeout { strategy, .. } => ResilienceError::Timeout {
                request: request_kind(strategy),
            },
            other => ResilienceError::Unrecovered {
                strategy: strategy.as_str(),
                message: match other {
                    RecoveryError::Unrecovered(e) => e.to_string(),
                    other => other.to_string(),
                },
            },
        }
    }
}

fn request_kind(strategy: RecoveryStrategy) -> &'static str {
    match strategy {
        RecoveryStrategy::Retry => "retry",
        RecoveryStrategy::Fallback => "fallback",
        _ => "recovery",
    }
}
