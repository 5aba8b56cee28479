//! Common error types for pipeline-resilience.
//!
//! [`ResilienceError`] lets a pipeline stage that uses both the circuit
//! breaker and the recovery manager surface a single error type. Each
//! pattern crate provides `From` conversions from its own error into this
//! type, so stages can use `?` without writing conversion boilerplate.
//!
//! ```rust
//! use pipeline_resilience_core::ResilienceError;
//!
//! #[derive(Debug)]
//! enum DraftError {
//!     EmptyOutline,
//! }
//!
//! impl std::fmt::Display for DraftError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "outline is empty")
//!     }
//! }
//!
//! impl std::error::Error for DraftError {}
//!
//! fn describe(err: &ResilienceError<DraftError>) -> &'static str {
//!     match err {
//!         ResilienceError::CircuitOpen { .. } => "dependency is cooling down",
//!         ResilienceError::Timeout { .. } => "dependency too slow",
//!         ResilienceError::Unrecovered { .. } => "recovery exhausted",
//!         ResilienceError::Application(_) => "stage failed",
//!     }
//! }
//!
//! let err = ResilienceError::<DraftError>::CircuitOpen { name: "llm-api".into() };
//! assert_eq!(describe(&err), "dependency is cooling down");
//! ```

use std::fmt;

/// Boxed error used wherever the failing operation is caller-defined.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A common error type that wraps circuit breaker and recovery failures.
///
/// `E` is the error type of the pipeline stage itself.
#[derive(Debug, Clone)]
pub enum ResilienceError<E> {
    /// The circuit guarding the operation rejected the call.
    CircuitOpen {
        /// Circuit key.
        name: String,
    },

    /// A retry or fallback request did not answer before its deadline.
    Timeout {
        /// The request kind that timed out ("retry" or "fallback").
        request: &'static str,
    },

    /// Every recovery strategy of the selected policy failed.
    Unrecovered {
        /// Name of the last strategy reported by the recovery manager.
        strategy: &'static str,
        /// Human readable description of the original failure.
        message: String,
    },

    /// The pipeline stage returned an error of its own.
    Application(E),
}

impl<E> fmt::Display for ResilienceError<E>
where
    E: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResilienceError::CircuitOpen { name } => write!(f, "circuit '{}' is open", name),
            ResilienceError::Timeout { request } => {
                write!(f, "{} request exceeded its deadline", request)
            }
            ResilienceError::Unrecovered { strategy, message } => {
                write!(f, "unrecovered after {}: {}", strategy, message)
            }
            ResilienceError::Application(e) => write!(f, "application error: {}", e),
        }
    }
}

impl<E> std::error::Error for ResilienceError<E> where E: std::error::Error {}

impl<E> ResilienceError<E> {
    /// Returns `true` if a circuit rejected the call.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ResilienceError::CircuitOpen { .. })
    }

    /// Returns `true` if a recovery request timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ResilienceError::Timeout { .. })
    }

    /// Returns `true` if recovery gave up.
    pub fn is_unrecovered(&self) -> bool {
        matches!(self, ResilienceError::Unrecovered { .. })
    }

    /// Returns `true` if this is an application error.
    pub fn is_application(&self) -> bool {
        matches!(self, ResilienceError::Application(_))
    }

    /// Extracts the application error, if this is an `Application` variant.
    pub fn application_error(self) -> Option<E> {
        match self {
            ResilienceError::Application(e) => Some(e),
            _ => None,
        }
    }

    /// Maps the application error using a function.
    pub fn map_application<F, T>(self, f: F) -> ResilienceError<T>
    where
        F: FnOnce(E) -> T,
    {
        match self {
            ResilienceError::CircuitOpen { name } => ResilienceError::CircuitOpen { name },
            ResilienceError::Timeout { request } => ResilienceError::Timeout { request },
            ResilienceError::Unrecovered { strategy, message } => {
                ResilienceError::Unrecovered { strategy, message }
            }
            ResilienceError::Application(e) => ResilienceError::Application(f(e)),
        }
    }
}
