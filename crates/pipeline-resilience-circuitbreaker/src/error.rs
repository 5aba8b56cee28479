use pipeline_resilience_core::ResilienceError;
use thiserror::Error;

/// Errors returned by a service wrapped in [`CircuitBreakerLayer`](crate::CircuitBreakerLayer).
#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    /// The circuit refused the call.
    #[error("circuit '{name}' is open; call not permitted")]
    OpenCircuit {
        /// Circuit key.
        name: String,
    },

    /// An error returned by the inner service.
    #[error("inner service error: {0}")]
    Inner(E),
}

impl<E> CircuitBreakerError<E> {
    /// Returns true if the error indicates the circuit refused the call.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, CircuitBreakerError::OpenCircuit { .. })
    }

    /// Returns the inner error if present.
    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitBreakerError::Inner(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> From<CircuitBreakerError<E>> for ResilienceError<E> {
    fn from(err: CircuitBreakerError<E>) -> Self {
        match err {
            CircuitBreakerError::OpenCircuit { name } => ResilienceError::CircuitOpen { name },
            CircuitBreakerError::Inner(e) => ResilienceError::Application(e),
        }
    }
}
