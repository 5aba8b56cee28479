use crate::error::RecoveryError;
use crate::policy::RecoveryStrategy;
use pipeline_resilience_core::ResilienceError;

/// Outcome of a recovery step or of a whole recovery chain.
#[derive(Debug, Clone)]
pub struct RecoveryResult<T> {
    pub success: bool,
    /// The strategy that produced this outcome.
    pub strategy: RecoveryStrategy,
    pub attempts: u32,
    /// Value produced by a successful RETRY or FALLBACK.
    pub result: Option<T>,
    pub error: Option<RecoveryError>,
}

impl<T> RecoveryResult<T> {
    pub(crate) fn recovered(strategy: RecoveryStrategy, attempts: u32, result: Option<T>) -> Self {
        Self {
            success: true,
            strategy,
            attempts,
            result,
            error: None,
        }
    }

    pub(crate) fn failed(
        strategy: RecoveryStrategy,
        attempts: u32,
        error: Option<RecoveryError>,
    ) -> Self {
        Self {
            success: false,
            strategy,
            attempts,
            result: None,
            error,
        }
    }

    /// Converts into a `Result` for callers propagating with `?`.
    ///
    /// A successful SKIP yields `Ok(None)`.
    pub fn into_result<E>(self) -> Result<Option<T>, ResilienceError<E>> {
        if self.success {
            return Ok(self.result);
        }
        Err(match self.error {
            Some(error) => error.into_resilience(self.strategy),
            None => ResilienceError::Unrecovered {
                strategy: self.strategy.as_str(),
                message: format!("{} did not recover the error", self.strategy),
            },
        })
    }
}
