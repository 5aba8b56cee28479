use crate::circuitbreaker::{CircuitBreaker, CircuitStatistics};
use crate::core::{BoxError, ResilienceError};
use crate::recovery::{ErrorContext, RecoveryManager, RecoveryStatistics, Severity};
use std::future::Future;

/// The single owner of a pipeline's circuits and recovery state.
///
/// Cloning is cheap; every clone shares the same breaker and manager.
pub struct Resilience<T> {
    breaker: CircuitBreaker,
    recovery: RecoveryManager<T>,
}

impl<T> Clone for Resilience<T> {
    fn clone(&self) -> Self {
        Self {
            breaker: self.breaker.clone(),
            recovery: self.recovery.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Resilience<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resilience")
            .field("breaker", &self.breaker)
            .field("recovery", &self.recovery)
            .finish()
    }
}

/// Combined snapshot of every circuit and the recovery counters.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ResilienceStatistics {
    pub circuits: Vec<CircuitStatistics>,
    pub recovery: RecoveryStatistics,
}

impl<T: Send + 'static> Resilience<T> {
    pub fn new(breaker: CircuitBreaker, recovery: RecoveryManager<T>) -> Self {
        Self { breaker, recovery }
    }

    pub fn builder() -> ResilienceBuilder<T> {
        ResilienceBuilder::new()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn recovery(&self) -> &RecoveryManager<T> {
        &self.recovery
    }

    /// Runs `operation` behind the circuit `key` and recovers its failure.
    ///
    /// - The call is refused with [`ResilienceError::CircuitOpen`] when the
    ///   circuit does not admit it.
    /// - The outcome is recorded on the circuit. Dropping the returned future
    ///   before the operation finishes records nothing and frees the trial slot
    ///   it held on a half-open circuit.
    /// - A failure is reported to the recovery manager as an [`ErrorContext`]
    ///   for `agent`/`operation_name` at `severity`; a recovered value (or
    ///   `None` after SKIP) is returned, otherwise the recovery error.
    pub async fn execute<F, Fut, E>(
        &self,
        key: &str,
        agent: &str,
        operation_name: &str,
        severity: Severity,
        operation: F,
    ) -> Result<Option<T>, ResilienceError<BoxError>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxError>,
    {
        let Some(permit) = self.breaker.acquire(key) else {
            return Err(ResilienceError::CircuitOpen {
                name: key.to_string(),
            });
        };

        match operation().await {
            Ok(value) => {
                permit.record_success();
                Ok(Some(value))
            }
            Err(error) => {
                permit.record_error();
                let context = ErrorContext::new(agent, operation_name, error, severity)
                    .with_metadata("circuit", key);
                tracing::debug!(
                    circuit = key,
                    agent,
                    operation = operation_name,
                    "Stage failed; recovering"
                );
                self.recovery.handle_error(context).await.into_result()
            }
        }
    }

    pub fn statistics(&self) -> ResilienceStatistics {
        ResilienceStatistics {
            circuits: self.breaker.all_statistics(),
            recovery: self.recovery.statistics(),
        }
    }

    /// Stops circuit timers and monitoring. Recovery state is kept.
    pub fn shutdown(&self) {
        self.breaker.shutdown();
    }
}

/// Builder for [`Resilience`].
pub struct ResilienceBuilder<T> {
    breaker: Option<CircuitBreaker>,
    recovery: Option<RecoveryManager<T>>,
}

impl<T: Send + 'static> ResilienceBuilder<T> {
    pub fn new() -> Self {
        Self {
            breaker: None,
            recovery: None,
        }
    }

    /// Default: [`CircuitBreaker::default`]
    pub fn breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Default: a manager with the built-in policy table and no handler.
    pub fn recovery(mut self, recovery: RecoveryManager<T>) -> Self {
        self.recovery = Some(recovery);
        self
    }

    pub fn build(self) -> Resilience<T> {
        Resilience {
            breaker: self.breaker.unwrap_or_default(),
            recovery: self
                .recovery
                .unwrap_or_else(|| RecoveryManager::builder().build()),
        }
    }
}

impl<T: Send + 'static> Default for ResilienceBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}
