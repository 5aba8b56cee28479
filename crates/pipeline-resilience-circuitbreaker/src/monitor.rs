use crate::circuit::CircuitState;
use crate::events::CircuitEvent;
use crate::CircuitBreaker;
#[cfg(feature = "metrics")]
use metrics::gauge;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;

/// Error rate above which the monitor logs a warning for a closed circuit.
pub const ERROR_RATE_WARNING: f64 = 0.3;

impl CircuitBreaker {
    /// Starts a periodic health check, replacing any running one.
    ///
    /// Every `interval` a [`CircuitEvent::Health`] snapshot is emitted per
    /// circuit, and a warning is logged for circuits that are open or whose
    /// error rate exceeds [`ERROR_RATE_WARNING`]. Requires a tokio runtime;
    /// without one the call only logs and returns. A zero `interval` is
    /// refused the same way and leaves any running monitor in place.
    pub fn start_monitoring(&self, interval: Duration) {
        if interval.is_zero() {
            tracing::warn!("Circuit monitoring interval must be non-zero");
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("Circuit monitoring requires a tokio runtime");
            return;
        };

        let inner = Arc::downgrade(&self.inner);
        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(inner) = inner.upgrade() else {
                    return;
                };
                CircuitBreaker { inner }.check_health();
            }
        });

        if let Some(previous) = self.inner.monitor.lock().replace(task) {
            previous.abort();
        }
        tracing::debug!(?interval, "Circuit monitoring started");
    }

    /// Stops the periodic health check if one is running.
    pub fn stop_monitoring(&self) {
        if let Some(task) = self.inner.monitor.lock().take() {
            task.abort();
            tracing::debug!("Circuit monitoring stopped");
        }
    }

    /// Returns true while a health check task is installed.
    pub fn is_monitoring(&self) -> bool {
        self.inner.monitor.lock().is_some()
    }

    /// Runs one health pass over every circuit.
    pub fn check_health(&self) {
        for stats in self.all_statistics() {
            if stats.state == CircuitState::Open {
                tracing::warn!(circuit = %stats.name, "Circuit is OPEN");
            } else if stats.error_rate > ERROR_RATE_WARNING {
                tracing::warn!(
                    circuit = %stats.name,
                    error_rate = stats.error_rate,
                    "High error rate"
                );
            }

            #[cfg(feature = "metrics")]
            gauge!("circuitbreaker_error_rate", "circuitbreaker" => stats.name.clone())
                .set(stats.error_rate);

            self.emit(&CircuitEvent::Health {
                name: stats.name.clone(),
                timestamp: Instant::now(),
                statistics: stats,
            });
        }
    }
}
