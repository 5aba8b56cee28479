//! Severity-driven recovery for pipeline stages.
//!
//! A stage that fails reports an [`ErrorContext`] to the [`RecoveryManager`].
//! The manager records it, picks the [`RecoveryPolicy`] for its severity and
//! runs the policy's strategies in order until one succeeds:
//!
//! - **RETRY**: asks the caller to run the operation again, waiting
//!   `min(base * multiplier^(attempt-1), max)` before each attempt
//! - **FALLBACK**: asks the caller for a substitute value
//! - **SKIP**: turns the failure into a no-op
//! - **ALERT**: raises an alert; never recovers
//! - **SHUTDOWN**: signals that the pipeline must stop; never recovers
//!
//! Retry and fallback are not run by the manager. They are sent to the caller
//! as [`RecoveryRequest`]s and answered through a [`Responder`] before a
//! deadline. Attach a [`RecoveryHandler`] to have this crate serve them.
//!
//! ## Usage
//!
//! ```rust
//! use futures::future::BoxFuture;
//! use pipeline_resilience_core::BoxError;
//! use pipeline_resilience_recovery::{
//!     ErrorContext, RecoveryHandler, RecoveryManager, RecoveryStrategy, Severity,
//! };
//!
//! struct Cache;
//!
//! impl RecoveryHandler<u32> for Cache {
//!     fn retry(&self, _: ErrorContext, _: u32) -> BoxFuture<'static, Result<Option<u32>, BoxError>> {
//!         Box::pin(async { Err("still down".into()) })
//!     }
//!     fn fallback(&self, _: ErrorContext) -> BoxFuture<'static, Result<Option<u32>, BoxError>> {
//!         Box::pin(async { Ok(Some(42)) })
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let manager = RecoveryManager::<u32>::builder()
//!     .handler(Cache)
//!     .on_alert(|agent, operation, _severity| eprintln!("alert: {agent}/{operation}"))
//!     .build();
//!
//! let ctx = ErrorContext::new("analyzer", "summarize", "model overloaded", Severity::High);
//! let outcome = manager.handle_error(ctx).await;
//!
//! assert!(outcome.success);
//! assert_eq!(outcome.strategy, RecoveryStrategy::Fallback);
//! assert_eq!(outcome.result, Some(42));
//! # }
//! ```

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter};
use parking_lot::{Mutex, RwLock};
use pipeline_resilience_core::events::{EventListener, EventListeners, FnListener};
use pipeline_resilience_core::BoundedHistory;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

mod config;
mod context;
mod error;
mod events;
mod policy;
pub mod request;
mod result;
mod stats;

pub use config::{backoff_delay, RecoveryConfig, RecoveryConfigBuilder};
pub use context::{ErrorContext, ErrorKind, SharedError};
pub use error::RecoveryError;
pub use events::{AlertReason, RecoveryEvent};
pub use policy::{PolicyTable, RecoveryPolicy, RecoveryStrategy, Severity};
pub use request::{spawn_handler, RecoveryHandler, RecoveryReply, RecoveryRequest, Responder};
pub use result::RecoveryResult;
pub use stats::RecoveryStatistics;

/// Capacity of the request channel created by [`RecoveryManagerBuilder::handler`].
pub const HANDLER_CHANNEL_CAPACITY: usize = 32;

struct Inner<T> {
    config: RecoveryConfig,
    policies: RwLock<PolicyTable>,
    history: Mutex<BoundedHistory<ErrorContext>>,
    stats: Mutex<RecoveryStatistics>,
    listeners: EventListeners<RecoveryEvent>,
    requests: Option<mpsc::Sender<RecoveryRequest<T>>>,
    driver: Option<JoinHandle<()>>,
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

/// Runs recovery chains for reported errors.
///
/// `T` is the value produced by a successful retry or fallback. Cloning is
/// cheap; clones share history, statistics and policies.
pub struct RecoveryManager<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for RecoveryManager<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for RecoveryManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryManager")
            .field("name", &self.inner.config.name)
            .field("has_handler", &self.inner.requests.is_some())
            .finish()
    }
}

impl<T: Send + 'static> RecoveryManager<T> {
    /// Creates a new builder.
    pub fn builder() -> RecoveryManagerBuilder<T> {
        RecoveryManagerBuilder::new()
    }

    /// Records `context` and runs the recovery chain of its severity.
    ///
    /// Never fails: when no strategy recovers, the result is
    /// `{success: false, strategy: SKIP, attempts: context.attempts}` carrying
    /// the original error.
    pub async fn handle_error(&self, context: ErrorContext) -> RecoveryResult<T> {
        let name = &self.inner.config.name;
        tracing::debug!(
            manager = %name,
            agent = %context.agent,
            operation = %context.operation,
            severity = %context.severity,
            error = %context.error,
            "Handling error"
        );

        self.inner.history.lock().push(context.clone());
        self.inner.stats.lock().record_error(context.severity);

        #[cfg(feature = "metrics")]
        counter!("recovery_errors_total", "manager" => name.clone(), "severity" => context.severity.as_str())
            .increment(1);

        let policy = self.inner.policies.read().resolve(context.severity);

        if self.should_alert(&context, &policy) {
            let recent_errors = self.recent_errors(&context);
            tracing::warn!(
                manager = %name,
                agent = %context.agent,
                operation = %context.operation,
                recent_errors,
                threshold = policy.alert_threshold,
                "Alert threshold reached"
            );
            self.alert(
                &context,
                AlertReason::ThresholdReached {
                    recent_errors,
                    threshold: policy.alert_threshold,
                },
            );
        }

        for &strategy in &policy.strategies {
            let outcome = self.execute_strategy(strategy, &context, &policy).await;

            #[cfg(feature = "metrics")]
            counter!(
                "recovery_strategy_total",
                "manager" => name.clone(),
                "strategy" => strategy.as_str(),
                "outcome" => if outcome.success { "success" } else { "failure" }
            )
            .increment(1);

            self.emit(RecoveryEvent::StrategyOutcome {
                name: name.clone(),
                timestamp: Instant::now(),
                agent: context.agent.clone(),
                operation: context.operation.clone(),
                strategy,
                success: outcome.success,
                attempts: outcome.attempts,
            });

            if outcome.success {
                self.inner.stats.lock().record_recovered(strategy);
                tracing::debug!(manager = %name, strategy = %strategy, "Recovered");
                return outcome;
            }
        }

        self.inner.stats.lock().record_failed();
        tracing::warn!(
            manager = %name,
            agent = %context.agent,
            operation = %context.operation,
            severity = %context.severity,
            "All recovery strategies failed"
        );

        RecoveryResult::failed(
            RecoveryStrategy::Skip,
            context.attempts,
            Some(RecoveryError::Unrecovered(Arc::clone(&context.error))),
        )
    }

    /// Runs a single strategy for `context` under `policy`.
    pub async fn execute_strategy(
        &self,
        strategy: RecoveryStrategy,
        context: &ErrorContext,
        policy: &RecoveryPolicy,
    ) -> RecoveryResult<T> {
        match strategy {
            RecoveryStrategy::Retry => self.retry(context, policy).await,
            RecoveryStrategy::Fallback => {
                match self.fallback(context).await {
                    Ok(Some(value)) => RecoveryResult::recovered(strategy, 1, Some(value)),
                    Ok(None) => RecoveryResult::failed(strategy, 1, Some(RecoveryError::NoResult)),
                    Err(error) => {
                        tracing::debug!(agent = %context.agent, %error, "Fallback failed");
                        RecoveryResult::failed(strategy, 1, Some(error))
                    }
                }
            }
            RecoveryStrategy::Skip => {
                tracing::warn!(
                    agent = %context.agent,
                    operation = %context.operation,
                    error = %context.error,
                    "Skipping failed operation"
                );
                RecoveryResult::recovered(strategy, 0, None)
            }
            RecoveryStrategy::Alert => {
                self.alert(context, AlertReason::Strategy);
                RecoveryResult::failed(strategy, 1, None)
            }
            RecoveryStrategy::Shutdown => {
                tracing::error!(
                    agent = %context.agent,
                    operation = %context.operation,
                    error = %context.error,
                    "Shutdown required"
                );
                self.emit(RecoveryEvent::ShutdownRequired {
                    name: self.inner.config.name.clone(),
                    timestamp: Instant::now(),
                    agent: context.agent.clone(),
                    operation: context.operation.clone(),
                    message: context.error.to_string(),
                });
                RecoveryResult::failed(
                    strategy,
                    0,
                    Some(RecoveryError::Unrecovered(Arc::clone(&context.error))),
                )
            }
        }
    }

    /// True if errors for the context's agent/operation pair within the alert
    /// window reached `policy.alert_threshold`. The history includes `context`
    /// once it went through [`handle_error`](Self::handle_error).
    pub fn should_alert(&self, context: &ErrorContext, policy: &RecoveryPolicy) -> bool {
        self.recent_errors(context) >= policy.alert_threshold as usize
    }

    /// Delay before retry `attempt` with `multiplier` growth.
    pub fn backoff_delay(&self, attempt: u32, multiplier: f64) -> Duration {
        self.inner.config.backoff_delay(attempt, multiplier)
    }

    /// Snapshot of the counters, with the current history length.
    pub fn statistics(&self) -> RecoveryStatistics {
        let mut stats = self.inner.stats.lock().clone();
        stats.history_len = self.inner.history.lock().len();
        stats
    }

    /// Recorded errors, oldest first, optionally only those of `agent`.
    pub fn error_history(&self, agent: Option<&str>) -> Vec<ErrorContext> {
        self.inner
            .history
            .lock()
            .iter()
            .filter(|ctx| agent.map_or(true, |a| ctx.agent == a))
            .cloned()
            .collect()
    }

    /// Forgets every recorded error. Statistics are kept.
    pub fn clear_history(&self) {
        self.inner.history.lock().clear();
        tracing::debug!(manager = %self.inner.config.name, "Error history cleared");
    }

    /// Replaces the policy of `severity`.
    pub fn update_policy(&self, severity: Severity, policy: RecoveryPolicy) {
        tracing::info!(
            manager = %self.inner.config.name,
            severity = %severity,
            strategies = ?policy.strategies,
            "Recovery policy updated"
        );
        self.inner.policies.write().insert(severity, policy);
    }

    /// Policy applied to errors of `severity`.
    pub fn policy(&self, severity: Severity) -> RecoveryPolicy {
        self.inner.policies.read().resolve(severity)
    }

    /// Configuration this manager was built with.
    pub fn config(&self) -> &RecoveryConfig {
        &self.inner.config
    }

    async fn retry(&self, context: &ErrorContext, policy: &RecoveryPolicy) -> RecoveryResult<T> {
        let strategy = RecoveryStrategy::Retry;
        if self.inner.requests.is_none() {
            return RecoveryResult::failed(strategy, 0, Some(RecoveryError::NoHandler));
        }

        let mut last_error = None;
        for attempt in 1..=policy.max_attempts {
            let delay = self.backoff_delay(attempt, policy.backoff_multiplier);
            self.emit(RecoveryEvent::RetryScheduled {
                name: self.inner.config.name.clone(),
                timestamp: Instant::now(),
                agent: context.agent.clone(),
                operation: context.operation.clone(),
                attempt,
                delay,
            });
            tracing::debug!(agent = %context.agent, attempt, ?delay, "Retrying");
            tokio::time::sleep(delay).await;

            let deadline = self.inner.config.retry_deadline;
            let reply = self
                .request(strategy, deadline, |responder| RecoveryRequest::Retry {
                    context: context.clone(),
                    attempt,
                    deadline,
                    responder,
                })
                .await;

            match reply {
                Ok(Some(value)) => return RecoveryResult::recovered(strategy, attempt, Some(value)),
                Ok(None) => last_error = Some(RecoveryError::NoResult),
                Err(RecoveryError::HandlerDropped) if self.channel_closed() => {
                    return RecoveryResult::failed(
                        strategy,
                        attempt,
                        Some(RecoveryError::HandlerDropped),
                    );
                }
                Err(error) => {
                    tracing::debug!(agent = %context.agent, attempt, %error, "Retry failed");
                    last_error = Some(error);
                }
            }
        }

        RecoveryResult::failed(strategy, policy.max_attempts, last_error)
    }

    async fn fallback(&self, context: &ErrorContext) -> Result<Option<T>, RecoveryError> {
        let deadline = self.inner.config.fallback_deadline;
        self.request(RecoveryStrategy::Fallback, deadline, |responder| {
            RecoveryRequest::Fallback {
                context: context.clone(),
                deadline,
                responder,
            }
        })
        .await
    }

    /// Sends a request and waits for the reply. The deadline covers both the
    /// send and the reply; the caller's operation is not cancelled by it.
    async fn request(
        &self,
        strategy: RecoveryStrategy,
        deadline: Duration,
        make: impl FnOnce(Responder<T>) -> RecoveryRequest<T>,
    ) -> Result<Option<T>, RecoveryError> {
        let sender = self.inner.requests.as_ref().ok_or(RecoveryError::NoHandler)?;
        let (responder, reply) = Responder::pair();
        let request = make(responder);

        let round_trip = async {
            if sender.send(request).await.is_err() {
                return Err(RecoveryError::HandlerDropped);
            }
            match reply.await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(error)) => Err(RecoveryError::Operation(Arc::from(error))),
                Err(_) => Err(RecoveryError::HandlerDropped),
            }
        };

        match tokio::time::timeout(deadline, round_trip).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(strategy = %strategy, ?deadline, "Recovery request timed out");
                Err(RecoveryError::Timeout { strategy, deadline })
            }
        }
    }

    fn channel_closed(&self) -> bool {
        self.inner
            .requests
            .as_ref()
            .map_or(true, |sender| sender.is_closed())
    }

    fn recent_errors(&self, context: &ErrorContext) -> usize {
        let now = tokio::time::Instant::now();
        let window = self.inner.config.alert_window;
        self.inner
            .history
            .lock()
            .iter()
            .filter(|ctx| ctx.same_source(context))
            .filter(|ctx| now.saturating_duration_since(ctx.timestamp) <= window)
            .count()
    }

    fn alert(&self, context: &ErrorContext, reason: AlertReason) {
        #[cfg(feature = "metrics")]
        counter!("recovery_alerts_total", "manager" => self.inner.config.name.clone(), "severity" => context.severity.as_str())
            .increment(1);

        self.emit(RecoveryEvent::Alert {
            name: self.inner.config.name.clone(),
            timestamp: Instant::now(),
            agent: context.agent.clone(),
            operation: context.operation.clone(),
            severity: context.severity,
            reason,
            message: context.error.to_string(),
        });
    }

    fn emit(&self, event: RecoveryEvent) {
        self.inner.listeners.emit(&event);
    }
}

/// Builder for [`RecoveryManager`].
pub struct RecoveryManagerBuilder<T> {
    config: RecoveryConfig,
    policies: PolicyTable,
    listeners: EventListeners<RecoveryEvent>,
    requests: Option<mpsc::Sender<RecoveryRequest<T>>>,
    driver: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> RecoveryManagerBuilder<T> {
    /// Creates a new builder with the default configuration and policy table.
    pub fn new() -> Self {
        #[cfg(feature = "metrics")]
        METRICS_INIT.call_once(|| {
            describe_counter!("recovery_errors_total", "Errors reported, by severity");
            describe_counter!(
                "recovery_strategy_total",
                "Recovery strategies executed, by strategy and outcome"
            );
            describe_counter!("recovery_alerts_total", "Alerts raised");
        });

        Self {
            config: RecoveryConfig::default(),
            policies: PolicyTable::default(),
            listeners: EventListeners::new(),
            requests: None,
            driver: None,
        }
    }

    /// Replaces the whole configuration. Default: [`RecoveryConfig::default`].
    pub fn config(mut self, config: RecoveryConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the name used in events, logs and metrics.
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.name = name.into();
        self
    }

    /// Replaces the whole policy table.
    pub fn policies(mut self, policies: PolicyTable) -> Self {
        self.policies = policies;
        self
    }

    /// Replaces the policy of one severity.
    pub fn policy(mut self, severity: Severity, policy: RecoveryPolicy) -> Self {
        self.policies.insert(severity, policy);
        self
    }

    /// Sends retry and fallback requests to `sender`; the caller consumes the
    /// paired receiver.
    pub fn requests(mut self, sender: mpsc::Sender<RecoveryRequest<T>>) -> Self {
        self.requests = Some(sender);
        self
    }

    /// Serves retry and fallback requests with `handler` on a spawned task.
    ///
    /// Needs a tokio runtime; outside one the handler is not attached and
    /// RETRY/FALLBACK fail with [`RecoveryError::NoHandler`].
    pub fn handler<H>(mut self, handler: H) -> Self
    where
        H: RecoveryHandler<T>,
    {
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::warn!(
                manager = %self.config.name,
                "Recovery handler requires a tokio runtime; not attached"
            );
            return self;
        }

        let (tx, rx) = mpsc::channel(HANDLER_CHANNEL_CAPACITY);
        if let Some(previous) = self.driver.replace(spawn_handler(handler, rx)) {
            previous.abort();
        }
        self.requests = Some(tx);
        self
    }

    /// Registers a listener that receives every [`RecoveryEvent`].
    pub fn listener<L>(mut self, listener: L) -> Self
    where
        L: EventListener<RecoveryEvent> + 'static,
    {
        self.listeners.add(listener);
        self
    }

    /// Registers a callback for alerts.
    ///
    /// # Callback Signature
    /// `Fn(&str, &str, Severity)` - agent, operation and severity of the error.
    pub fn on_alert<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &str, Severity) + Send + Sync + 'static,
    {
        self.listeners
            .add(FnListener::new(move |event: &RecoveryEvent| {
                if let RecoveryEvent::Alert {
                    agent,
                    operation,
                    severity,
                    ..
                } = event
                {
                    f(agent, operation, *severity);
                }
            }));
        self
    }

    /// Registers a callback for shutdown requests.
    ///
    /// # Callback Signature
    /// `Fn(&str, &str)` - agent and operation that required the shutdown.
    pub fn on_shutdown_required<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.listeners
            .add(FnListener::new(move |event: &RecoveryEvent| {
                if let RecoveryEvent::ShutdownRequired {
                    agent, operation, ..
                } = event
                {
                    f(agent, operation);
                }
            }));
        self
    }

    /// Registers a callback for every executed strategy.
    ///
    /// # Callback Signature
    /// `Fn(RecoveryStrategy, bool)` - strategy and whether it succeeded.
    pub fn on_strategy_outcome<F>(mut self, f: F) -> Self
    where
        F: Fn(RecoveryStrategy, bool) + Send + Sync + 'static,
    {
        self.listeners
            .add(FnListener::new(move |event: &RecoveryEvent| {
                if let RecoveryEvent::StrategyOutcome {
                    strategy, success, ..
                } = event
                {
                    f(*strategy, *success);
                }
            }));
        self
    }

    /// Builds the manager.
    ///
    /// Without [`requests`](Self::requests) or [`handler`](Self::handler), retry and
    /// fallback steps fail with [`RecoveryError::NoHandler`].
    pub fn build(self) -> RecoveryManager<T> {
        let history = BoundedHistory::new(self.config.history_capacity, self.config.history_trim_to);
        RecoveryManager {
            inner: Arc::new(Inner {
                config: self.config,
                policies: RwLock::new(self.policies),
                history: Mutex::new(history),
                stats: Mutex::new(RecoveryStatistics::default()),
                listeners: self.listeners,
                requests: self.requests,
                driver: self.driver,
            }),
        }
    }
}

impl<T: Send + 'static> Default for RecoveryManagerBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}
