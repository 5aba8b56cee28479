//! Per-key circuit breaker for pipeline stages.
//!
//! A [`CircuitBreaker`] tracks one circuit per dependency key (for example
//! `"llm-api"`, `"disk"`, `"fetch"`). Callers report the outcome of every
//! call; the breaker decides whether further calls should be allowed.
//!
//! ## States
//! - **Closed**: normal operation. Outcomes feed a sliding window and the
//!   circuit opens once the windowed error rate exceeds `error_threshold`
//!   (with at least [`MIN_SAMPLES`] samples in the window).
//! - **Open**: the dependency is failing. After `timeout` a timer moves the
//!   circuit to half-open.
//! - **Half-Open**: trial calls test the dependency. `success_threshold`
//!   consecutive successes close the circuit; any error re-opens it.
//!
//! ## Usage
//!
//! ```rust
//! use pipeline_resilience_circuitbreaker::{CircuitBreaker, CircuitConfig, CircuitState};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let breaker = CircuitBreaker::builder()
//!     .circuit(
//!         "llm-api",
//!         CircuitConfig::builder()
//!             .error_threshold(0.5)
//!             .success_threshold(2)
//!             .timeout(Duration::from_secs(1))
//!             .build(),
//!     )
//!     .on_state_transition(|name, from, to| {
//!         println!("{}: {} -> {}", name, from, to);
//!     })
//!     .build();
//!
//! for _ in 0..5 {
//!     breaker.record_error("llm-api");
//! }
//! assert!(breaker.is_open("llm-api"));
//! assert_eq!(breaker.state("disk"), CircuitState::Closed);
//! # }
//! ```
//!
//! ## Admission control
//!
//! [`CircuitBreaker::try_acquire`] answers "may I call now?": closed circuits
//! admit, open circuits reject, and half-open circuits admit at most
//! `half_open_requests` trial calls in flight. A caller that uses it directly
//! must report the outcome of every admitted call.
//!
//! [`CircuitBreaker::acquire`] makes the same decision but returns a
//! [`CallPermit`]; a permit dropped without an outcome gives its trial slot
//! back. [`CircuitBreakerLayer`] wraps a tower service with permits, so a
//! cancelled call never keeps a half-open circuit saturated.
//!
//! ## Runtime
//!
//! Open timers are tokio tasks, so circuits should be driven from within a
//! tokio runtime. Without one, an expired open circuit is promoted to
//! half-open lazily by the next [`CircuitBreaker::try_acquire`].

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_gauge, gauge};
use parking_lot::{Mutex, RwLock};
use pipeline_resilience_core::events::{EventListener, EventListeners, FnListener};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

mod circuit;
mod config;
mod error;
mod events;
mod layer;
mod monitor;
mod permit;
mod registry;

pub use circuit::{CircuitMetrics, CircuitState, CircuitStatistics, MIN_SAMPLES};
pub use config::{CircuitConfig, CircuitConfigBuilder, CircuitConfigUpdate};
pub use error::CircuitBreakerError;
pub use events::CircuitEvent;
pub use layer::{
    CircuitBreakerLayer, CircuitBreakerService, DefaultClassifier, FailureClassifier, FnClassifier,
};
pub use monitor::ERROR_RATE_WARNING;
pub use permit::CallPermit;

use circuit::Circuit;
use registry::{CircuitCell, CircuitRegistry};

struct Inner {
    registry: CircuitRegistry,
    listeners: RwLock<EventListeners<CircuitEvent>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

/// Owned registry of circuits plus the state machine that drives them.
///
/// Cloning is cheap and every clone shares the same circuits, so one breaker
/// is created per process and handed to each pipeline stage.
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<Inner>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("circuits", &self.inner.registry.len())
            .finish()
    }
}

impl CircuitBreaker {
    /// Creates a new builder.
    pub fn builder() -> CircuitBreakerBuilder {
        CircuitBreakerBuilder::new()
    }

    /// Records a successful call for `name`.
    pub fn record_success(&self, name: &str) {
        let config = self.inner.registry.config(name);
        let event = self.with_circuit(name, |cell, circuit| {
            circuit
                .record_success(&config)
                .map(|to| self.enter(cell, circuit, name, to, &config))
        });

        #[cfg(feature = "metrics")]
        counter!("circuitbreaker_calls_total", "circuitbreaker" => name.to_string(), "outcome" => "success").increment(1);

        self.emit_all(event);
    }

    /// Records a failed call for `name`.
    pub fn record_error(&self, name: &str) {
        let config = self.inner.registry.config(name);
        let event = self.with_circuit(name, |cell, circuit| {
            circuit
                .record_error(&config)
                .map(|to| self.enter(cell, circuit, name, to, &config))
        });

        #[cfg(feature = "metrics")]
        counter!("circuitbreaker_calls_total", "circuitbreaker" => name.to_string(), "outcome" => "error").increment(1);

        self.emit_all(event);
    }

    /// Returns the state of `name`; unknown circuits are closed.
    pub fn state(&self, name: &str) -> CircuitState {
        self.inner
            .registry
            .get(name)
            .map(|cell| cell.lock().state())
            .unwrap_or_default()
    }

    /// Returns true if `name` is open.
    pub fn is_open(&self, name: &str) -> bool {
        self.state(name) == CircuitState::Open
    }

    /// Returns true if `name` is half-open.
    pub fn is_half_open(&self, name: &str) -> bool {
        self.state(name) == CircuitState::HalfOpen
    }

    /// Forces `name` open and (re)arms its half-open timer.
    pub fn open(&self, name: &str) {
        self.force(name, CircuitState::Open);
    }

    /// Forces `name` half-open.
    pub fn half_open(&self, name: &str) {
        self.force(name, CircuitState::HalfOpen);
    }

    /// Forces `name` closed.
    pub fn close(&self, name: &str) {
        self.force(name, CircuitState::Closed);
    }

    /// Drops every trace of `name`: state, counters, window and timer.
    ///
    /// Configuration set through [`configure`](Self::configure) or the
    /// builder is kept.
    pub fn reset(&self, name: &str) {
        if let Some(cell) = self.inner.registry.remove(name) {
            cell.lock().cancel_timer();
        }

        tracing::info!(circuit = name, "Circuit reset");

        self.emit(&CircuitEvent::Reset {
            name: name.to_string(),
            timestamp: Instant::now(),
        });
    }

    /// Merges `update` over the current configuration of `name`.
    pub fn configure(&self, name: &str, update: impl Into<CircuitConfigUpdate>) -> CircuitConfig {
        let update = update.into();
        let config = self.inner.registry.configure(name, &update);
        tracing::debug!(circuit = name, ?config, "Circuit configured");
        config
    }

    /// Effective configuration of `name`.
    pub fn config(&self, name: &str) -> CircuitConfig {
        self.inner.registry.config(name)
    }

    /// Windowed error rate of `name`; zero below [`MIN_SAMPLES`] samples.
    pub fn error_rate(&self, name: &str) -> f64 {
        let config = self.inner.registry.config(name);
        self.inner
            .registry
            .get(name)
            .map(|cell| cell.lock().error_rate(&config))
            .unwrap_or(0.0)
    }

    /// Snapshot of one circuit. Unknown circuits report closed with zeroed counters.
    pub fn statistics(&self, name: &str) -> CircuitStatistics {
        let config = self.inner.registry.config(name);
        match self.inner.registry.get(name) {
            Some(cell) => cell.lock().statistics(name, config),
            None => CircuitStatistics::unknown(name, config),
        }
    }

    /// Snapshots of every known circuit, ordered by name.
    pub fn all_statistics(&self) -> Vec<CircuitStatistics> {
        self.inner
            .registry
            .entries()
            .into_iter()
            .map(|(name, cell)| {
                let config = self.inner.registry.config(&name);
                let stats = cell.lock().statistics(&name, config);
                stats
            })
            .collect()
    }

    /// Names of every known circuit, ordered.
    pub fn names(&self) -> Vec<String> {
        self.inner
            .registry
            .entries()
            .into_iter()
            .map(|(name, _)| name)
            .collect()
    }

    /// Asks whether a call to `name` may proceed now.
    ///
    /// Closed circuits admit every call. Open circuits reject until their
    /// timeout elapsed. Half-open circuits admit at most `half_open_requests`
    /// trial calls whose outcome has not been recorded yet, so every admitted
    /// call must be followed by [`record_success`](Self::record_success) or
    /// [`record_error`](Self::record_error). Use [`acquire`](Self::acquire)
    /// when the call may be cancelled.
    pub fn try_acquire(&self, name: &str) -> bool {
        self.admission(name).is_some()
    }

    /// Like [`try_acquire`](Self::try_acquire), but returns a [`CallPermit`]
    /// that gives its half-open trial slot back if dropped without an outcome.
    pub fn acquire(&self, name: &str) -> Option<CallPermit> {
        self.admission(name)
            .map(|trial| CallPermit::new(self.clone(), name, trial))
    }

    /// Admission decision shared by [`try_acquire`](Self::try_acquire) and
    /// [`acquire`](Self::acquire). `Some(Some(..))` carries the trial slot taken
    /// on a half-open circuit.
    fn admission(&self, name: &str) -> Option<Option<(CircuitCell, u64)>> {
        let Some(cell) = self.inner.registry.get(name) else {
            return Some(None);
        };
        let config = self.inner.registry.config(name);

        let (permitted, state, trial, promoted) = {
            let mut circuit = cell.lock();
            let promoted = circuit
                .open_expired(&config)
                .then(|| self.enter(&cell, &mut circuit, name, CircuitState::HalfOpen, &config));
            let permitted = circuit.admit(&config);
            let trial = (permitted && circuit.state() == CircuitState::HalfOpen)
                .then(|| circuit.trial_period());
            (permitted, circuit.state(), trial, promoted)
        };

        self.emit_all(promoted);

        if !permitted {
            tracing::debug!(circuit = name, state = %state, "Call rejected");

            #[cfg(feature = "metrics")]
            counter!("circuitbreaker_calls_total", "circuitbreaker" => name.to_string(), "outcome" => "rejected").increment(1);

            self.emit(&CircuitEvent::CallRejected {
                name: name.to_string(),
                timestamp: Instant::now(),
                state,
            });
            return None;
        }
        Some(trial.map(|period| (cell, period)))
    }

    /// Registers a listener at runtime.
    pub fn add_listener<L>(&self, listener: L)
    where
        L: EventListener<CircuitEvent> + 'static,
    {
        self.inner.listeners.write().add(listener);
    }

    /// Cancels every timer and the monitor, and detaches all listeners.
    ///
    /// Circuit state is kept; an open circuit stays open until it is
    /// promoted by [`try_acquire`](Self::try_acquire) or moved manually.
    pub fn shutdown(&self) {
        for (_, cell) in self.inner.registry.entries() {
            cell.lock().cancel_timer();
        }
        self.stop_monitoring();
        self.inner.listeners.write().clear();
        tracing::debug!("Circuit breaker shut down");
    }

    /// Returns true if `name` has a pending half-open timer.
    pub fn has_pending_timer(&self, name: &str) -> bool {
        self.inner
            .registry
            .get(name)
            .map(|cell| cell.lock().has_timer())
            .unwrap_or(false)
    }

    fn force(&self, name: &str, to: CircuitState) {
        let config = self.inner.registry.config(name);
        let event =
            self.with_circuit(name, |cell, circuit| self.enter(cell, circuit, name, to, &config));
        self.emit(&event);
    }

    /// Runs `f` on the circuit registered for `name`, creating it if needed.
    ///
    /// The cell is checked against the registry once locked, so an update
    /// racing with [`reset`](Self::reset) lands in the replacement circuit
    /// instead of the removed one.
    fn with_circuit<R>(&self, name: &str, f: impl FnOnce(&CircuitCell, &mut Circuit) -> R) -> R {
        loop {
            let cell = self.inner.registry.get_or_insert(name);
            let mut circuit = cell.lock();
            if self.inner.registry.is_current(name, &cell) {
                return f(&cell, &mut *circuit);
            }
        }
    }

    /// Applies a transition under the circuit lock and returns the event to
    /// publish once the lock is released.
    fn enter(
        &self,
        cell: &CircuitCell,
        circuit: &mut Circuit,
        name: &str,
        to: CircuitState,
        config: &CircuitConfig,
    ) -> CircuitEvent {
        let from = circuit.transition(to);

        if to == CircuitState::Open {
            self.arm_half_open_timer(cell, circuit, name, config.timeout);
        }

        match to {
            CircuitState::Open => {
                tracing::warn!(circuit = name, from = %from, timeout = ?config.timeout, "Circuit opened")
            }
            _ => tracing::info!(circuit = name, from = %from, to = %to, "Circuit state transition"),
        }

        #[cfg(feature = "metrics")]
        {
            counter!(
                "circuitbreaker_transitions_total",
                "circuitbreaker" => name.to_string(),
                "from" => from.as_str(),
                "to" => to.as_str()
            )
            .increment(1);
            gauge!("circuitbreaker_state", "circuitbreaker" => name.to_string())
                .set(to as u8 as f64);
        }

        CircuitEvent::StateTransition {
            name: name.to_string(),
            timestamp: Instant::now(),
            from_state: from,
            to_state: to,
        }
    }

    fn arm_half_open_timer(
        &self,
        cell: &CircuitCell,
        circuit: &mut Circuit,
        name: &str,
        timeout: Duration,
    ) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(
                circuit = name,
                "No tokio runtime; circuit will half-open on the next admission check"
            );
            return;
        };

        let generation = circuit.generation();
        let cell: Weak<Mutex<Circuit>> = Arc::downgrade(cell);
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        let name = name.to_string();

        let timer = runtime.spawn(async move {
            tokio::time::sleep(timeout).await;

            let (Some(cell), Some(inner)) = (cell.upgrade(), inner.upgrade()) else {
                return;
            };
            let breaker = CircuitBreaker { inner };
            let config = breaker.inner.registry.config(&name);

            let event = {
                let mut circuit = cell.lock();
                if circuit.generation() != generation
                    || circuit.state() != CircuitState::Open
                    || !breaker.inner.registry.is_current(&name, &cell)
                {
                    return;
                }
                circuit.detach_timer();
                breaker.enter(&cell, &mut circuit, &name, CircuitState::HalfOpen, &config)
            };
            breaker.emit(&event);
        });

        circuit.arm_timer(timer);
    }

    fn emit(&self, event: &CircuitEvent) {
        let listeners = self.inner.listeners.read().clone();
        listeners.emit(event);
    }

    fn emit_all(&self, events: impl IntoIterator<Item = CircuitEvent>) {
        for event in events {
            self.emit(&event);
        }
    }
}

/// Builder for [`CircuitBreaker`].
pub struct CircuitBreakerBuilder {
    default_config: CircuitConfig,
    presets: HashMap<String, CircuitConfig>,
    listeners: EventListeners<CircuitEvent>,
}

impl CircuitBreakerBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        #[cfg(feature = "metrics")]
        METRICS_INIT.call_once(|| {
            describe_counter!(
                "circuitbreaker_calls_total",
                "Outcomes reported to and admissions refused by circuits"
            );
            describe_counter!(
                "circuitbreaker_transitions_total",
                "Total number of circuit state transitions"
            );
            describe_gauge!(
                "circuitbreaker_state",
                "Current circuit state (0 = closed, 1 = open, 2 = half-open)"
            );
            describe_gauge!(
                "circuitbreaker_error_rate",
                "Windowed error rate observed by the monitor"
            );
        });

        Self {
            default_config: CircuitConfig::default(),
            presets: HashMap::new(),
            listeners: EventListeners::new(),
        }
    }

    /// Configuration used by circuits without their own.
    ///
    /// Default: [`CircuitConfig::default`]
    pub fn default_config(mut self, config: CircuitConfig) -> Self {
        self.default_config = config;
        self
    }

    /// Configuration for a specific circuit.
    pub fn circuit<N: Into<String>>(mut self, name: N, config: CircuitConfig) -> Self {
        self.presets.insert(name.into(), config);
        self
    }

    /// Registers a listener for every circuit notification.
    pub fn listener<L>(mut self, listener: L) -> Self
    where
        L: EventListener<CircuitEvent> + 'static,
    {
        self.listeners.add(listener);
        self
    }

    /// Registers a callback invoked on every state transition.
    ///
    /// # Callback Signature
    /// `Fn(&str, CircuitState, CircuitState)` - circuit key, previous state, new state.
    pub fn on_state_transition<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.listeners
            .add(FnListener::new(move |event: &CircuitEvent| {
                if let CircuitEvent::StateTransition {
                    name,
                    from_state,
                    to_state,
                    ..
                } = event
                {
                    f(name, *from_state, *to_state);
                }
            }));
        self
    }

    /// Registers a callback invoked when [`CircuitBreaker::try_acquire`] refuses a call.
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.listeners
            .add(FnListener::new(move |event: &CircuitEvent| {
                if let CircuitEvent::CallRejected { name, .. } = event {
                    f(name);
                }
            }));
        self
    }

    /// Registers a callback receiving each health snapshot from the monitor.
    pub fn on_health<F>(mut self, f: F) -> Self
    where
        F: Fn(&CircuitStatistics) + Send + Sync + 'static,
    {
        self.listeners
            .add(FnListener::new(move |event: &CircuitEvent| {
                if let CircuitEvent::Health { statistics, .. } = event {
                    f(statistics);
                }
            }));
        self
    }

    /// Builds the breaker.
    pub fn build(self) -> CircuitBreaker {
        CircuitBreaker {
            inner: Arc::new(Inner {
                registry: CircuitRegistry::new(self.default_config, self.presets),
                listeners: RwLock::new(self.listeners),
                monitor: Mutex::new(None),
            }),
        }
    }
}

impl Default for CircuitBreakerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
