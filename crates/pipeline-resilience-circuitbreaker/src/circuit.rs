use crate::config::CircuitConfig;
use pipeline_resilience_core::TimeWindow;
use std::fmt;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Samples older than this are pruned from a circuit's window on every write.
pub(crate) const WINDOW_RETENTION: Duration = Duration::from_secs(300);

/// Below this many samples in the window the error rate reads as zero.
pub const MIN_SAMPLES: usize = 5;

/// Represents the state of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum CircuitState {
    /// Calls are allowed; outcomes feed the error-rate window.
    #[default]
    Closed,
    /// The dependency is considered unhealthy; calls should not be made.
    Open,
    /// Trial calls are probing whether the dependency recovered.
    HalfOpen,
}

impl CircuitState {
    /// Upper-case label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome counters for one circuit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CircuitMetrics {
    /// Total successes since the circuit was created or reset.
    pub success_count: u64,
    /// Total errors since the circuit was created or reset.
    pub error_count: u64,
    /// Successes since the last error or state reset.
    pub consecutive_successes: u32,
    /// Errors since the last success or state reset.
    pub consecutive_errors: u32,
    /// Wall-clock time of the last success.
    pub last_success_time: Option<SystemTime>,
    /// Wall-clock time of the last error.
    pub last_error_time: Option<SystemTime>,
}

/// Point-in-time view of a circuit.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CircuitStatistics {
    /// Circuit key.
    pub name: String,
    /// Current state.
    pub state: CircuitState,
    /// Outcome counters.
    pub metrics: CircuitMetrics,
    /// Windowed error rate, zero below [`MIN_SAMPLES`] samples.
    pub error_rate: f64,
    /// Effective configuration.
    pub config: CircuitConfig,
    /// Time spent in the current state.
    pub time_in_state: Duration,
}

impl CircuitStatistics {
    pub(crate) fn unknown(name: &str, config: CircuitConfig) -> Self {
        Self {
            name: name.to_string(),
            state: CircuitState::Closed,
            metrics: CircuitMetrics::default(),
            error_rate: 0.0,
            config,
            time_in_state: Duration::ZERO,
        }
    }
}

/// Mutable state of one circuit. Always accessed under its per-key lock.
pub(crate) struct Circuit {
    state: CircuitState,
    metrics: CircuitMetrics,
    window: TimeWindow,
    timer: Option<JoinHandle<()>>,
    // Bumped on every transition; a timer only fires for the generation it was armed in.
    generation: u64,
    // Bumped on every entry into half-open; trial slots belong to one period.
    trial_period: u64,
    half_open_in_flight: u32,
    state_changed_at: Instant,
}

impl Circuit {
    pub(crate) fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            metrics: CircuitMetrics::default(),
            window: TimeWindow::new(WINDOW_RETENTION),
            timer: None,
            generation: 0,
            trial_period: 0,
            half_open_in_flight: 0,
            state_changed_at: Instant::now(),
        }
    }

    pub(crate) fn state(&self) -> CircuitState {
        self.state
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn trial_period(&self) -> u64 {
        self.trial_period
    }

    #[cfg(test)]
    pub(crate) fn metrics(&self) -> CircuitMetrics {
        self.metrics
    }

    pub(crate) fn has_timer(&self) -> bool {
        self.timer.is_some()
    }

    pub(crate) fn error_rate(&self, config: &CircuitConfig) -> f64 {
        self.window
            .counts_within(config.timeout)
            .error_rate(MIN_SAMPLES)
    }

    /// Records a success and returns the state the circuit should move to, if any.
    pub(crate) fn record_success(&mut self, config: &CircuitConfig) -> Option<CircuitState> {
        self.metrics.success_count += 1;
        self.metrics.consecutive_successes = self.metrics.consecutive_successes.saturating_add(1);
        self.metrics.consecutive_errors = 0;
        self.metrics.last_success_time = Some(SystemTime::now());
        self.window.record(false);

        match self.state {
            CircuitState::HalfOpen => {
                self.release_trial();
                (self.metrics.consecutive_successes >= config.success_threshold)
                    .then_some(CircuitState::Closed)
            }
            _ => None,
        }
    }

    /// Records an error and returns the state the circuit should move to, if any.
    pub(crate) fn record_error(&mut self, config: &CircuitConfig) -> Option<CircuitState> {
        self.metrics.error_count += 1;
        self.metrics.consecutive_errors = self.metrics.consecutive_errors.saturating_add(1);
        self.metrics.consecutive_successes = 0;
        self.metrics.last_error_time = Some(SystemTime::now());
        self.window.record(true);

        match self.state {
            CircuitState::Closed => (self.error_rate(config) > config.error_threshold)
                .then_some(CircuitState::Open),
            CircuitState::HalfOpen => {
                self.release_trial();
                Some(CircuitState::Open)
            }
            CircuitState::Open => None,
        }
    }

    /// Moves to `to`, cancelling any pending timer. Returns the previous state.
    pub(crate) fn transition(&mut self, to: CircuitState) -> CircuitState {
        let from = self.state;
        self.cancel_timer();
        self.state = to;
        self.state_changed_at = Instant::now();
        self.half_open_in_flight = 0;
        if to == CircuitState::HalfOpen {
            self.trial_period = self.trial_period.wrapping_add(1);
        }
        if matches!(to, CircuitState::HalfOpen | CircuitState::Closed) {
            self.metrics.consecutive_successes = 0;
            self.metrics.consecutive_errors = 0;
        }
        from
    }

    /// True once an open circuit has waited out its timeout.
    pub(crate) fn open_expired(&self, config: &CircuitConfig) -> bool {
        self.state == CircuitState::Open && self.state_changed_at.elapsed() >= config.timeout
    }

    /// Admission decision for a new call.
    pub(crate) fn admit(&mut self, config: &CircuitConfig) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if self.half_open_in_flight < config.half_open_requests {
                    self.half_open_in_flight += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Stores the timer armed for the current generation.
    pub(crate) fn arm_timer(&mut self, timer: JoinHandle<()>) {
        if let Some(previous) = self.timer.replace(timer) {
            previous.abort();
        }
    }

    /// Forgets the timer handle without aborting it. Used by the timer task itself.
    pub(crate) fn detach_timer(&mut self) {
        self.timer.take();
    }

    /// Aborts the pending timer and invalidates any timer that already fired.
    pub(crate) fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.generation = self.generation.wrapping_add(1);
    }

    pub(crate) fn statistics(&self, name: &str, config: CircuitConfig) -> CircuitStatistics {
        CircuitStatistics {
            name: name.to_string(),
            state: self.state,
            metrics: self.metrics,
            error_rate: self.error_rate(&config),
            config,
            time_in_state: self.state_changed_at.elapsed(),
        }
    }

    /// Gives back a trial slot taken in `period` by a call that ended without
    /// reporting an outcome. Slots of an earlier period were already cleared.
    pub(crate) fn abandon_trial(&mut self, period: u64) {
        if self.state == CircuitState::HalfOpen && self.trial_period == period {
            self.release_trial();
        }
    }

    fn release_trial(&mut self) {
        self.half_open_in_flight = self.half_open_in_flight.saturating_sub(1);
    }
}
