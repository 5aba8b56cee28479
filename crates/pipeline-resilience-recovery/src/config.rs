use std::time::Duration;

/// Runtime tunables of a recovery manager.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RecoveryConfig {
    /// Name used in events, logs and metrics.
    pub name: String,
    /// Delay before the first retry.
    #[cfg_attr(feature = "serde", serde(with = "duration_millis"))]
    pub base_delay: Duration,
    /// Upper bound of any retry delay.
    #[cfg_attr(feature = "serde", serde(with = "duration_millis"))]
    pub max_delay: Duration,
    /// How long a retry request may take to answer.
    #[cfg_attr(feature = "serde", serde(with = "duration_millis"))]
    pub retry_deadline: Duration,
    /// How long a fallback request may take to answer.
    #[cfg_attr(feature = "serde", serde(with = "duration_millis"))]
    pub fallback_deadline: Duration,
    /// Trailing span in which errors count towards an alert.
    #[cfg_attr(feature = "serde", serde(with = "duration_millis"))]
    pub alert_window: Duration,
    /// History size that triggers a trim.
    pub history_capacity: usize,
    /// Entries kept by a trim.
    pub history_trim_to: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            name: "recovery".to_string(),
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            retry_deadline: Duration::from_secs(30),
            fallback_deadline: Duration::from_secs(10),
            alert_window: Duration::from_secs(60 * 60),
            history_capacity: pipeline_resilience_core::history::DEFAULT_CAPACITY,
            history_trim_to: pipeline_resilience_core::history::DEFAULT_TRIM_TO,
        }
    }
}

impl RecoveryConfig {
    /// Creates a new builder with defaults.
    pub fn builder() -> RecoveryConfigBuilder {
        RecoveryConfigBuilder::new()
    }

    /// Delay before retry `attempt` (1-based): `base_delay * multiplier^(attempt - 1)`,
    /// capped at `max_delay`.
    pub fn backoff_delay(&self, attempt: u32, multiplier: f64) -> Duration {
        backoff_delay(attempt, multiplier, self.base_delay, self.max_delay)
    }
}

/// `min(base * multiplier^(attempt - 1), max)`, rounded to whole milliseconds.
///
/// Attempt 0 is treated as 1. Non-finite or negative growth yields `max` and
/// zero respectively.
pub fn backoff_delay(attempt: u32, multiplier: f64, base: Duration, max: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let millis = base.as_millis() as f64 * multiplier.powi(exponent);
    let cap = max.as_millis() as f64;

    if millis.is_nan() || millis <= 0.0 {
        Duration::ZERO
    } else if millis >= cap {
        max
    } else {
        Duration::from_millis(millis.round() as u64)
    }
}

/// Builder for [`RecoveryConfig`].
#[derive(Debug, Clone, Default)]
pub struct RecoveryConfigBuilder {
    config: RecoveryConfig,
}

impl RecoveryConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - name: `"recovery"`
    /// - base_delay: 1000ms, max_delay: 30000ms
    /// - retry_deadline: 30s, fallback_deadline: 10s
    /// - alert_window: 60 minutes
    /// - history: capacity 1000, trimmed to 500
    pub fn new() -> Self {
        Self::default()
    }

    /// Name used in events, logs and metrics. Default: `"recovery"`.
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.name = name.into();
        self
    }

    /// Delay before the first retry. Default: 1000ms.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.base_delay = delay;
        self
    }

    /// Upper bound on any retry delay. Default: 30000ms.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.max_delay = delay;
        self
    }

    /// How long one retry request may wait for a reply. Default: 30s.
    pub fn retry_deadline(mut self, deadline: Duration) -> Self {
        self.config.retry_deadline = deadline;
        self
    }

    /// How long a fallback request may wait for a reply. Default: 10s.
    pub fn fallback_deadline(mut self, deadline: Duration) -> Self {
        self.config.fallback_deadline = deadline;
        self
    }

    /// Window over which errors count toward the alert threshold. Default: 60 minutes.
    pub fn alert_window(mut self, window: Duration) -> Self {
        self.config.alert_window = window;
        self
    }

    /// Sets the history size that triggers a trim and the size it is trimmed to.
    ///
    /// `trim_to` is clamped to `capacity`.
    pub fn history(mut self, capacity: usize, trim_to: usize) -> Self {
        self.config.history_capacity = capacity;
        self.config.history_trim_to = trim_to.min(capacity);
        self
    }

    pub fn build(self) -> RecoveryConfig {
        self.config
    }
}

#[cfg(feature = "serde")]
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
