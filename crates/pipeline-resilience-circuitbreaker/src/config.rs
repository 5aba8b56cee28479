use std::time::Duration;

/// Per-circuit configuration.
///
/// Defaults: `error_threshold = 0.5`, `success_threshold = 5`,
/// `timeout = 60s`, `half_open_requests = 3`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CircuitConfig {
    /// Windowed error rate (0.0 to 1.0) above which a closed circuit opens.
    pub error_threshold: f64,
    /// Consecutive successes needed in half-open to close the circuit.
    pub success_threshold: u32,
    /// How long the circuit stays open; also the span of the error-rate window.
    #[cfg_attr(feature = "serde", serde(with = "duration_millis"))]
    pub timeout: Duration,
    /// Maximum concurrent trial calls admitted while half-open.
    pub half_open_requests: u32,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            error_threshold: 0.5,
            success_threshold: 5,
            timeout: Duration::from_secs(60),
            half_open_requests: 3,
        }
    }
}

impl CircuitConfig {
    /// Creates a new configuration builder starting from the defaults.
    pub fn builder() -> CircuitConfigBuilder {
        CircuitConfigBuilder::new()
    }

    /// Returns a copy with the fields present in `update` replaced.
    pub fn merged(self, update: &CircuitConfigUpdate) -> Self {
        Self {
            error_threshold: update
                .error_threshold
                .map(clamp_rate)
                .unwrap_or(self.error_threshold),
            success_threshold: update
                .success_threshold
                .map(|n| n.max(1))
                .unwrap_or(self.success_threshold),
            timeout: update.timeout.unwrap_or(self.timeout),
            half_open_requests: update
                .half_open_requests
                .map(|n| n.max(1))
                .unwrap_or(self.half_open_requests),
        }
    }
}

/// Builder for [`CircuitConfig`].
#[derive(Debug, Clone, Default)]
pub struct CircuitConfigBuilder {
    update: CircuitConfigUpdate,
}

impl CircuitConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the error rate at which the circuit opens. Clamped to `0.0..=1.0`.
    ///
    /// Default: 0.5 (50%)
    pub fn error_threshold(mut self, rate: f64) -> Self {
        self.update.error_threshold = Some(rate);
        self
    }

    /// Sets the consecutive successes needed to close from half-open. Minimum 1.
    ///
    /// Default: 5
    pub fn success_threshold(mut self, n: u32) -> Self {
        self.update.success_threshold = Some(n);
        self
    }

    /// Sets how long the circuit stays open before probing.
    ///
    /// Default: 60 seconds
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.update.timeout = Some(timeout);
        self
    }

    /// Sets how many trial calls may be in flight while half-open. Minimum 1.
    ///
    /// Default: 3
    pub fn half_open_requests(mut self, n: u32) -> Self {
        self.update.half_open_requests = Some(n);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> CircuitConfig {
        CircuitConfig::default().merged(&self.update)
    }
}

/// A partial configuration merged over a circuit's current configuration.
///
/// ```rust
/// use pipeline_resilience_circuitbreaker::{CircuitConfig, CircuitConfigUpdate};
/// use std::time::Duration;
///
/// let update = CircuitConfigUpdate::new().timeout(Duration::from_secs(5));
/// let config = CircuitConfig::default().merged(&update);
///
/// assert_eq!(config.timeout, Duration::from_secs(5));
/// assert_eq!(config.success_threshold, 5);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CircuitConfigUpdate {
    /// New error threshold.
    pub error_threshold: Option<f64>,
    /// New success threshold.
    pub success_threshold: Option<u32>,
    /// New open timeout.
    #[cfg_attr(feature = "serde", serde(with = "option_duration_millis"))]
    pub timeout: Option<Duration>,
    /// New half-open admission cap.
    pub half_open_requests: Option<u32>,
}

impl CircuitConfigUpdate {
    /// Creates an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the error threshold.
    pub fn error_threshold(mut self, rate: f64) -> Self {
        self.error_threshold = Some(rate);
        self
    }

    /// Overrides the success threshold.
    pub fn success_threshold(mut self, n: u32) -> Self {
        self.success_threshold = Some(n);
        self
    }

    /// Overrides the open timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Overrides the half-open admission cap.
    pub fn half_open_requests(mut self, n: u32) -> Self {
        self.half_open_requests = Some(n);
        self
    }

    /// Returns true if no field is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl From<CircuitConfig> for CircuitConfigUpdate {
    fn from(config: CircuitConfig) -> Self {
        Self {
            error_threshold: Some(config.error_threshold),
            success_threshold: Some(config.success_threshold),
            timeout: Some(config.timeout),
            half_open_requests: Some(config.half_open_requests),
        }
    }
}

fn clamp_rate(rate: f64) -> f64 {
    if rate.is_nan() {
        return CircuitConfig::default().error_threshold;
    }
    rate.clamp(0.0, 1.0)
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

#[cfg(feature = "serde")]
mod option_duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|ms| ms.map(Duration::from_millis))
    }
}
