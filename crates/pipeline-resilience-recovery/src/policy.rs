use std::collections::HashMap;
use std::fmt;

/// How bad an error is. Chosen by the caller; selects the recovery chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Every severity, from least to most severe.
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    /// Upper-case label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a recovery chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum RecoveryStrategy {
    /// Ask the caller to run the operation again, with backoff.
    Retry,
    /// Ask the caller for a substitute value.
    Fallback,
    /// Treat the failure as a no-op.
    Skip,
    /// Raise an alert. Never recovers.
    Alert,
    /// Signal that the process should stop. Never recovers.
    Shutdown,
}

impl RecoveryStrategy {
    /// Upper-case label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStrategy::Retry => "RETRY",
            RecoveryStrategy::Fallback => "FALLBACK",
            RecoveryStrategy::Skip => "SKIP",
            RecoveryStrategy::Alert => "ALERT",
            RecoveryStrategy::Shutdown => "SHUTDOWN",
        }
    }
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recovery chain and tunables for one severity.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RecoveryPolicy {
    pub severity: Severity,
    /// Strategies tried in order until one succeeds.
    pub strategies: Vec<RecoveryStrategy>,
    /// Retry requests sent by a RETRY step.
    pub max_attempts: u32,
    /// Growth factor of the retry delay.
    pub backoff_multiplier: f64,
    /// Recent errors for one agent/operation pair that trigger an alert.
    pub alert_threshold: u32,
}

impl RecoveryPolicy {
    /// Creates a policy with a single attempt, no backoff growth and an
    /// alert on every error. Adjust with the setters.
    pub fn new(severity: Severity, strategies: impl IntoIterator<Item = RecoveryStrategy>) -> Self {
        Self {
            severity,
            strategies: strategies.into_iter().collect(),
            max_attempts: 1,
            backoff_multiplier: 1.0,
            alert_threshold: 1,
        }
    }

    /// The built-in policy for `severity`.
    ///
    /// | Severity | Strategies | max_attempts | backoff_multiplier | alert_threshold |
    /// |---|---|---|---|---|
    /// | LOW | RETRY, SKIP | 3 | 1.5 | 10 |
    /// | MEDIUM | RETRY, FALLBACK | 5 | 2 | 5 |
    /// | HIGH | ALERT, FALLBACK | 3 | 2 | 2 |
    /// | CRITICAL | ALERT, SHUTDOWN | 1 | 1 | 1 |
    pub fn defaults_for(severity: Severity) -> Self {
        use RecoveryStrategy::*;
        match severity {
            Severity::Low => Self::new(severity, [Retry, Skip])
                .max_attempts(3)
                .backoff_multiplier(1.5)
                .alert_threshold(10),
            Severity::Medium => Self::new(severity, [Retry, Fallback])
                .max_attempts(5)
                .backoff_multiplier(2.0)
                .alert_threshold(5),
            Severity::High => Self::new(severity, [Alert, Fallback])
                .max_attempts(3)
                .backoff_multiplier(2.0)
                .alert_threshold(2),
            Severity::Critical => Self::new(severity, [Alert, Shutdown]),
        }
    }

    /// Number of retry attempts. Default: 1.
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Growth factor between retry delays. Default: 1.0.
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Errors within the alert window that raise an alert. Default: 1.
    pub fn alert_threshold(mut self, n: u32) -> Self {
        self.alert_threshold = n;
        self
    }
}

/// Severity to policy mapping.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PolicyTable {
    policies: HashMap<Severity, RecoveryPolicy>,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self {
            policies: Severity::ALL
                .into_iter()
                .map(|s| (s, RecoveryPolicy::defaults_for(s)))
                .collect(),
        }
    }
}

impl PolicyTable {
    /// A table without any policy; every lookup falls back to the built-in LOW policy.
    pub fn empty() -> Self {
        Self {
            policies: HashMap::new(),
        }
    }

    /// Installs `policy` for `severity`, returning the one it replaces.
    pub fn insert(&mut self, severity: Severity, policy: RecoveryPolicy) -> Option<RecoveryPolicy> {
        self.policies.insert(severity, policy)
    }

    /// Policy installed for `severity`, without the LOW fallback.
    pub fn get(&self, severity: Severity) -> Option<&RecoveryPolicy> {
        self.policies.get(&severity)
    }

    /// Policy applied to errors of `severity`: its own, else LOW's.
    pub fn resolve(&self, severity: Severity) -> RecoveryPolicy {
        self.get(severity)
            .or_else(|| self.get(Severity::Low))
            .cloned()
            .unwrap_or_else(|| RecoveryPolicy::defaults_for(Severity::Low))
    }
}
