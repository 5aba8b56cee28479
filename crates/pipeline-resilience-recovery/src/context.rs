use crate::policy::Severity;
use pipeline_resilience_core::BoxError;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;

/// Error shared between the caller, the history and recovery results.
pub type SharedError = Arc<dyn Error + Send + Sync>;

/// Broad classification of a failure, for callers picking a severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ErrorKind {
    /// Likely to succeed when tried again (timeouts, rate limits, resets).
    Transient,
    /// Will fail again the same way (bad input, missing credentials).
    Permanent,
}

impl ErrorKind {
    /// Severity usually assigned to errors of this kind.
    ///
    /// Transient errors map to [`Severity::Medium`] so they are retried;
    /// permanent ones to [`Severity::High`] so they alert and fall back.
    pub fn suggested_severity(&self) -> Severity {
        match self {
            ErrorKind::Transient => Severity::Medium,
            ErrorKind::Permanent => Severity::High,
        }
    }
}

/// A failure reported to the recovery manager.
#[derive(Clone)]
pub struct ErrorContext {
    /// Pipeline stage that failed (e.g. "analyzer").
    pub agent: String,
    /// Operation within the stage (e.g. "summarize").
    pub operation: String,
    pub error: SharedError,
    /// When the failure happened. Drives the alert window.
    pub timestamp: Instant,
    pub severity: Severity,
    /// Attempts the caller already made before reporting.
    pub attempts: u32,
    pub metadata: BTreeMap<String, String>,
}

impl ErrorContext {
    /// Creates a context stamped with the current time and zero attempts.
    pub fn new(
        agent: impl Into<String>,
        operation: impl Into<String>,
        error: impl Into<BoxError>,
        severity: Severity,
    ) -> Self {
        let error: BoxError = error.into();
        Self {
            agent: agent.into(),
            operation: operation.into(),
            error: Arc::from(error),
            timestamp: Instant::now(),
            severity,
            attempts: 0,
            metadata: BTreeMap::new(),
        }
    }

    /// Creates a context whose severity follows [`ErrorKind::suggested_severity`].
    pub fn classified(
        agent: impl Into<String>,
        operation: impl Into<String>,
        error: impl Into<BoxError>,
        kind: ErrorKind,
    ) -> Self {
        Self::new(agent, operation, error, kind.suggested_severity())
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_timestamp(mut self, timestamp: Instant) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// True if both contexts concern the same agent and operation.
    pub fn same_source(&self, other: &ErrorContext) -> bool {
        self.agent == other.agent && self.operation == other.operation
    }
}

impl fmt::Debug for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorContext")
            .field("agent", &self.agent)
            .field("operation", &self.operation)
            .field("error", &self.error.to_string())
            .field("severity", &self.severity)
            .field("attempts", &self.attempts)
            .field("metadata", &self.metadata)
            .finish()
    }
}
