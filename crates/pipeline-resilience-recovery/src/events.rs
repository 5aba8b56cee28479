use crate::policy::{RecoveryStrategy, Severity};
use pipeline_resilience_core::events::ResilienceEvent;
use std::time::{Duration, Instant};

/// Why an alert was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertReason {
    /// Errors for the agent/operation pair reached the policy's alert threshold.
    ThresholdReached { recent_errors: usize, threshold: u32 },
    /// The policy chain contains an ALERT step.
    Strategy,
}

/// Events emitted by the recovery manager.
#[derive(Debug, Clone)]
pub enum RecoveryEvent {
    /// Someone should look at this agent/operation pair.
    Alert {
        name: String,
        timestamp: Instant,
        agent: String,
        operation: String,
        severity: Severity,
        reason: AlertReason,
        message: String,
    },
    /// A SHUTDOWN step ran; the host should stop the pipeline.
    ShutdownRequired {
        name: String,
        timestamp: Instant,
        agent: String,
        operation: String,
        message: String,
    },
    /// A retry request is about to be sent after `delay`.
    RetryScheduled {
        name: String,
        timestamp: Instant,
        agent: String,
        operation: String,
        attempt: u32,
        delay: Duration,
    },
    /// A strategy finished.
    StrategyOutcome {
        name: String,
        timestamp: Instant,
        agent: String,
        operation: String,
        strategy: RecoveryStrategy,
        success: bool,
        attempts: u32,
    },
}

impl ResilienceEvent for RecoveryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RecoveryEvent::Alert { .. } => "alert",
            RecoveryEvent::ShutdownRequired { .. } => "shutdown_required",
            RecoveryEvent::RetryScheduled { .. } => "retry_scheduled",
            RecoveryEvent::StrategyOutcome { .. } => "strategy_outcome",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RecoveryEvent::Alert { timestamp, .. }
            | RecoveryEvent::ShutdownRequired { timestamp, .. }
            | RecoveryEvent::RetryScheduled { timestamp, .. }
            | RecoveryEvent::StrategyOutcome { timestamp, .. } => *timestamp,
        }
    }

    fn source(&self) -> &str {
        match self {
            RecoveryEvent::Alert { name, .. }
            | RecoveryEvent::ShutdownRequired { name, .. }
            | RecoveryEvent::RetryScheduled { name, .. }
            | RecoveryEvent::StrategyOutcome { name, .. } => name,
        }
    }
}
