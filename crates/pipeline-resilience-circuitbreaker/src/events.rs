use crate::circuit::{CircuitState, CircuitStatistics};
use pipeline_resilience_core::events::ResilienceEvent;
use std::time::Instant;

/// Notifications emitted by the circuit breaker.
#[derive(Debug, Clone)]
pub enum CircuitEvent {
    /// A circuit entered a new state (opened, half-opened or closed).
    StateTransition {
        name: String,
        timestamp: Instant,
        from_state: CircuitState,
        to_state: CircuitState,
    },
    /// A circuit was reset to its implicit default.
    Reset { name: String, timestamp: Instant },
    /// Periodic health snapshot from the monitor.
    Health {
        name: String,
        timestamp: Instant,
        statistics: CircuitStatistics,
    },
    /// A call asked for admission and was refused.
    CallRejected {
        name: String,
        timestamp: Instant,
        state: CircuitState,
    },
}

impl ResilienceEvent for CircuitEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CircuitEvent::StateTransition { to_state, .. } => match to_state {
                CircuitState::Open => "opened",
                CircuitState::HalfOpen => "half_opened",
                CircuitState::Closed => "closed",
            },
            CircuitEvent::Reset { .. } => "reset",
            CircuitEvent::Health { .. } => "health",
            CircuitEvent::CallRejected { .. } => "call_rejected",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CircuitEvent::StateTransition { timestamp, .. }
            | CircuitEvent::Reset { timestamp, .. }
            | CircuitEvent::Health { timestamp, .. }
            | CircuitEvent::CallRejected { timestamp, .. } => *timestamp,
        }
    }

    fn source(&self) -> &str {
        match self {
            CircuitEvent::StateTransition { name, .. }
            | CircuitEvent::Reset { name, .. }
            | CircuitEvent::Health { name, .. }
            | CircuitEvent::CallRejected { name, .. } => name,
        }
    }
}
