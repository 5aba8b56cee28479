//! Core infrastructure for pipeline-resilience.
//!
//! This crate provides functionality shared by the circuit breaker and the
//! recovery manager:
//! - Event system for observability
//! - A unified error type for callers composing both patterns
//! - Time-bounded sample windows and bounded history buffers

pub mod error;
pub mod events;
pub mod history;
pub mod window;

pub use error::{BoxError, ResilienceError};
pub use events::{EventListener, EventListeners, FnListener, ResilienceEvent};
pub use history::BoundedHistory;
pub use window::{TimeWindow, WindowCounts};
