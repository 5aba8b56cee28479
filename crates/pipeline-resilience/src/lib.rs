//! Circuit breaking and severity-driven recovery for multi-stage pipelines.
//!
//! `pipeline-resilience` bundles the pattern crates behind features:
//!
//! - **Circuit Breaker** (`circuitbreaker` feature): per-key circuits that stop
//!   calls to a failing dependency and try it again after a timeout
//! - **Recovery** (`recovery` feature): severity policies that retry, fall
//!   back, skip, alert or request a shutdown
//!
//! With both enabled (the default `full` feature), [`Resilience`] owns one
//! breaker and one recovery manager and is handed to every pipeline stage.
//!
//! # Example
//!
//! ```rust
//! # #[cfg(feature = "full")]
//! # {
//! use pipeline_resilience::Resilience;
//! use pipeline_resilience::recovery::Severity;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let resilience: Resilience<String> = Resilience::builder().build();
//!
//! let outcome = resilience
//!     .execute("llm-api", "drafter", "draft", Severity::Low, || async {
//!         Err::<String, _>(std::io::Error::other("upstream 503"))
//!     })
//!     .await;
//!
//! // LOW errors end in SKIP when there is nobody to serve retries
//! assert_eq!(outcome.unwrap(), None);
//! assert_eq!(resilience.breaker().statistics("llm-api").metrics.error_count, 1);
//! # }
//! # }
//! ```

// Re-export core (always available)
pub use pipeline_resilience_core as core;

// Re-export patterns based on features
#[cfg(feature = "circuitbreaker")]
pub use pipeline_resilience_circuitbreaker as circuitbreaker;

#[cfg(feature = "recovery")]
pub use pipeline_resilience_recovery as recovery;

#[cfg(all(feature = "circuitbreaker", feature = "recovery"))]
mod resilience;

#[cfg(all(feature = "circuitbreaker", feature = "recovery"))]
pub use resilience::{Resilience, ResilienceBuilder, ResilienceStatistics};
