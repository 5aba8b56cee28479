//! Property-based tests for pipeline-resilience.
//!
//! Run with: cargo test --test property_tests

pub mod backoff;
