//! Property tests for retry backoff.
//!
//! Invariants tested:
//! - Delays never exceed the configured maximum
//! - Delays never shrink as the attempt number grows (multiplier >= 1)

use pipeline_resilience_recovery::backoff_delay;
use proptest::prelude::*;
use std::time::Duration;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: the delay is capped at max
    #[test]
    fn delay_is_capped(
        attempt in 1u32..=64,
        multiplier in 1.0f64..=4.0,
        base_ms in 1u64..=5_000,
        max_ms in 1u64..=60_000,
    ) {
        let delay = backoff_delay(
            attempt,
            multiplier,
            Duration::from_millis(base_ms),
            Duration::from_millis(max_ms),
        );
        prop_assert!(delay <= Duration::from_millis(max_ms));
    }

    /// Property: the delay is monotone in the attempt number
    #[test]
    fn delay_is_monotone(
        attempt in 1u32..=32,
        multiplier in 1.0f64..=4.0,
        base_ms in 1u64..=5_000,
    ) {
        let base = Duration::from_millis(base_ms);
        let max = Duration::from_secs(30);
        let now = backoff_delay(attempt, multiplier, base, max);
        let next = backoff_delay(attempt + 1, multiplier, base, max);
        prop_assert!(next >= now, "{:?} then {:?}", now, next);
    }

    /// Property: the first attempt waits the base delay when it fits under max
    #[test]
    fn first_attempt_waits_base(multiplier in 0.5f64..=4.0, base_ms in 1u64..=30_000) {
        let base = Duration::from_millis(base_ms);
        prop_assert_eq!(backoff_delay(1, multiplier, base, Duration::from_secs(30)), base);
    }
}
