//! Time-bounded outcome window.
//!
//! Samples are appended in time order, so pruning only ever pops from the
//! front. Every write prunes samples older than the retention period;
//! queries may look at any trailing span up to that retention.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Sample {
    at: Instant,
    is_error: bool,
}

/// Counts of samples inside a trailing span.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowCounts {
    /// Number of samples in the span.
    pub total: usize,
    /// Number of error samples in the span.
    pub errors: usize,
}

impl WindowCounts {
    /// Error ratio, or `0.0` when fewer than `min_samples` samples were seen.
    pub fn error_rate(&self, min_samples: usize) -> f64 {
        if self.total == 0 || self.total < min_samples {
            return 0.0;
        }
        self.errors as f64 / self.total as f64
    }
}

/// A sliding window of success/error samples.
#[derive(Debug, Clone)]
pub struct TimeWindow {
    retention: Duration,
    samples: VecDeque<Sample>,
}

impl TimeWindow {
    /// Creates an empty window keeping samples for `retention`.
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            samples: VecDeque::new(),
        }
    }

    /// Records an outcome observed now.
    pub fn record(&mut self, is_error: bool) {
        self.record_at(Instant::now(), is_error);
    }

    /// Records an outcome observed at `at`.
    ///
    /// `at` must not be earlier than the newest recorded sample.
    pub fn record_at(&mut self, at: Instant, is_error: bool) {
        self.prune(at);
        self.samples.push_back(Sample { at, is_error });
    }

    /// Counts samples no older than `span`, measured from now.
    pub fn counts_within(&self, span: Duration) -> WindowCounts {
        let now = Instant::now();
        let mut counts = WindowCounts::default();
        for sample in self.samples.iter().rev() {
            if now.saturating_duration_since(sample.at) > span {
                break;
            }
            counts.total += 1;
            if sample.is_error {
                counts.errors += 1;
            }
        }
        counts
    }

    /// Number of retained samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if no samples are retained.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Drops every sample.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    fn prune(&mut self, now: Instant) {
        while let Some(sample) = self.samples.front() {
            if now.saturating_duration_since(sample.at) > self.retention {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }
}
