use crate::policy::{RecoveryStrategy, Severity};
use std::collections::BTreeMap;

/// Aggregate counters of a recovery manager.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RecoveryStatistics {
    /// Errors passed to `handle_error`.
    pub total_errors: u64,
    /// Errors some strategy recovered.
    pub recovered: u64,
    /// Errors no strategy recovered.
    pub failed: u64,
    /// Recoveries per winning strategy.
    pub by_strategy: BTreeMap<RecoveryStrategy, u64>,
    /// Errors per severity.
    pub by_severity: BTreeMap<Severity, u64>,
    /// Entries currently retained in the error history.
    pub history_len: usize,
}

impl RecoveryStatistics {
    /// Share of handled errors that were recovered, or zero before the first error.
    pub fn recovery_rate(&self) -> f64 {
        if self.total_errors == 0 {
            0.0
        } else {
            self.recovered as f64 / self.total_errors as f64
        }
    }

    pub(crate) fn record_error(&mut self, severity: Severity) {
        self.total_errors += 1;
        *self.by_severity.entry(severity).or_default() += 1;
    }

    pub(crate) fn record_recovered(&mut self, strategy: RecoveryStrategy) {
        self.recovered += 1;
        *self.by_strategy.entry(strategy).or_default() += 1;
    }

    pub(crate) fn record_failed(&mut self) {
        self.failed += 1;
    }
}
