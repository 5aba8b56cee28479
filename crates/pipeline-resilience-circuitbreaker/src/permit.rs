use crate::CircuitBreaker;
use crate::registry::CircuitCell;
use std::fmt;

/// Admission to one call on a circuit, obtained from [`CircuitBreaker::acquire`].
///
/// Report the outcome with [`record_success`](Self::record_success) or
/// [`record_error`](Self::record_error). A permit dropped without an outcome,
/// for example because the caller's future was cancelled, hands its half-open
/// trial slot back so the circuit does not stay saturated.
#[must_use = "dropping a permit without recording an outcome abandons the call"]
pub struct CallPermit {
    breaker: CircuitBreaker,
    name: String,
    trial: Option<(CircuitCell, u64)>,
}

impl CallPermit {
    pub(crate) fn new(
        breaker: CircuitBreaker,
        name: &str,
        trial: Option<(CircuitCell, u64)>,
    ) -> Self {
        Self {
            breaker,
            name: name.to_string(),
            trial,
        }
    }

    /// Circuit this permit was issued for.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if the permit holds one of the half-open trial slots.
    pub fn is_trial(&self) -> bool {
        self.trial.is_some()
    }

    /// Reports a successful call.
    pub fn record_success(mut self) {
        self.trial = None;
        self.breaker.record_success(&self.name);
    }

    /// Reports a failed call.
    pub fn record_error(mut self) {
        self.trial = None;
        self.breaker.record_error(&self.name);
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if let Some((cell, period)) = self.trial.take() {
            cell.lock().abandon_trial(period);
            tracing::debug!(circuit = %self.name, "Trial call abandoned without an outcome");
        }
    }
}

impl fmt::Debug for CallPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallPermit")
            .field("name", &self.name)
            .field("trial", &self.trial.is_some())
            .finish()
    }
}
