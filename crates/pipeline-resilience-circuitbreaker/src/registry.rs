use crate::circuit::Circuit;
use crate::config::{CircuitConfig, CircuitConfigUpdate};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// One circuit behind its own lock; operations on a key are serialized here.
pub(crate) type CircuitCell = Arc<Mutex<Circuit>>;

/// Owned store of every circuit and its configuration.
///
/// The map locks are only held long enough to look up or insert a cell. A
/// circuit lock may be held while the map is read, never the other way round.
pub(crate) struct CircuitRegistry {
    circuits: RwLock<HashMap<String, CircuitCell>>,
    configs: RwLock<HashMap<String, CircuitConfig>>,
    default_config: CircuitConfig,
}

impl CircuitRegistry {
    pub(crate) fn new(default_config: CircuitConfig, presets: HashMap<String, CircuitConfig>) -> Self {
        Self {
            circuits: RwLock::new(HashMap::new()),
            configs: RwLock::new(presets),
            default_config,
        }
    }

    pub(crate) fn get(&self, name: &str) -> Option<CircuitCell> {
        self.circuits.read().get(name).cloned()
    }

    pub(crate) fn get_or_insert(&self, name: &str) -> CircuitCell {
        if let Some(cell) = self.get(name) {
            return cell;
        }
        let mut circuits = self.circuits.write();
        Arc::clone(
            circuits
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Circuit::new()))),
        )
    }

    /// Returns true if `cell` is still the circuit registered for `name`.
    pub(crate) fn is_current(&self, name: &str, cell: &CircuitCell) -> bool {
        self.circuits
            .read()
            .get(name)
            .is_some_and(|current| Arc::ptr_eq(current, cell))
    }

    pub(crate) fn remove(&self, name: &str) -> Option<CircuitCell> {
        self.circuits.write().remove(name)
    }

    /// Every circuit, ordered by name.
    pub(crate) fn entries(&self) -> Vec<(String, CircuitCell)> {
        let mut entries: Vec<_> = self
            .circuits
            .read()
            .iter()
            .map(|(name, cell)| (name.clone(), Arc::clone(cell)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub(crate) fn config(&self, name: &str) -> CircuitConfig {
        self.configs
            .read()
            .get(name)
            .copied()
            .unwrap_or(self.default_config)
    }

    pub(crate) fn configure(&self, name: &str, update: &CircuitConfigUpdate) -> CircuitConfig {
        let mut configs = self.configs.write();
        let current = configs.get(name).copied().unwrap_or(self.default_config);
        let merged = current.merged(update);
        configs.insert(name.to_string(), merged);
        merged
    }

    pub(crate) fn len(&self) -> usize {
        self.circuits.read().len()
    }
}
