//! # Module Registry
//!
//! Classifies module names as `Core` or `Community` and records which
//! modules have been quarantined.
//!
//! - Registration is last-write-wins.
//! - An unregistered name is `Community`.
//! - Quarantine lasts for the life of the process.

use parking_lot::RwLock;
use shared_types::ModuleKind;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

#[derive(Debug, Default)]
struct RegistryState {
    kinds: HashMap<String, ModuleKind>,
    quarantined: HashSet<String>,
}

/// Module classification shared by the runtime and the dispatcher.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    state: RwLock<RegistryState>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or reclassify a module.
    pub fn register(&self, module_name: impl Into<String>, kind: ModuleKind) {
        let module_name = module_name.into();
        let previous = self.state.write().kinds.insert(module_name.clone(), kind);
        match previous {
            Some(old) if old != kind => {
                warn!(module = %module_name, from = %old, to = %kind, "Module reclassified");
            }
            _ => info!(module = %module_name, kind = %kind, "Module registered"),
        }
    }

    /// Classification used by containment. Unknown modules are `Community`.
    pub fn kind_of(&self, module_name: &str) -> ModuleKind {
        self.state
            .read()
            .kinds
            .get(module_name)
            .copied()
            .unwrap_or_default()
    }

    pub fn is_registered(&self, module_name: &str) -> bool {
        self.state.read().kinds.contains_key(module_name)
    }

    /// Mark a module as quarantined. Returns `false` if it already was.
    pub fn quarantine(&self, module_name: &str) -> bool {
        self.state
            .write()
            .quarantined
            .insert(module_name.to_string())
    }

    pub fn is_quarantined(&self, module_name: &str) -> bool {
        self.state.read().quarantined.contains(module_name)
    }

    /// Registered module names, sorted.
    pub fn registered(&self) -> Vec<(String, ModuleKind)> {
        let mut modules: Vec<_> = self
            .state
            .read()
            .kinds
            .iter()
            .map(|(name, kind)| (name.clone(), *kind))
            .collect();
        modules.sort_by(|a, b| a.0.cmp(&b.0));
        modules
    }

    pub fn quarantined(&self) -> Vec<String> {
        let mut names: Vec<_> = self.state.read().quarantined.iter().cloned().collect();
        names.sort();
        names
    }
}
