//! The live effect registry.
//!
//! Registrations are keyed by name and tagged with the owner that committed
//! them, so a plugin's contributions can be withdrawn on uninstall or reload.

use std::collections::BTreeMap;
use std::sync::PoisonError;
use std::sync::RwLock;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::registrar::CapturedRegistration;
use crate::registrar::ClassRef;

/// Suffix pairing a config class with its effect (`Glow` ↔ `GlowConfig`).
pub const CONFIG_SUFFIX: &str = "Config";

/// A committed registration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisteredEntry {
    pub name: String,
    pub category: String,
    pub metadata: Value,
    pub class_ref: ClassRef,
    pub owner: String,
    /// Name of the linked config entry, for effects.
    pub config: Option<String>,
}

impl RegisteredEntry {
    fn new(owner: &str, registration: CapturedRegistration) -> Self {
        Self {
            name: registration.name,
            category: registration.category,
            metadata: registration.metadata,
            class_ref: registration.class_ref,
            owner: owner.to_string(),
            config: None,
        }
    }
}

/// Registry the orchestrator commits into.
pub trait EffectRegistry: Send + Sync {
    /// Register or replace an effect under `name`.
    fn register_global(&self, owner: &str, registration: CapturedRegistration);

    fn register_config(&self, owner: &str, registration: CapturedRegistration);

    fn register_position(&self, owner: &str, registration: CapturedRegistration);

    fn get_by_category(&self, category: &str) -> Vec<RegisteredEntry>;

    fn get(&self, name: &str) -> Option<RegisteredEntry>;

    /// Pair effects with configs named `<Effect>Config`. Returns the number
    /// of effects that gained a link.
    fn link_configs(&self) -> usize;

    /// Remove everything `owner` registered. Returns the number removed.
    fn unregister_owner(&self, owner: &str) -> usize;

    /// All effects, ordered by name.
    fn effects(&self) -> Vec<RegisteredEntry>;
}

#[derive(Debug, Default)]
struct Tables {
    effects: BTreeMap<String, RegisteredEntry>,
    configs: BTreeMap<String, RegisteredEntry>,
    positions: BTreeMap<String, RegisteredEntry>,
}

/// Thread-safe in-process registry.
#[derive(Debug, Default)]
pub struct InMemoryEffectRegistry {
    tables: RwLock<Tables>,
}

impl InMemoryEffectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self, name: &str) -> Option<RegisteredEntry> {
        self.read(|t| t.configs.get(name).cloned())
    }

    pub fn positions(&self) -> Vec<RegisteredEntry> {
        self.read(|t| t.positions.values().cloned().collect())
    }

    fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> R {
        let guard = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn write<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> R {
        let mut guard = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl EffectRegistry for InMemoryEffectRegistry {
    fn register_global(&self, owner: &str, registration: CapturedRegistration) {
        let entry = RegisteredEntry::new(owner, registration);
        self.write(|t| {
            if let Some(previous) = t.effects.insert(entry.name.clone(), entry) {
                if previous.owner != owner {
                    debug!(name = %previous.name, previous = %previous.owner, owner, "Effect replaced by another owner");
                }
            }
        });
    }

    fn register_config(&self, owner: &str, registration: CapturedRegistration) {
        let entry = RegisteredEntry::new(owner, registration);
        self.write(|t| t.configs.insert(entry.name.clone(), entry));
    }

    fn register_position(&self, owner: &str, registration: CapturedRegistration) {
        let entry = RegisteredEntry::new(owner, registration);
        self.write(|t| t.positions.insert(entry.name.clone(), entry));
    }

    fn get_by_category(&self, category: &str) -> Vec<RegisteredEntry> {
        self.read(|t| {
            t.effects
                .values()
                .filter(|e| e.category == category)
                .cloned()
                .collect()
        })
    }

    fn get(&self, name: &str) -> Option<RegisteredEntry> {
        self.read(|t| t.effects.get(name).cloned())
    }

    fn link_configs(&self) -> usize {
        self.write(|t| {
            let Tables { effects, configs, .. } = t;
            let mut linked = 0;
            for effect in effects.values_mut().filter(|e| e.config.is_none()) {
                let by_name = format!("{}{CONFIG_SUFFIX}", effect.name);
                let by_class = format!("{}{CONFIG_SUFFIX}", effect.class_ref.class_name);
                let found = configs
                    .values()
                    .find(|c| c.name == by_name || c.class_ref.class_name == by_class);
                if let Some(config) = found {
                    effect.config = Some(config.name.clone());
                    linked += 1;
                }
            }
            linked
        })
    }

    fn unregister_owner(&self, owner: &str) -> usize {
        let removed = self.write(|t| {
            let before = t.effects.len() + t.configs.len() + t.positions.len();
            t.effects.retain(|_, e| e.owner != owner);
            t.configs.retain(|_, e| e.owner != owner);
            t.positions.retain(|_, e| e.owner != owner);
            let configs = &t.configs;
            for effect in t.effects.values_mut() {
                if effect.config.as_ref().is_some_and(|c| !configs.contains_key(c)) {
                    effect.config = None;
                }
            }
            before - (t.effects.len() + t.configs.len() + t.positions.len())
        });
        debug!(owner, removed, "Unregistered owner");
        removed
    }

    fn effects(&self) -> Vec<RegisteredEntry> {
        self.read(|t| t.effects.values().cloned().collect())
    }
}

#[cfg(test)]
#[path = "registry.test.rs"]
mod tests;
