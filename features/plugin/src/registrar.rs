//! Capture-then-commit registration.
//!
//! A plugin's registration entry point is first run against capturing
//! registries that only record what it tried to register. Once the load is
//! known to have succeeded, the captured calls are replayed through a
//! [`CommittingRegistrar`] into the live [`EffectRegistry`].

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::registry::EffectRegistry;

/// Which mock registry a call was made against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationKind {
    Effect,
    Config,
    Position,
}

/// Reference to a class that stays inside the JS runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassRef {
    /// Module the class was exported from.
    pub module: PathBuf,
    pub class_name: String,
}

/// One attempted registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedRegistration {
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub metadata: Value,
    pub class_ref: ClassRef,
}

/// Receives registrations from a plugin.
pub trait Registrar {
    fn register_effect(&mut self, registration: CapturedRegistration);
    fn register_config(&mut self, registration: CapturedRegistration);
    fn register_position(&mut self, registration: CapturedRegistration);

    fn register(&mut self, kind: RegistrationKind, registration: CapturedRegistration) {
        match kind {
            RegistrationKind::Effect => self.register_effect(registration),
            RegistrationKind::Config => self.register_config(registration),
            RegistrationKind::Position => self.register_position(registration),
        }
    }
}

/// Records registrations without touching any live registry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapturingRegistrar {
    pub effects: Vec<CapturedRegistration>,
    pub configs: Vec<CapturedRegistration>,
    pub positions: Vec<CapturedRegistration>,
}

impl CapturingRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty() && self.configs.is_empty() && self.positions.is_empty()
    }

    /// Replay everything captured, effects first, into `target`.
    pub fn replay_into(&self, target: &mut dyn Registrar) {
        for registration in &self.effects {
            target.register_effect(registration.clone());
        }
        for registration in &self.configs {
            target.register_config(registration.clone());
        }
        for registration in &self.positions {
            target.register_position(registration.clone());
        }
    }
}

impl Registrar for CapturingRegistrar {
    fn register_effect(&mut self, registration: CapturedRegistration) {
        self.effects.push(registration);
    }

    fn register_config(&mut self, registration: CapturedRegistration) {
        self.configs.push(registration);
    }

    fn register_position(&mut self, registration: CapturedRegistration) {
        self.positions.push(registration);
    }
}

/// Forwards registrations to the live registry under one owner.
pub struct CommittingRegistrar {
    registry: Arc<dyn EffectRegistry>,
    owner: String,
    committed: usize,
}

impl CommittingRegistrar {
    pub fn new(registry: Arc<dyn EffectRegistry>, owner: impl Into<String>) -> Self {
        Self {
            registry,
            owner: owner.into(),
            committed: 0,
        }
    }

    pub fn committed(&self) -> usize {
        self.committed
    }
}

impl Registrar for CommittingRegistrar {
    fn register_effect(&mut self, registration: CapturedRegistration) {
        debug!(owner = %self.owner, name = %registration.name, category = %registration.category, "Committing effect");
        self.registry.register_global(&self.owner, registration);
        self.committed += 1;
    }

    fn register_config(&mut self, registration: CapturedRegistration) {
        self.registry.register_config(&self.owner, registration);
        self.committed += 1;
    }

    fn register_position(&mut self, registration: CapturedRegistration) {
        self.registry.register_position(&self.owner, registration);
        self.committed += 1;
    }
}

#[cfg(test)]
#[path = "registrar.test.rs"]
mod tests;
