//! Persisted list of configured plugins (`<data_dir>/plugins.json`).
//!
//! The file is the source of truth: every operation reads it, applies the
//! change and writes it back.

use std::path::Path;
use std::path::PathBuf;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::error::Result;
use crate::error::plugin_error::AlreadyExistsSnafu;
use crate::error::plugin_error::NotFoundSnafu;
use crate::error::plugin_error::StoreSnafu;

const STORE_VERSION: u32 = 1;

/// Where a plugin's source came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    Local,
    Remote,
}

/// Fetch details for a remote plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginOrigin {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
}

/// A configured plugin. `name` is the identity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub name: String,
    pub source_path: PathBuf,
    pub kind: PluginKind,
    pub enabled: bool,
    pub added_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<PluginOrigin>,
}

impl PluginDescriptor {
    pub fn local(name: impl Into<String>, source_path: impl Into<PathBuf>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            source_path: source_path.into(),
            kind: PluginKind::Local,
            enabled: true,
            added_at: now,
            updated_at: now,
            origin: None,
        }
    }

    pub fn remote(
        name: impl Into<String>,
        source_path: impl Into<PathBuf>,
        origin: PluginOrigin,
    ) -> Self {
        Self {
            kind: PluginKind::Remote,
            origin: Some(origin),
            ..Self::local(name, source_path)
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    #[serde(default)]
    plugins: Vec<PluginDescriptor>,
}

/// File-backed plugin configuration store.
#[derive(Debug, Clone)]
pub struct PluginConfigStore {
    path: PathBuf,
}

impl PluginConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All descriptors in insertion order. A missing or corrupt file reads
    /// as empty.
    pub fn plugins(&self) -> Vec<PluginDescriptor> {
        self.read().plugins
    }

    pub fn enabled_plugins(&self) -> Vec<PluginDescriptor> {
        self.plugins().into_iter().filter(|p| p.enabled).collect()
    }

    pub fn get(&self, name: &str) -> Option<PluginDescriptor> {
        self.plugins().into_iter().find(|p| p.name == name)
    }

    /// Add a descriptor; names must be unique.
    pub fn add(&self, descriptor: PluginDescriptor) -> Result<()> {
        let mut doc = self.read();
        if doc.plugins.iter().any(|p| p.name == descriptor.name) {
            return AlreadyExistsSnafu {
                name: descriptor.name,
            }
            .fail();
        }
        debug!(name = %descriptor.name, source = %descriptor.source_path.display(), "Adding plugin");
        doc.plugins.push(descriptor);
        self.write(&doc)
    }

    /// Remove by name, returning the removed descriptor if there was one.
    pub fn remove(&self, name: &str) -> Result<Option<PluginDescriptor>> {
        let mut doc = self.read();
        let Some(pos) = doc.plugins.iter().position(|p| p.name == name) else {
            return Ok(None);
        };
        let removed = doc.plugins.remove(pos);
        self.write(&doc)?;
        debug!(name, "Removed plugin");
        Ok(Some(removed))
    }

    /// Flip the enabled flag, returning the new value.
    pub fn toggle(&self, name: &str) -> Result<bool> {
        self.update(name, |p| p.enabled = !p.enabled)
            .map(|p| p.enabled)
    }

    fn update(
        &self,
        name: &str,
        change: impl FnOnce(&mut PluginDescriptor),
    ) -> Result<PluginDescriptor> {
        let mut doc = self.read();
        let Some(descriptor) = doc.plugins.iter_mut().find(|p| p.name == name) else {
            return NotFoundSnafu { name }.fail();
        };
        change(descriptor);
        descriptor.updated_at = Utc::now();
        let updated = descriptor.clone();
        self.write(&doc)?;
        Ok(updated)
    }

    fn read(&self) -> StoreDocument {
        let empty = || StoreDocument {
            version: STORE_VERSION,
            plugins: Vec::new(),
        };
        if !self.path.exists() {
            return empty();
        }
        match std::fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str::<StoreDocument>(&content) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Corrupted plugin store, starting fresh");
                    empty()
                }
            },
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read plugin store");
                empty()
            }
        }
    }

    fn write(&self, doc: &StoreDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreSnafu {
                    path: parent.to_path_buf(),
                    message: format!("Failed to create directory: {e}"),
                }
                .build()
            })?;
        }
        let content = serde_json::to_string_pretty(doc).map_err(|e| {
            StoreSnafu {
                path: self.path.clone(),
                message: format!("Failed to serialize: {e}"),
            }
            .build()
        })?;
        std::fs::write(&self.path, content).map_err(|e| {
            StoreSnafu {
                path: self.path.clone(),
                message: format!("Failed to write: {e}"),
            }
            .build()
        })
    }
}

#[cfg(test)]
#[path = "config_store.test.rs"]
mod tests;
