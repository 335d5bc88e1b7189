//! JSON configuration types for `config.json`.
//!
//! These types mirror the file format. Every field is optional so a partial
//! file (or no file at all) is valid; defaults are applied when the file is
//! resolved into [`crate::PluginPipelineConfig`].
//!
//! # Example
//!
//! ```json
//! {
//!   "logging": {
//!     "level": "info",
//!     "modules": ["lumen_plugin=debug"]
//!   },
//!   "plugins": {
//!     "node_binary": "/usr/local/bin/node",
//!     "load_timeout_secs": 30,
//!     "engine_package": "@lumen/effects",
//!     "shared_packages": ["three"],
//!     "archive_path": "/opt/lumen/resources/app.asar"
//!   }
//! }
//! ```

use std::path::PathBuf;

use lumen_utils_common::TimezoneConfig;
use serde::Deserialize;
use serde::Serialize;

/// Application configuration file (`~/.lumen/config.json`).
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: Option<LoggingSection>,

    #[serde(default)]
    pub plugins: Option<PluginSection>,
}

/// `logging` section.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct LoggingSection {
    /// Log level (e.g., "trace", "debug", "info", "warn", "error").
    #[serde(default)]
    pub level: Option<String>,

    /// Include source location in logs.
    #[serde(default)]
    pub location: Option<bool>,

    /// Include target module path in logs.
    #[serde(default)]
    pub target: Option<bool>,

    /// Timezone for log timestamps ("local" or "utc", default: "local").
    #[serde(default)]
    pub timezone: Option<String>,

    /// Per-module log levels (e.g., `["lumen_plugin=debug"]`).
    #[serde(default)]
    pub modules: Option<Vec<String>>,
}

impl LoggingSection {
    /// Convert to the runtime logging settings.
    pub fn to_common_logging(&self) -> lumen_utils_common::LoggingConfig {
        lumen_utils_common::LoggingConfig {
            level: self.level.clone().unwrap_or_else(|| "info".to_string()),
            location: self.location.unwrap_or(false),
            target: self.target.unwrap_or(false),
            timezone: match self.timezone.as_deref() {
                Some("utc") | Some("UTC") => TimezoneConfig::Utc,
                _ => TimezoneConfig::Local,
            },
            modules: self.modules.clone().unwrap_or_default(),
        }
    }
}

/// `plugins` section.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct PluginSection {
    /// JS runtime used to execute plugin modules.
    #[serde(default)]
    pub node_binary: Option<PathBuf>,

    /// Bound on a single plugin load.
    #[serde(default)]
    pub load_timeout_secs: Option<u64>,

    /// Bound on each plugin during startup bulk load.
    #[serde(default)]
    pub bulk_load_timeout_secs: Option<u64>,

    /// Unreferenced processed directories older than this are swept.
    #[serde(default)]
    pub orphan_retention_hours: Option<u64>,

    /// The effects engine package; never rewritten.
    #[serde(default)]
    pub engine_package: Option<String>,

    /// Additional packages shared with plugins.
    #[serde(default)]
    pub shared_packages: Option<Vec<String>>,

    /// Host application root (contains `node_modules`).
    #[serde(default)]
    pub app_root: Option<PathBuf>,

    /// Packaged read-only archive root.
    #[serde(default)]
    pub archive_path: Option<PathBuf>,

    /// Unpacked sibling of the archive; defaults to `<archive>.unpacked`.
    #[serde(default)]
    pub unpacked_path: Option<PathBuf>,

    /// Where installed plugin sources and processed output live.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

#[cfg(test)]
#[path = "json_config.test.rs"]
mod tests;
