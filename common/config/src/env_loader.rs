//! Environment variable overrides.
//!
//! Applied after `config.json` is read so a deployment can adjust the plugin
//! runtime without editing the file.

use std::path::PathBuf;

use tracing::debug;
use tracing::warn;

use crate::json_config::AppConfig;
use crate::json_config::LoggingSection;
use crate::json_config::PluginSection;

pub const ENV_NODE_BINARY: &str = "LUMEN_NODE";
pub const ENV_LOG_LEVEL: &str = "LUMEN_LOG";
pub const ENV_LOAD_TIMEOUT: &str = "LUMEN_PLUGIN_LOAD_TIMEOUT_SECS";
pub const ENV_ARCHIVE_PATH: &str = "LUMEN_ARCHIVE_PATH";
pub const ENV_APP_ROOT: &str = "LUMEN_APP_ROOT";

/// Apply overrides from the process environment.
pub fn apply_env_overrides(config: &mut AppConfig) {
    apply_overrides_from(config, |key| std::env::var(key).ok());
}

/// Apply overrides using `lookup` to read variables.
pub fn apply_overrides_from(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(level) = lookup(ENV_LOG_LEVEL) {
        config
            .logging
            .get_or_insert_with(LoggingSection::default)
            .level = Some(level);
    }

    let plugins = config.plugins.get_or_insert_with(PluginSection::default);

    if let Some(node) = lookup(ENV_NODE_BINARY) {
        debug!(node = %node, "Node binary overridden from environment");
        plugins.node_binary = Some(PathBuf::from(node));
    }
    if let Some(raw) = lookup(ENV_LOAD_TIMEOUT) {
        match raw.trim().parse::<u64>() {
            Ok(secs) => plugins.load_timeout_secs = Some(secs),
            Err(e) => warn!(value = %raw, error = %e, "Ignoring invalid {ENV_LOAD_TIMEOUT}"),
        }
    }
    if let Some(archive) = lookup(ENV_ARCHIVE_PATH) {
        plugins.archive_path = Some(PathBuf::from(archive));
    }
    if let Some(root) = lookup(ENV_APP_ROOT) {
        plugins.app_root = Some(PathBuf::from(root));
    }
}

#[cfg(test)]
#[path = "env_loader.test.rs"]
mod tests;
