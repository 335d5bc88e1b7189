//! Configuration file loading.

use std::path::Path;
use std::path::PathBuf;

use snafu::ResultExt;
use tracing::debug;

use crate::error::Result;
use crate::error::config_error::IoSnafu;
use crate::error::config_error::JsonParseSnafu;
use crate::json_config::AppConfig;

/// Default configuration directory name under the home directory.
pub const DEFAULT_CONFIG_DIR: &str = ".lumen";

/// Application configuration file name (JSON).
pub const CONFIG_FILE: &str = "config.json";

/// Environment variable for a custom lumen home directory.
pub const LUMEN_HOME_ENV: &str = "LUMEN_HOME";

/// Get the default configuration directory path (`~/.lumen`).
pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_CONFIG_DIR)
}

/// Find the lumen home directory.
///
/// `LUMEN_HOME` wins when set; relative values resolve against the current
/// working directory.
pub fn find_lumen_home() -> PathBuf {
    match std::env::var(LUMEN_HOME_ENV) {
        Ok(custom_home) => {
            let path = PathBuf::from(&custom_home);
            if path.is_absolute() {
                return path;
            }
            std::env::current_dir()
                .map(|cwd| cwd.join(&custom_home))
                .unwrap_or(path)
        }
        Err(_) => default_config_dir(),
    }
}

/// Load `config.json` from `home`.
///
/// A missing file yields the default configuration; an unreadable or
/// malformed file is an error.
pub fn load_config(home: &Path) -> Result<AppConfig> {
    let path = home.join(CONFIG_FILE);
    if !path.exists() {
        debug!(path = %path.display(), "No config file, using defaults");
        return Ok(AppConfig::default());
    }

    let content = std::fs::read_to_string(&path).context(IoSnafu { path: path.clone() })?;
    let config: AppConfig =
        serde_json::from_str(&content).context(JsonParseSnafu { path: path.clone() })?;

    debug!(path = %path.display(), "Loaded config");
    Ok(config)
}

#[cfg(test)]
#[path = "loader.test.rs"]
mod tests;
