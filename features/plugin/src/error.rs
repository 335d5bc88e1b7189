//! Error types for the plugin pipeline.

use std::path::PathBuf;

use lumen_error::ErrorExt;
use lumen_error::Location;
use lumen_error::StatusCode;
use snafu::Snafu;

/// Plugin pipeline errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module)]
pub enum PluginError {
    /// Plugin directory or manifest is malformed.
    #[snafu(display("Invalid plugin at {}: {message}", path.display()))]
    Validation {
        path: PathBuf,
        message: String,
        #[snafu(implicit)]
        location: Location,
    },

    /// A shared package could not be located in any storage root.
    #[snafu(display("Package not found in any storage root: {package}"))]
    Resolution {
        package: String,
        #[snafu(implicit)]
        location: Location,
    },

    /// A single file could not be mirrored into the processed directory.
    #[snafu(display("Failed to materialize {}: {message}", path.display()))]
    Materialization {
        path: PathBuf,
        message: String,
        #[snafu(implicit)]
        location: Location,
    },

    /// Plugin code threw or exposed no registration entry point.
    #[snafu(display("Failed to load plugin module {}: {message}", entry.display()))]
    Load {
        entry: PathBuf,
        message: String,
        #[snafu(implicit)]
        location: Location,
    },

    /// Plugin load exceeded its time bound.
    #[snafu(display("Plugin load timed out after {}ms: {}", timeout_ms, entry.display()))]
    Timeout {
        entry: PathBuf,
        timeout_ms: u128,
        #[snafu(implicit)]
        location: Location,
    },

    /// Processed-directory cache could not be read or written.
    #[snafu(display("Processed cache error at {}: {message}", path.display()))]
    Cache {
        path: PathBuf,
        message: String,
        #[snafu(implicit)]
        location: Location,
    },

    /// Plugin configuration store could not be read or written.
    #[snafu(display("Plugin store error at {}: {message}", path.display()))]
    Store {
        path: PathBuf,
        message: String,
        #[snafu(implicit)]
        location: Location,
    },

    /// Remote plugin source could not be fetched.
    #[snafu(display("Failed to fetch {url}: {message}"))]
    Fetch {
        url: String,
        message: String,
        #[snafu(implicit)]
        location: Location,
    },

    /// Plugin is not known to the store.
    #[snafu(display("Plugin not found: {name}"))]
    NotFound {
        name: String,
        #[snafu(implicit)]
        location: Location,
    },

    /// A plugin with the same name is already installed.
    #[snafu(display("Plugin already installed: {name}"))]
    AlreadyExists {
        name: String,
        #[snafu(implicit)]
        location: Location,
    },

    /// IO error outside the per-file materialization path.
    #[snafu(display("IO error at {}: {source}", path.display()))]
    Io {
        path: PathBuf,
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },
}

impl PluginError {
    /// True when a load failed because a module was read while still
    /// initializing, which usually clears on a later attempt.
    pub fn is_circular_initialization(&self) -> bool {
        match self {
            Self::Load { message, .. } => is_circular_initialization_message(message),
            _ => false,
        }
    }
}

/// Messages the JS runtime emits for a module accessed mid-initialization.
pub(crate) fn is_circular_initialization_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("before initialization") || lower.contains("circular")
}

impl ErrorExt for PluginError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::InvalidPlugin,
            Self::Resolution { .. } => StatusCode::DependencyUnresolved,
            Self::Materialization { .. } => StatusCode::IoError,
            Self::Load { .. } if self.is_circular_initialization() => {
                StatusCode::PluginInitializing
            }
            Self::Load { .. } => StatusCode::PluginLoadFailed,
            Self::Timeout { .. } => StatusCode::Timeout,
            Self::Cache { .. } | Self::Store { .. } => StatusCode::StorageUnavailable,
            Self::Fetch { .. } => StatusCode::External,
            Self::NotFound { .. } => StatusCode::FileNotFound,
            Self::AlreadyExists { .. } => StatusCode::AlreadyExists,
            Self::Io { .. } => StatusCode::IoError,
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Result type for plugin operations.
pub type Result<T> = std::result::Result<T, PluginError>;

#[cfg(test)]
#[path = "error.test.rs"]
mod tests;
