//! Error types for configuration loading.

use std::path::PathBuf;

use lumen_error::ErrorExt;
use lumen_error::Location;
use lumen_error::StatusCode;
use snafu::Snafu;

/// Configuration errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module)]
pub enum ConfigError {
    /// Config file could not be read.
    #[snafu(display("Failed to read config {}: {source}", path.display()))]
    Io {
        path: PathBuf,
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// Config file is not valid JSON for the expected schema.
    #[snafu(display("Invalid JSON in {}: {source}", path.display()))]
    JsonParse {
        path: PathBuf,
        source: serde_json::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// A value was present but unusable.
    #[snafu(display("Invalid value for {field}: {message}"))]
    InvalidValue {
        field: String,
        message: String,
        #[snafu(implicit)]
        location: Location,
    },
}

impl ErrorExt for ConfigError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Io { .. } => StatusCode::ConfigFileError,
            Self::JsonParse { .. } => StatusCode::ParseError,
            Self::InvalidValue { .. } => StatusCode::InvalidConfig,
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
