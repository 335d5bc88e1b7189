//! Configuration for lumen.
//!
//! Settings are read from `~/.lumen/config.json` (or `$LUMEN_HOME/config.json`),
//! then environment overrides are applied, then everything is resolved into
//! a [`PluginPipelineConfig`] with concrete paths and durations.

pub mod env_loader;
pub mod error;
pub mod json_config;
pub mod loader;
pub mod pipeline;

pub use error::ConfigError;
pub use error::Result;
pub use json_config::AppConfig;
pub use json_config::LoggingSection;
pub use json_config::PluginSection;
pub use loader::CONFIG_FILE;
pub use loader::find_lumen_home;
pub use loader::load_config;
pub use pipeline::PluginPipelineConfig;
pub use pipeline::StorageRoots;
