//! Tracing subscriber setup.
//!
//! Every binary initializes logging through [`init_logging`] so the level,
//! per-module directives and timestamp format come from one place.

use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::prelude::*;

/// Timezone used for log timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimezoneConfig {
    #[default]
    Local,
    Utc,
}

/// Resolved logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level (e.g. "info").
    pub level: String,
    /// Include file:line in each event.
    pub location: bool,
    /// Include the event target (module path).
    pub target: bool,
    pub timezone: TimezoneConfig,
    /// Extra directives such as `lumen_plugin=debug`.
    pub modules: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            location: false,
            target: false,
            timezone: TimezoneConfig::Local,
            modules: Vec::new(),
        }
    }
}

/// Timestamp formatter honoring [`TimezoneConfig`].
#[derive(Debug, Clone, Copy)]
pub struct ConfigurableTimer {
    timezone: TimezoneConfig,
}

impl ConfigurableTimer {
    pub fn new(timezone: TimezoneConfig) -> Self {
        Self { timezone }
    }
}

impl FormatTime for ConfigurableTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%:z";
        match self.timezone {
            TimezoneConfig::Local => write!(w, "{}", chrono::Local::now().format(FORMAT)),
            TimezoneConfig::Utc => write!(w, "{}", chrono::Utc::now().format(FORMAT)),
        }
    }
}

/// Build the env filter from config.
///
/// `RUST_LOG` wins when set; otherwise the configured level plus module
/// directives are used, falling back to `default_level` if the level does
/// not parse.
pub fn build_env_filter(logging: &LoggingConfig, default_level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let mut directives = vec![logging.level.clone()];
    directives.extend(logging.modules.iter().cloned());

    EnvFilter::try_new(directives.join(","))
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("error"))
}

/// Install a stderr fmt subscriber.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_logging(logging: &LoggingConfig) -> bool {
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(ConfigurableTimer::new(logging.timezone))
        .with_file(logging.location)
        .with_line_number(logging.location)
        .with_target(logging.target)
        .with_filter(build_env_filter(logging, "info"));

    tracing_subscriber::registry().with(layer).try_init().is_ok()
}

#[cfg(test)]
#[path = "logging.test.rs"]
mod tests;
