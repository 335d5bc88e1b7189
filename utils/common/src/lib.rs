//! Small utilities shared by lumen binaries.

pub mod logging;

pub use logging::LoggingConfig;
pub use logging::TimezoneConfig;
pub use logging::init_logging;
