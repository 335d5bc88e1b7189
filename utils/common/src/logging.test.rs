use pretty_assertions::assert_eq;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;

use super::*;

fn render(timezone: TimezoneConfig) -> String {
    let mut out = String::new();
    ConfigurableTimer::new(timezone)
        .format_time(&mut Writer::new(&mut out))
        .unwrap();
    out
}

#[test]
fn test_timer_formats_millisecond_timestamps() {
    let local = render(TimezoneConfig::Local);
    let utc = render(TimezoneConfig::Utc);

    assert!(utc.ends_with("+00:00"), "{utc}");
    // 2024-01-01T00:00:00.000+00:00
    assert_eq!(utc.len(), 29);
    assert_eq!(local.len(), 29);
}

#[test]
fn test_env_filter_includes_module_directives() {
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }
    let logging = LoggingConfig {
        level: "warn".to_string(),
        modules: vec!["lumen_plugin=trace".to_string()],
        ..LoggingConfig::default()
    };

    let rendered = build_env_filter(&logging, "error").to_string();

    assert!(rendered.contains("lumen_plugin=trace"), "{rendered}");
    assert!(rendered.contains("warn"), "{rendered}");
}

#[test]
fn test_env_filter_survives_garbage_level() {
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }
    let logging = LoggingConfig {
        level: "not a level ===".to_string(),
        ..LoggingConfig::default()
    };

    let rendered = build_env_filter(&logging, "error").to_string();

    assert_eq!(rendered, "error");
}

#[test]
fn test_config_round_trips_through_json() {
    let logging: LoggingConfig = serde_json::from_str(
        r#"{"level":"debug","location":true,"target":false,"timezone":"utc","modules":[]}"#,
    )
    .unwrap();

    assert_eq!(logging.timezone, TimezoneConfig::Utc);
    assert!(logging.location);
    assert_eq!(logging.level, "debug");
}
