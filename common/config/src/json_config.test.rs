use super::*;
use pretty_assertions::assert_eq;

#[test]
fn test_empty_object_parses_to_default() {
    let config: AppConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config, AppConfig::default());
}

#[test]
fn test_plugin_section_parses() {
    let json = r#"{
        "plugins": {
            "node_binary": "/opt/node/bin/node",
            "load_timeout_secs": 12,
            "engine_package": "@lumen/effects",
            "shared_packages": ["three", "gl-matrix"],
            "archive_path": "/opt/lumen/app.asar"
        }
    }"#;
    let config: AppConfig = serde_json::from_str(json).unwrap();
    let plugins = config.plugins.unwrap();
    assert_eq!(plugins.node_binary, Some(PathBuf::from("/opt/node/bin/node")));
    assert_eq!(plugins.load_timeout_secs, Some(12));
    assert_eq!(
        plugins.shared_packages,
        Some(vec!["three".to_string(), "gl-matrix".to_string()])
    );
    assert_eq!(plugins.unpacked_path, None);
}

#[test]
fn test_logging_section_to_common() {
    let section = LoggingSection {
        level: Some("debug".to_string()),
        timezone: Some("utc".to_string()),
        modules: Some(vec!["lumen_plugin=trace".to_string()]),
        ..LoggingSection::default()
    };
    let logging = section.to_common_logging();
    assert_eq!(logging.level, "debug");
    assert_eq!(logging.timezone, TimezoneConfig::Utc);
    assert_eq!(logging.modules, vec!["lumen_plugin=trace".to_string()]);
    assert!(!logging.location);
}
