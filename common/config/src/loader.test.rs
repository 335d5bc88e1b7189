use super::*;
use lumen_error::ErrorExt;
use lumen_error::StatusCode;

#[test]
fn test_missing_file_yields_default() {
    let tmp = tempfile::tempdir().unwrap();
    let config = load_config(tmp.path()).unwrap();
    assert_eq!(config, AppConfig::default());
}

#[test]
fn test_loads_plugin_section() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(
        tmp.path().join(CONFIG_FILE),
        r#"{"plugins": {"load_timeout_secs": 5}}"#,
    )
    .unwrap();

    let config = load_config(tmp.path()).unwrap();
    assert_eq!(config.plugins.unwrap().load_timeout_secs, Some(5));
}

#[test]
fn test_malformed_file_is_parse_error() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join(CONFIG_FILE), "{ not json").unwrap();

    let err = load_config(tmp.path()).unwrap_err();
    assert_eq!(err.status_code(), StatusCode::ParseError);
    assert!(err.to_string().contains(CONFIG_FILE));
}

#[test]
fn test_default_config_dir_ends_with_lumen() {
    assert!(default_config_dir().ends_with(DEFAULT_CONFIG_DIR));
}
