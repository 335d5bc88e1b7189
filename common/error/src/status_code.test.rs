use super::*;
use strum::IntoEnumIterator;

#[test]
fn test_status_code_values() {
    assert_eq!(StatusCode::Success as i32, 00_000);
    assert_eq!(StatusCode::Unknown as i32, 01_000);
    assert_eq!(StatusCode::InvalidArguments as i32, 02_000);
    assert_eq!(StatusCode::IoError as i32, 03_000);
    assert_eq!(StatusCode::NetworkError as i32, 04_000);
    assert_eq!(StatusCode::InvalidConfig as i32, 10_000);
    assert_eq!(StatusCode::InvalidPlugin as i32, 11_000);
    assert_eq!(StatusCode::Timeout as i32, 12_000);
}

#[test]
fn test_is_success() {
    assert!(StatusCode::is_success(0));
    assert!(!StatusCode::is_success(11_002));
}

#[test]
fn test_retryable_plugin_codes() {
    assert!(StatusCode::PluginInitializing.is_retryable());
    assert!(StatusCode::Timeout.is_retryable());
    assert!(!StatusCode::PluginLoadFailed.is_retryable());
    assert!(!StatusCode::InvalidPlugin.is_retryable());
}

#[test]
fn test_should_log_error() {
    assert!(StatusCode::Internal.should_log_error());
    assert!(StatusCode::PluginLoadFailed.should_log_error());
    assert!(!StatusCode::DependencyUnresolved.should_log_error());
}

#[test]
fn test_category() {
    assert_eq!(StatusCode::DependencyUnresolved.category(), StatusCategory::Plugin);
    assert_eq!(StatusCode::StorageUnavailable.category(), StatusCategory::IO);
    assert_eq!(StatusCode::Timeout.category(), StatusCategory::Resource);
}

#[test]
fn test_from_i32_round_trips_every_code() {
    for code in StatusCode::iter() {
        assert_eq!(StatusCode::from_i32(code as i32), Some(code));
        assert_eq!(code.name(), code.as_ref());
    }
    assert_eq!(StatusCode::from_i32(99_999), None);
}

#[test]
fn test_meta_and_display() {
    let meta = StatusCode::PluginInitializing.meta();
    assert!(meta.retryable);
    assert!(!meta.log_error);
    assert_eq!(meta.category, StatusCategory::Plugin);
    assert_eq!(StatusCode::External.category(), StatusCategory::Common);
    assert_eq!(StatusCode::DependencyUnresolved.to_string(), "DependencyUnresolved");
}
