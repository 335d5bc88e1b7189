use super::*;

#[test]
fn test_plain_error() {
    let err = PlainError::new("bad manifest", StatusCode::InvalidPlugin);
    assert_eq!(err.status_code(), StatusCode::InvalidPlugin);
    assert_eq!(err.to_string(), "bad manifest");
    assert!(!err.is_retryable());
}

#[test]
fn test_plain_error_retryable() {
    let err = PlainError::new("still initializing", StatusCode::PluginInitializing);
    assert!(err.is_retryable());
}

#[test]
fn test_output_msg_hides_internal() {
    let err = PlainError::new("sensitive details", StatusCode::Internal);
    assert_eq!(err.output_msg(), "Internal error: 1001");
}

#[test]
fn test_output_msg_shows_user_errors() {
    let err = PlainError::new("Plugin not found: glow", StatusCode::FileNotFound);
    assert_eq!(err.output_msg(), "Plugin not found: glow");
}
