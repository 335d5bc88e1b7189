use super::*;

#[test]
fn test_error_display() {
    let err = plugin_error::ValidationSnafu {
        path: PathBuf::from("/plugins/glow"),
        message: "missing package.json".to_string(),
    }
    .build();
    assert!(err.to_string().contains("/plugins/glow"));
    assert!(err.to_string().contains("missing package.json"));

    let err = plugin_error::TimeoutSnafu {
        entry: PathBuf::from("/processed/glow/index.mjs"),
        timeout_ms: 1500u128,
    }
    .build();
    assert!(err.to_string().contains("1500ms"));
}

#[test]
fn test_error_status_codes() {
    let err = plugin_error::NotFoundSnafu { name: "glow" }.build();
    assert_eq!(err.status_code(), StatusCode::FileNotFound);

    let err = plugin_error::CacheSnafu {
        path: PathBuf::from("/data/processed_dirs.json"),
        message: "read-only".to_string(),
    }
    .build();
    assert_eq!(err.status_code(), StatusCode::StorageUnavailable);
}

#[test]
fn test_circular_initialization_is_retryable() {
    let err = plugin_error::LoadSnafu {
        entry: PathBuf::from("/engine/index.mjs"),
        message: "ReferenceError: Cannot access 'Effect' before initialization".to_string(),
    }
    .build();
    assert!(err.is_circular_initialization());
    assert_eq!(err.status_code(), StatusCode::PluginInitializing);
    assert!(err.is_retryable());

    let err = plugin_error::LoadSnafu {
        entry: PathBuf::from("/engine/index.mjs"),
        message: "TypeError: x is not a function".to_string(),
    }
    .build();
    assert!(!err.is_circular_initialization());
    assert_eq!(err.status_code(), StatusCode::PluginLoadFailed);
}
