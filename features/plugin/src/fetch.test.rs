use pretty_assertions::assert_eq;

use super::*;

#[test]
fn test_parse_classifies_by_suffix() {
    assert_eq!(
        RemoteSource::parse("https://example.com/glow-1.0.tgz", Some("main")),
        RemoteSource::Tarball {
            url: "https://example.com/glow-1.0.tgz".to_string()
        }
    );
    assert_eq!(
        RemoteSource::parse("https://github.com/acme/glow.git", Some("v2")),
        RemoteSource::Git {
            url: "https://github.com/acme/glow.git".to_string(),
            git_ref: Some("v2".to_string()),
        }
    );
}

#[test]
fn test_name_from_url() {
    assert_eq!(name_from_url("https://github.com/acme/glow.git"), "glow");
    assert_eq!(name_from_url("git@github.com:acme/glow.git"), "glow");
    assert_eq!(name_from_url("https://example.com/dl/bloom.tar.gz"), "bloom");
    assert_eq!(name_from_url("https://example.com/plugins/wave/"), "wave");
}

#[test]
fn test_https_fallback_url() {
    assert_eq!(
        https_fallback_url("git@github.com:acme/glow.git"),
        Some("https://github.com/acme/glow.git".to_string())
    );
    assert_eq!(
        https_fallback_url("git@github.com:acme/glow"),
        Some("https://github.com/acme/glow.git".to_string())
    );
    assert_eq!(https_fallback_url("https://gitlab.com/acme/glow.git"), None);
}

#[tokio::test]
async fn test_clone_of_missing_local_repo_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let missing = tmp.path().join("no-such-repo");
    let target = tmp.path().join("out");

    let err = git_clone(&missing.to_string_lossy(), &target, None)
        .await
        .unwrap_err();
    assert!(matches!(err, crate::error::PluginError::Fetch { .. }));
}
