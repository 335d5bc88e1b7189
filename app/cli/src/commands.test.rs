use std::path::PathBuf;
use std::sync::Arc;

use lumen_config::PluginPipelineConfig;
use lumen_plugin::InMemoryEffectRegistry;
use lumen_plugin::InstallSource;
use lumen_plugin::PluginOrigin;
use pretty_assertions::assert_eq;

use super::*;

#[test]
fn test_install_request_classifies_sources() {
    let remote = install_request("https://github.com/acme/glow.git", Some("v2".into()), None);
    assert_eq!(
        remote.source,
        InstallSource::Remote {
            url: "https://github.com/acme/glow.git".to_string(),
            git_ref: Some("v2".to_string()),
        }
    );

    let scp = install_request("git@github.com:acme/glow.git", None, None);
    assert!(matches!(scp.source, InstallSource::Remote { .. }));

    let local = install_request("./plugins/glow", None, Some("shine".into()));
    assert_eq!(local.source, InstallSource::Local(PathBuf::from("./plugins/glow")));
    assert_eq!(local.name.as_deref(), Some("shine"));
}

#[test]
fn test_format_plugin_line() {
    let local = PluginDescriptor::local("glow", "/srv/glow");
    let line = format_plugin_line(&local);
    assert!(line.starts_with("glow"));
    assert!(line.contains("enabled"));
    assert!(line.ends_with("/srv/glow"));

    let mut remote = PluginDescriptor::remote(
        "bloom",
        "/data/plugins/bloom",
        PluginOrigin {
            url: "https://github.com/acme/bloom.git".to_string(),
            git_ref: Some("main".to_string()),
        },
    );
    remote.enabled = false;
    let line = format_plugin_line(&remote);
    assert!(line.contains("disabled"));
    assert!(line.ends_with("https://github.com/acme/bloom.git#main"));
}

#[test]
fn test_format_operation_lists_warnings() {
    let result = OperationResult {
        success: true,
        name: "glow".to_string(),
        warnings: vec!["cache: disk full".to_string()],
        ..Default::default()
    };

    assert_eq!(
        format_operation(&result, "installed"),
        "glow installed (0 effect(s))\n  warning: cache: disk full"
    );
}

#[test]
fn test_format_cleanup() {
    let report = CleanupReport {
        removed_dirs: vec![PathBuf::from("/tmp/a"), PathBuf::from("/tmp/b")],
        ..Default::default()
    };

    assert_eq!(format_cleanup(&report), "Removed 2 processed dir(s), 0 stale mapping(s)");
}

#[tokio::test]
async fn test_list_and_failed_uninstall() {
    let tmp = tempfile::tempdir().unwrap();
    let config = PluginPipelineConfig::for_data_dir(tmp.path());
    let lifecycle = PluginLifecycle::with_node_runtime(config, Arc::new(InMemoryEffectRegistry::new()));

    assert!(list(&lifecycle, Output::default()).is_ok());
    assert!(list(&lifecycle, Output { json: true }).is_ok());

    let err = uninstall(&lifecycle, "ghost", false, Output::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("ghost"));
}

#[tokio::test]
async fn test_load_all_continues_without_engine() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = PluginPipelineConfig::for_data_dir(tmp.path());
    config.roots = lumen_config::StorageRoots::from_working_dir(tmp.path().join("app"));
    let lifecycle = PluginLifecycle::with_node_runtime(config, Arc::new(InMemoryEffectRegistry::new()));

    assert!(!lifecycle.bootstrap_engine().await.success);
    assert!(load_all(&lifecycle, Output::default()).await.is_ok());
}

#[tokio::test]
async fn test_load_all_fails_when_nothing_loads() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = PluginPipelineConfig::for_data_dir(tmp.path());
    config.roots = lumen_config::StorageRoots::from_working_dir(tmp.path().join("app"));
    let lifecycle = PluginLifecycle::with_node_runtime(config, Arc::new(InMemoryEffectRegistry::new()));
    lifecycle
        .store()
        .add(PluginDescriptor::local("ghost", tmp.path().join("missing")))
        .unwrap();

    let err = load_all(&lifecycle, Output::default()).await.unwrap_err();

    let plain = err.downcast_ref::<PlainError>().unwrap();
    assert_eq!(plain.status_code(), StatusCode::PluginLoadFailed);
    assert!(err.to_string().contains("1 plugin(s)"));
}
