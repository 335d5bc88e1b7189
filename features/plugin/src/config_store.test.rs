use pretty_assertions::assert_eq;

use super::*;
use crate::error::PluginError;

fn store() -> (tempfile::TempDir, PluginConfigStore) {
    let tmp = tempfile::tempdir().unwrap();
    let store = PluginConfigStore::new(tmp.path().join("data/plugins.json"));
    (tmp, store)
}

#[test]
fn test_empty_when_missing() {
    let (_tmp, store) = store();
    assert!(store.plugins().is_empty());
    assert!(store.get("glow").is_none());
}

#[test]
fn test_add_get_remove() {
    let (_tmp, store) = store();
    store.add(PluginDescriptor::local("glow", "/plugins/glow")).unwrap();
    store.add(PluginDescriptor::local("blur", "/plugins/blur")).unwrap();

    let names: Vec<String> = store.plugins().into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["glow".to_string(), "blur".to_string()]);
    assert_eq!(store.get("glow").unwrap().source_path, PathBuf::from("/plugins/glow"));

    let removed = store.remove("glow").unwrap().unwrap();
    assert_eq!(removed.name, "glow");
    assert!(store.get("glow").is_none());
    assert_eq!(store.remove("glow").unwrap(), None);
}

#[test]
fn test_duplicate_name_rejected() {
    let (_tmp, store) = store();
    store.add(PluginDescriptor::local("glow", "/a")).unwrap();

    let err = store.add(PluginDescriptor::local("glow", "/b")).unwrap_err();
    assert!(matches!(err, PluginError::AlreadyExists { .. }));
    assert_eq!(store.plugins().len(), 1);
}

#[test]
fn test_toggle_and_enabled_filter() {
    let (_tmp, store) = store();
    store.add(PluginDescriptor::local("glow", "/a")).unwrap();
    store.add(PluginDescriptor::local("blur", "/b")).unwrap();

    assert!(!store.toggle("glow").unwrap());
    let enabled: Vec<String> = store.enabled_plugins().into_iter().map(|p| p.name).collect();
    assert_eq!(enabled, vec!["blur".to_string()]);
    assert!(store.toggle("glow").unwrap());

    let err = store.toggle("missing").unwrap_err();
    assert!(matches!(err, PluginError::NotFound { .. }));
}

#[test]
fn test_remote_descriptor_persists_origin() {
    let (_tmp, store) = store();
    let origin = PluginOrigin {
        url: "https://github.com/acme/glow.git".to_string(),
        git_ref: Some("v1.2.0".to_string()),
    };
    store
        .add(PluginDescriptor::remote("glow", "/data/plugins/glow", origin.clone()))
        .unwrap();

    let loaded = store.get("glow").unwrap();
    assert_eq!(loaded.kind, PluginKind::Remote);
    assert_eq!(loaded.origin, Some(origin));
}

#[test]
fn test_corrupt_file_reads_empty() {
    let (_tmp, store) = store();
    std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
    std::fs::write(store.path(), "[[[").unwrap();

    assert!(store.plugins().is_empty());
    store.add(PluginDescriptor::local("glow", "/a")).unwrap();
    assert_eq!(store.plugins().len(), 1);
}
