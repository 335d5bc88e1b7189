use std::fs;

use pretty_assertions::assert_eq;

use super::*;

#[test]
fn test_manifest_main_normalized_to_processed() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("package.json"), r#"{"main": "./dist/glow.js"}"#).unwrap();
    fs::create_dir_all(dir.join("dist")).unwrap();
    fs::write(dir.join("dist/glow.mjs"), "").unwrap();

    assert_eq!(resolve_entry(dir).unwrap(), dir.join("dist/glow.mjs"));
}

#[test]
fn test_module_preferred_over_main() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path();
    fs::write(
        dir.join("package.json"),
        r#"{"main": "main.cjs", "module": "esm.js"}"#,
    )
    .unwrap();
    fs::write(dir.join("main.cjs"), "").unwrap();
    fs::write(dir.join("esm.js"), "").unwrap();

    assert_eq!(resolve_entry(dir).unwrap(), dir.join("esm.js"));
}

#[test]
fn test_missing_declared_entry_falls_back() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("package.json"), r#"{"main": "gone.js"}"#).unwrap();
    fs::write(dir.join("index.mjs"), "").unwrap();
    fs::write(dir.join("main.js"), "").unwrap();

    assert_eq!(resolve_entry(dir).unwrap(), dir.join("index.mjs"));
}

#[test]
fn test_fallback_order() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("index.js"), "").unwrap();
    fs::write(dir.join("plugin.js"), "").unwrap();

    assert_eq!(resolve_entry(dir).unwrap(), dir.join("plugin.js"));
}

#[test]
fn test_file_path_used_directly() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("effect.js");
    fs::write(&file, "").unwrap();
    assert_eq!(resolve_entry(&file).unwrap(), file);

    fs::write(tmp.path().join("effect.mjs"), "").unwrap();
    assert_eq!(resolve_entry(&file).unwrap(), tmp.path().join("effect.mjs"));
}

#[test]
fn test_no_entry_is_validation_error() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("README.md"), "").unwrap();

    let err = resolve_entry(tmp.path()).unwrap_err();
    assert!(matches!(err, crate::error::PluginError::Validation { .. }));
    assert!(resolve_entry(&tmp.path().join("nope")).is_err());
}
