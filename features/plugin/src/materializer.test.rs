use std::fs;

use lumen_config::StorageRoots;
use pretty_assertions::assert_eq;

use super::*;
use crate::rewriter::to_file_url;

struct Fixture {
    _tmp: tempfile::TempDir,
    root: PathBuf,
    work: PathBuf,
    archive: PathBuf,
}

fn fixture() -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let root = fs::canonicalize(tmp.path()).unwrap();
    let work = root.join("work");
    let archive = root.join("app.asar");
    fs::create_dir_all(work.join(NODE_MODULES)).unwrap();
    fs::create_dir_all(archive.join(NODE_MODULES)).unwrap();
    Fixture {
        _tmp: tmp,
        root,
        work,
        archive,
    }
}

fn install(base: &Path, package: &str, manifest: &str) -> PathBuf {
    let dir = package_dir(&base.join(NODE_MODULES), package);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("package.json"), manifest).unwrap();
    fs::write(dir.join("index.js"), "export default 1;\n").unwrap();
    dir
}

fn materializer(fx: &Fixture, shared: &[&str]) -> Materializer {
    let resolver = DependencyResolver::new(StorageRoots {
        working_dir: fx.work.clone(),
        app_root: None,
        archive: Some(fx.archive.clone()),
        unpacked: None,
    });
    Materializer::new(
        resolver,
        "@lumen/effects",
        shared.iter().map(|s| s.to_string()).collect(),
    )
}

#[test]
fn test_materialize_mirrors_tree() {
    let fx = fixture();
    let three = install(&fx.work, "three", r#"{"main": "index.js"}"#);
    let src = fx.root.join("plugin");
    fs::create_dir_all(src.join("lib")).unwrap();
    fs::create_dir_all(src.join(".git")).unwrap();
    fs::create_dir_all(src.join("node_modules/junk")).unwrap();
    fs::write(src.join(".git/HEAD"), "ref").unwrap();
    fs::write(src.join("node_modules/junk/index.js"), "").unwrap();
    fs::write(
        src.join("index.js"),
        "import * as T from 'three';\nimport { fx } from './lib/fx';\n",
    )
    .unwrap();
    fs::write(src.join("lib/fx.cjs"), "module.exports = {};\n").unwrap();
    fs::write(src.join("lib/noise.png"), [0u8, 1, 2, 3]).unwrap();
    let dest = fx.root.join("processed/plugin-1");

    let report = materializer(&fx, &["@lumen/effects", "three"])
        .materialize(&src, &dest)
        .unwrap();

    assert_eq!(report.rewritten, 2);
    assert_eq!(report.copied, 1);
    assert!(report.failures.is_empty());
    assert!(!dest.join(".git").exists());
    assert!(!dest.join("node_modules").exists());
    assert!(dest.join("lib/fx.mjs").exists());
    assert!(!dest.join("lib/fx.cjs").exists());
    assert_eq!(fs::read(dest.join("lib/noise.png")).unwrap(), vec![0u8, 1, 2, 3]);

    let index = fs::read_to_string(dest.join("index.mjs")).unwrap();
    assert_eq!(
        index,
        format!(
            "import * as T from '{}';\nimport {{ fx }} from '{}';\n",
            to_file_url(&three.join("index.js")),
            to_file_url(&dest.join("lib/fx.mjs")),
        )
    );
}

#[test]
fn test_materialize_skips_unreadable_file() {
    let fx = fixture();
    let src = fx.root.join("plugin");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("index.js"), "export function register() {}\n").unwrap();
    fs::write(src.join("broken.js"), [0xffu8, 0xfe, 0x00]).unwrap();
    let dest = fx.root.join("out");

    let report = materializer(&fx, &[]).materialize(&src, &dest).unwrap();

    assert_eq!(report.rewritten, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].path, src.join("broken.js"));
    assert!(dest.join("index.mjs").exists());
}

#[test]
fn test_materialize_missing_source_is_error() {
    let fx = fixture();
    let err = materializer(&fx, &[])
        .materialize(&fx.root.join("nope"), &fx.root.join("out"))
        .unwrap_err();
    assert!(matches!(err, crate::error::PluginError::Validation { .. }));
}

#[test]
fn test_link_dependencies_links_or_copies() {
    let fx = fixture();
    let three = install(&fx.work, "three", "{}");
    install(
        &fx.archive,
        "@lumen/effects",
        r#"{"dependencies": {"regl": "2"}}"#,
    );
    install(&fx.archive, "regl", "{}");
    let dest = fx.root.join("out");
    fs::create_dir_all(&dest).unwrap();

    let report = materializer(&fx, &["@lumen/effects", "three", "missing-pkg"]).link_dependencies(&dest);

    assert_eq!(report.linked, vec!["three".to_string()]);
    assert_eq!(report.copied, vec!["@lumen/effects".to_string(), "regl".to_string()]);
    assert_eq!(report.missing, vec!["missing-pkg".to_string()]);

    let linked = dest.join("node_modules/three");
    assert!(fs::symlink_metadata(&linked).unwrap().file_type().is_symlink());
    assert_eq!(fs::canonicalize(&linked).unwrap(), three);

    let copied = dest.join("node_modules/@lumen/effects");
    assert!(!fs::symlink_metadata(&copied).unwrap().file_type().is_symlink());
    assert!(copied.join("index.js").exists());

    let again = materializer(&fx, &["three"]).link_dependencies(&dest);
    assert!(again.existing.contains(&"three".to_string()));
    assert!(again.linked.is_empty());
}

#[test]
fn test_unlink_source_dependencies_removes_what_was_added() {
    let fx = fixture();
    install(&fx.work, "three", "{}");
    install(&fx.archive, "@lumen/effects", r#"{"dependencies": {"regl": "2"}}"#);
    install(&fx.archive, "regl", "{}");
    let plugin = fx.root.join("plugin");
    install(&plugin, "regl", r#"{"name": "regl", "version": "1"}"#);
    let m = materializer(&fx, &["@lumen/effects", "three"]);

    let report = m.link_source_dependencies(&plugin);
    assert_eq!(report.linked, vec!["three".to_string()]);
    assert_eq!(report.copied, vec!["@lumen/effects".to_string()]);
    assert_eq!(report.existing, vec!["regl".to_string()]);
    let marker = plugin.join("node_modules").join(COPIED_PACKAGES_MARKER);
    assert!(marker.is_file());

    assert_eq!(m.unlink_source_dependencies(&plugin), 2);
    assert!(!plugin.join("node_modules/three").exists());
    assert!(!plugin.join("node_modules/@lumen").exists());
    assert!(!marker.exists());
    // Installed by the plugin author, not by us.
    assert!(plugin.join("node_modules/regl/package.json").is_file());
}

#[test]
fn test_unlink_source_dependencies_cleans_up_node_modules() {
    let fx = fixture();
    install(&fx.archive, "@lumen/effects", "{}");
    let plugin = fx.root.join("plugin");
    fs::create_dir_all(&plugin).unwrap();
    let m = materializer(&fx, &["@lumen/effects"]);

    m.link_source_dependencies(&plugin);
    m.link_source_dependencies(&plugin);
    assert_eq!(m.unlink_source_dependencies(&plugin), 1);

    assert!(!plugin.join("node_modules").exists());
}

#[test]
fn test_materialize_reports_output_collision() {
    let fx = fixture();
    let src = fx.root.join("plugin");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("a.js"), "export const from = 'js';\n").unwrap();
    fs::write(src.join("a.mjs"), "export const from = 'mjs';\n").unwrap();
    let dest = fx.root.join("out");

    let report = materializer(&fx, &[]).materialize(&src, &dest).unwrap();

    assert_eq!(report.rewritten, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].path, src.join("a.mjs"));
    assert!(report.failures[0].message.contains("already written"));
    assert_eq!(
        fs::read_to_string(dest.join("a.mjs")).unwrap(),
        "export const from = 'js';\n"
    );
}

#[test]
fn test_new_processed_dir_is_unique() {
    let tmp = tempfile::tempdir().unwrap();
    let first = new_processed_dir(tmp.path(), "my plugin/x");
    fs::create_dir_all(&first).unwrap();
    let second = new_processed_dir(tmp.path(), "my plugin/x");

    assert_ne!(first, second);
    let name = first.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("my-plugin-x-"));
}

#[test]
fn test_skipped_dirs() {
    assert!(is_skipped_dir(".git"));
    assert!(is_skipped_dir("node_modules"));
    assert!(!is_skipped_dir("src"));
}
