use std::fs;

use pretty_assertions::assert_eq;

use super::*;

fn install_package(base: &Path, package: &str, manifest: &str) -> PathBuf {
    let dir = package_dir(&base.join(NODE_MODULES), package);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(PACKAGE_MANIFEST), manifest).unwrap();
    dir
}

struct Layout {
    _tmp: tempfile::TempDir,
    work: PathBuf,
    app: PathBuf,
    archive: PathBuf,
}

fn layout() -> Layout {
    let tmp = tempfile::tempdir().unwrap();
    let root = fs::canonicalize(tmp.path()).unwrap();
    let work = root.join("work");
    let app = root.join("app");
    let archive = root.join("resources").join("app.asar");
    for dir in [&work, &app, &archive] {
        fs::create_dir_all(dir).unwrap();
    }
    Layout {
        _tmp: tmp,
        work,
        app,
        archive,
    }
}

fn resolver_for(layout: &Layout) -> DependencyResolver {
    DependencyResolver::new(StorageRoots {
        working_dir: layout.work.clone(),
        app_root: Some(layout.app.clone()),
        archive: Some(layout.archive.clone()),
        unpacked: None,
    })
}

#[test]
fn test_earlier_root_wins_deterministically() {
    let layout = layout();
    install_package(&layout.app, "three", "{}");
    let expected = install_package(&layout.work, "three", "{}");
    let resolver = resolver_for(&layout);

    for _ in 0..5 {
        let resolved = resolver.resolve("three").unwrap();
        assert_eq!(resolved.root, expected);
        assert!(!resolved.read_only);
    }
}

#[test]
fn test_unpacked_preferred_over_archive() {
    let layout = layout();
    install_package(&layout.archive, "sharp", "{}");
    let unpacked = PathBuf::from(format!("{}.unpacked", layout.archive.display()));
    let expected = install_package(&unpacked, "sharp", "{}");

    let resolved = resolver_for(&layout).resolve("sharp").unwrap();
    assert_eq!(resolved.root, expected);
    assert!(!resolved.read_only);
}

#[test]
fn test_archive_resident_package_is_read_only() {
    let layout = layout();
    let expected = install_package(&layout.archive, "@lumen/effects", "{}");

    let resolved = resolver_for(&layout).resolve("@lumen/effects").unwrap();
    assert_eq!(resolved.root, expected);
    assert!(resolved.read_only);
}

#[test]
fn test_missing_package_is_none() {
    let layout = layout();
    assert_eq!(resolver_for(&layout).resolve("left-pad"), None);
    assert_eq!(resolver_for(&layout).resolve("../escape"), None);
    assert_eq!(resolver_for(&layout).resolve(""), None);
}

#[test]
fn test_symlinked_package_resolves_to_real_path() {
    let layout = layout();
    let real = install_package(&layout.app, "three", "{}");
    let link_parent = layout.work.join(NODE_MODULES);
    fs::create_dir_all(&link_parent).unwrap();
    #[cfg(unix)]
    std::os::unix::fs::symlink(&real, link_parent.join("three")).unwrap();
    #[cfg(windows)]
    std::os::windows::fs::symlink_dir(&real, link_parent.join("three")).unwrap();

    let resolved = resolver_for(&layout).resolve("three").unwrap();
    assert_eq!(resolved.root, real);
}

#[test]
fn test_entry_point_precedence() {
    let layout = layout();
    let root = install_package(
        &layout.work,
        "a",
        r#"{"main": "lib/main.js", "module": "esm/index.js"}"#,
    );
    let resolved = resolver_for(&layout).resolve("a").unwrap();
    assert_eq!(resolved.entry_point(), root.join("esm/index.js"));

    let root = install_package(
        &layout.work,
        "b",
        r#"{"main": "main.js", "exports": {".": {"import": "./dist/b.mjs", "require": "./dist/b.cjs"}}}"#,
    );
    let resolved = resolver_for(&layout).resolve("b").unwrap();
    assert_eq!(resolved.entry_point(), root.join("dist/b.mjs"));

    let root = install_package(&layout.work, "c", "{}");
    let resolved = resolver_for(&layout).resolve("c").unwrap();
    assert_eq!(resolved.entry_point(), root.join("index.js"));
}

#[test]
fn test_dependency_names() {
    let layout = layout();
    install_package(
        &layout.work,
        "@lumen/effects",
        r#"{"dependencies": {"regl": "^2.1.0", "gl-matrix": "3"}}"#,
    );
    let resolved = resolver_for(&layout).resolve("@lumen/effects").unwrap();
    let mut deps = resolved.dependency_names();
    deps.sort();
    assert_eq!(deps, vec!["gl-matrix".to_string(), "regl".to_string()]);
}
