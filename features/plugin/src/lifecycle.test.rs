use std::fs;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use lumen_config::StorageRoots;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use super::*;
use crate::progress::ProgressReport;
use crate::registry::InMemoryEffectRegistry;
use crate::testing::Behavior;
use crate::testing::FakeRuntime;
use crate::testing::config;
use crate::testing::effect;

struct Harness {
    tmp: TempDir,
    runtime: Arc<FakeRuntime>,
    registry: Arc<InMemoryEffectRegistry>,
    lifecycle: PluginLifecycle,
}

impl Harness {
    fn new(runtime: FakeRuntime) -> Self {
        Self::with_config(runtime, |_| {})
    }

    fn with_config(runtime: FakeRuntime, tweak: impl FnOnce(&mut PluginPipelineConfig)) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(tmp.path()).unwrap();
        let mut config = PluginPipelineConfig::for_data_dir(root.join("data"));
        config.roots = StorageRoots::from_working_dir(root.join("app"));
        config.load_timeout = Duration::from_secs(5);
        config.bulk_load_timeout = Duration::from_secs(1);
        tweak(&mut config);

        let runtime = Arc::new(runtime);
        let registry = Arc::new(InMemoryEffectRegistry::new());
        let lifecycle = PluginLifecycle::new(config, runtime.clone(), registry.clone());
        Self {
            tmp,
            runtime,
            registry,
            lifecycle,
        }
    }

    fn root(&self) -> PathBuf {
        fs::canonicalize(self.tmp.path()).unwrap()
    }

    fn write_plugin(&self, name: &str) -> PathBuf {
        let dir = self.root().join("sources").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("package.json"),
            format!(r#"{{"name": "{name}", "version": "1.0.0"}}"#),
        )
        .unwrap();
        fs::write(
            dir.join("index.js"),
            "import { Effect } from '@lumen/effects';\nimport './lib/util.js';\nexport default function register() {}\n",
        )
        .unwrap();
        fs::create_dir_all(dir.join("lib")).unwrap();
        fs::write(dir.join("lib/util.js"), "export const k = 1;\n").unwrap();
        dir
    }

    /// Provide a shared package under `base/node_modules`.
    fn provide_package(&self, base: &Path, package: &str) -> PathBuf {
        let dir = base.join("node_modules").join(package);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("package.json"), format!(r#"{{"name": "{package}"}}"#)).unwrap();
        fs::write(dir.join("index.js"), "export class Effect {}\n").unwrap();
        dir
    }

    fn processed_dirs(&self) -> Vec<PathBuf> {
        let root = self.lifecycle.config().processed_root();
        let Ok(entries) = fs::read_dir(root) else {
            return Vec::new();
        };
        let mut dirs: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
        dirs.sort();
        dirs
    }
}

fn recorder() -> (Arc<StdMutex<Vec<LifecyclePhase>>>, impl Fn(&ProgressReport) + Send + Sync) {
    let seen = Arc::new(StdMutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |report: &ProgressReport| {
        sink.lock().unwrap().push(report.phase)
    })
}

#[tokio::test]
async fn test_install_local_commits_registrations() {
    let h = Harness::new(FakeRuntime::new().on(
        "/bloom-",
        Behavior::Register(vec![effect("Bloom", "primary"), config("BloomConfig")]),
    ));
    let source = h.write_plugin("bloom");
    let (phases, observer) = recorder();

    let result = h
        .lifecycle
        .install(InstallRequest::local(&source), Some(&observer))
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.name, "bloom");
    assert_eq!(result.effects.len(), 1);
    assert_eq!(result.effects[0].category, "primary");

    let entry = h.registry.get("Bloom").unwrap();
    assert_eq!(entry.owner, "bloom");
    assert_eq!(entry.config.as_deref(), Some("BloomConfig"));
    assert_eq!(h.registry.get_by_category("primary").len(), 1);

    let processed = result.processed_dir.unwrap();
    assert!(processed.join("index.mjs").is_file());
    assert!(processed.join("lib/util.mjs").is_file());
    assert!(!processed.join("index.js").exists());

    let descriptor = h.lifecycle.store().get("bloom").unwrap();
    assert_eq!(descriptor.kind, PluginKind::Local);
    assert_eq!(descriptor.source_path, source);
    assert!(descriptor.enabled);

    assert_eq!(
        *phases.lock().unwrap(),
        vec![
            LifecyclePhase::Validating,
            LifecyclePhase::Configuring,
            LifecyclePhase::Processing,
            LifecyclePhase::Loading,
            LifecyclePhase::Registering,
            LifecyclePhase::Caching,
            LifecyclePhase::Complete,
        ]
    );
}

#[tokio::test]
async fn test_install_name_override() {
    let h = Harness::new(FakeRuntime::new());
    let source = h.write_plugin("bloom");

    let result = h
        .lifecycle
        .install(InstallRequest::local(&source).with_name("petals"), None)
        .await;

    assert!(result.success, "{:?}", result.error);
    assert!(h.lifecycle.store().get("petals").is_some());
    assert!(h.lifecycle.store().get("bloom").is_none());
}

#[tokio::test]
async fn test_failed_load_rolls_back_store_entry() {
    let h = Harness::new(FakeRuntime::new().on("/broken-", Behavior::Throw("SyntaxError: nope".into())));
    let source = h.write_plugin("broken");
    let (phases, observer) = recorder();

    let result = h
        .lifecycle
        .install(InstallRequest::local(&source), Some(&observer))
        .await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("SyntaxError: nope"));
    assert!(h.lifecycle.store().get("broken").is_none());
    assert!(h.registry.effects().is_empty());
    assert_eq!(phases.lock().unwrap().last(), Some(&LifecyclePhase::Error));
}

#[tokio::test]
async fn test_failed_install_removes_source_links() {
    let h = Harness::new(FakeRuntime::new().on("/broken-", Behavior::Throw("boom".into())));
    h.provide_package(&h.root().join("app"), "@lumen/effects");
    let source = h.write_plugin("broken");

    let result = h.lifecycle.install(InstallRequest::local(&source), None).await;

    assert!(!result.success);
    assert!(h.lifecycle.store().get("broken").is_none());
    assert!(fs::symlink_metadata(source.join("node_modules/@lumen/effects")).is_err());
    assert!(!source.join("node_modules").exists());
    assert!(source.join("index.js").is_file());
}

#[tokio::test]
async fn test_install_links_source_dependencies() {
    let h = Harness::new(FakeRuntime::new());
    let shared = h.provide_package(&h.root().join("app"), "@lumen/effects");
    let source = h.write_plugin("bloom");

    let result = h.lifecycle.install(InstallRequest::local(&source), None).await;

    assert!(result.success, "{:?}", result.error);
    let link = source.join("node_modules/@lumen/effects");
    assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    assert_eq!(fs::canonicalize(&link).unwrap(), shared);
}

#[tokio::test]
async fn test_uninstall_removes_packages_copied_from_archive() {
    let h = Harness::with_config(FakeRuntime::new(), |config| {
        config.roots.archive = config.data_dir.parent().map(|root| root.join("app.asar"));
    });
    h.provide_package(&h.root().join("app.asar"), "@lumen/effects");
    let source = h.write_plugin("bloom");

    let installed = h.lifecycle.install(InstallRequest::local(&source), None).await;
    assert!(installed.success, "{:?}", installed.error);
    let copied = source.join("node_modules/@lumen/effects");
    assert!(copied.join("package.json").is_file());
    assert!(!fs::symlink_metadata(&copied).unwrap().file_type().is_symlink());

    let removed = h.lifecycle.uninstall("bloom", false).await;

    assert!(removed.success, "{:?}", removed.error);
    assert!(!copied.exists());
    assert!(!source.join("node_modules").exists());
    assert!(source.join("index.js").is_file());
}

#[tokio::test]
async fn test_install_rejects_duplicate_name() {
    let h = Harness::new(FakeRuntime::new());
    let source = h.write_plugin("bloom");

    let first = h.lifecycle.install(InstallRequest::local(&source), None).await;
    let second = h.lifecycle.install(InstallRequest::local(&source), None).await;

    assert!(first.success, "{:?}", first.error);
    assert!(!second.success);
    assert!(second.error.unwrap().contains("already"));
    assert_eq!(h.lifecycle.store().plugins().len(), 1);
}

#[tokio::test]
async fn test_install_rejects_missing_source() {
    let h = Harness::new(FakeRuntime::new());
    let missing = h.root().join("nowhere");

    let result = h.lifecycle.install(InstallRequest::local(&missing), None).await;

    assert!(!result.success);
    assert!(h.lifecycle.store().plugins().is_empty());
    assert_eq!(h.runtime.total_invocations(), 0);
}

#[tokio::test]
async fn test_install_rejects_dir_without_entry() {
    let h = Harness::new(FakeRuntime::new());
    let dir = h.root().join("sources/empty");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("README.md"), "nothing here").unwrap();

    let result = h.lifecycle.install(InstallRequest::local(&dir), None).await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("no entry module"));
    assert!(h.lifecycle.store().plugins().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_load_all_isolates_hanging_plugin() {
    let h = Harness::new(
        FakeRuntime::new()
            .on("/alpha-", Behavior::Register(vec![effect("Alpha", "primary")]))
            .on(
                "/beta-",
                Behavior::Hang(Duration::from_secs(60), vec![effect("Beta", "primary")]),
            )
            .on("/gamma-", Behavior::Register(vec![effect("Gamma", "secondary")])),
    );
    for name in ["alpha", "beta", "gamma"] {
        let source = h.write_plugin(name);
        h.lifecycle
            .store()
            .add(PluginDescriptor::local(name, source))
            .unwrap();
    }

    let result = h.lifecycle.load_all(None).await;

    assert_eq!(result.loaded, vec!["alpha".to_string(), "gamma".to_string()]);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].name, "beta");
    assert!(result.failed[0].error.contains("timed out"), "{}", result.failed[0].error);
    assert!(h.registry.get("Alpha").is_some());
    assert!(h.registry.get("Gamma").is_some());
    assert!(h.registry.get("Beta").is_none());
}

#[tokio::test]
async fn test_load_all_progress_advances_per_plugin() {
    let h = Harness::new(FakeRuntime::new());
    for name in ["alpha", "beta", "gamma", "delta"] {
        let source = h.write_plugin(name);
        h.lifecycle
            .store()
            .add(PluginDescriptor::local(name, source))
            .unwrap();
    }
    let seen = Arc::new(StdMutex::new(Vec::new()));
    let sink = seen.clone();
    let observer = move |report: &ProgressReport| sink.lock().unwrap().push(report.percent);

    let result = h.lifecycle.load_all(Some(&observer)).await;

    assert_eq!(result.loaded.len(), 4);
    // 65 + 35 * i / 4
    assert_eq!(*seen.lock().unwrap(), vec![65, 73, 82, 91, 100]);
}

#[test]
fn test_batch_percent_bounds() {
    assert_eq!(batch_percent(0, 0), 65);
    assert_eq!(batch_percent(0, 3), 65);
    assert_eq!(batch_percent(2, 3), 88);
    assert!(batch_percent(99, 100) < 100);
}

#[tokio::test]
async fn test_load_all_skips_disabled_and_reuses_processed_dirs() {
    let h = Harness::new(
        FakeRuntime::new()
            .on("/alpha-", Behavior::Register(vec![effect("Alpha", "primary")]))
            .on("/beta-", Behavior::Register(vec![effect("Beta", "primary")])),
    );
    for name in ["alpha", "beta"] {
        let source = h.write_plugin(name);
        h.lifecycle
            .store()
            .add(PluginDescriptor::local(name, source))
            .unwrap();
    }
    assert!(!h.lifecycle.toggle("beta").await.unwrap());

    let first = h.lifecycle.load_all(None).await;
    let second = h.lifecycle.load_all(None).await;

    assert_eq!(first.loaded, vec!["alpha".to_string()]);
    assert_eq!(first, second);
    assert_eq!(h.processed_dirs().len(), 1);
    assert_eq!(h.runtime.total_invocations(), 1);
    assert_eq!(h.registry.effects().len(), 1);
}

#[tokio::test]
async fn test_source_change_invalidates_processed_dir() {
    let h = Harness::new(FakeRuntime::new());
    let source = h.write_plugin("alpha");
    h.lifecycle
        .store()
        .add(PluginDescriptor::local("alpha", &source))
        .unwrap();

    h.lifecycle.load_all(None).await;
    fs::write(source.join("lib/util.js"), "export const k = 2;\n").unwrap();
    h.lifecycle.load_all(None).await;

    assert_eq!(h.processed_dirs().len(), 2);
    assert_eq!(h.runtime.total_invocations(), 2);
}

#[tokio::test]
async fn test_uninstall_removes_everything_but_source() {
    let h = Harness::new(FakeRuntime::new().on(
        "/bloom-",
        Behavior::Register(vec![effect("Bloom", "primary")]),
    ));
    let source = h.write_plugin("bloom");
    let installed = h.lifecycle.install(InstallRequest::local(&source), None).await;
    let processed = installed.processed_dir.unwrap();

    let result = h.lifecycle.uninstall("bloom", false).await;

    assert!(result.success, "{:?}", result.error);
    assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    assert!(h.registry.get("Bloom").is_none());
    assert!(h.lifecycle.store().get("bloom").is_none());
    assert!(!processed.exists());
    assert!(source.join("index.js").is_file());
}

#[tokio::test]
async fn test_uninstall_can_delete_source() {
    let h = Harness::new(FakeRuntime::new());
    let source = h.write_plugin("bloom");
    h.lifecycle.install(InstallRequest::local(&source), None).await;

    let result = h.lifecycle.uninstall("bloom", true).await;

    assert!(result.success);
    assert!(!source.exists());
}

#[tokio::test]
async fn test_uninstall_unknown_plugin() {
    let h = Harness::new(FakeRuntime::new());

    let result = h.lifecycle.uninstall("ghost", false).await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("ghost"));
}

#[tokio::test]
async fn test_reload_rematerializes_without_touching_store() {
    let h = Harness::new(FakeRuntime::new().on(
        "/bloom-",
        Behavior::Register(vec![effect("Bloom", "primary")]),
    ));
    let source = h.write_plugin("bloom");
    let installed = h.lifecycle.install(InstallRequest::local(&source), None).await;
    let before = h.lifecycle.store().get("bloom").unwrap();
    let old_dir = installed.processed_dir.unwrap();

    let reloaded = h.lifecycle.reload("bloom", None).await;

    assert!(reloaded.success, "{:?}", reloaded.error);
    let new_dir = reloaded.processed_dir.unwrap();
    assert_ne!(new_dir, old_dir);
    assert!(!old_dir.exists());
    assert!(new_dir.join("index.mjs").is_file());
    assert_eq!(h.lifecycle.store().get("bloom").unwrap(), before);
    assert_eq!(h.registry.effects().len(), 1);
    assert_eq!(h.registry.get("Bloom").unwrap().class_ref.module, new_dir.join("index.mjs"));
    assert_eq!(h.runtime.total_invocations(), 2);
}

#[tokio::test]
async fn test_reload_unknown_plugin() {
    let h = Harness::new(FakeRuntime::new());

    let result = h.lifecycle.reload("ghost", None).await;

    assert!(!result.success);
}

#[tokio::test]
async fn test_cleanup_removes_unreferenced_processed_dirs() {
    let h = Harness::with_config(FakeRuntime::new(), |c| c.orphan_retention = Duration::ZERO);
    let source = h.write_plugin("bloom");
    let installed = h.lifecycle.install(InstallRequest::local(&source), None).await;
    let kept = installed.processed_dir.unwrap();
    let stray = h.lifecycle.config().processed_root().join("stale-1700000000000");
    fs::create_dir_all(&stray).unwrap();
    fs::write(stray.join("index.mjs"), "").unwrap();

    let report = h.lifecycle.cleanup_orphans().await;

    assert_eq!(report.removed_dirs, vec![stray.clone()]);
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    assert!(!stray.exists());
    assert!(kept.exists());
}

#[tokio::test]
async fn test_cleanup_respects_retention_window() {
    let h = Harness::with_config(FakeRuntime::new(), |c| {
        c.orphan_retention = Duration::from_secs(3600)
    });
    let stray = h.lifecycle.config().processed_root().join("fresh-1");
    fs::create_dir_all(&stray).unwrap();

    let report = h.lifecycle.cleanup_orphans().await;

    assert!(report.removed_dirs.is_empty());
    assert!(stray.exists());
}

#[tokio::test]
async fn test_bootstrap_engine_commits_under_engine_owner() {
    let h = Harness::new(FakeRuntime::new().on(
        "effects",
        Behavior::Register(vec![effect("Glow", "primary"), config("GlowConfig")]),
    ));
    let package = h.root().join("app/node_modules/@lumen/effects");
    fs::create_dir_all(&package).unwrap();
    fs::write(
        package.join("package.json"),
        r#"{"name": "@lumen/effects", "main": "dist/index.js"}"#,
    )
    .unwrap();
    fs::create_dir_all(package.join("dist")).unwrap();
    fs::write(package.join("dist/index.js"), "export {};\n").unwrap();

    let result = h.lifecycle.bootstrap_engine().await;

    assert!(result.success, "{:?}", result.error);
    let glow = h.registry.get("Glow").unwrap();
    assert_eq!(glow.owner, ENGINE_OWNER);
    assert_eq!(glow.config.as_deref(), Some("GlowConfig"));
}

#[tokio::test]
async fn test_bootstrap_engine_retries_circular_initialization() {
    let h = Harness::new(FakeRuntime::new().on(
        "effects",
        Behavior::ThrowThenRegister {
            times: 1,
            message: "ReferenceError: Cannot access 'Effect' before initialization".into(),
            calls: vec![effect("Glow", "primary")],
        },
    ));
    let package = h.root().join("app/node_modules/@lumen/effects");
    fs::create_dir_all(&package).unwrap();
    fs::write(package.join("index.js"), "export {};\n").unwrap();

    let retry = RetryConfig::default().with_initial_backoff(Duration::from_millis(1));
    let result = h.lifecycle.bootstrap_engine_with(&retry).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(h.runtime.total_invocations(), 2);
}

#[tokio::test]
async fn test_bootstrap_engine_without_package() {
    let h = Harness::new(FakeRuntime::new());

    let result = h.lifecycle.bootstrap_engine().await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("@lumen/effects"));
}

#[tokio::test]
async fn test_toggle_unknown_plugin_errors() {
    let h = Harness::new(FakeRuntime::new());

    let err = h.lifecycle.toggle("ghost").await.unwrap_err();

    assert!(matches!(err, PluginError::NotFound { .. }));
}

#[tokio::test]
async fn test_registry_snapshot_tracks_commits() {
    let h = Harness::new(
        FakeRuntime::new()
            .on("/alpha-", Behavior::Register(vec![effect("Alpha", "primary")]))
            .on("/beta-", Behavior::Register(vec![effect("Beta", "secondary")])),
    );
    let alpha = h.write_plugin("alpha");
    h.lifecycle.install(InstallRequest::local(&alpha), None).await;

    let first = h.lifecycle.registry_snapshot().await;
    assert_eq!(
        first,
        vec![SnapshotEntry {
            name: "Alpha".to_string(),
            category: "primary".to_string(),
            owner: "alpha".to_string(),
        }]
    );

    let beta = h.write_plugin("beta");
    h.lifecycle.install(InstallRequest::local(&beta), None).await;
    let second = h.lifecycle.registry_snapshot().await;
    assert_eq!(second.len(), 2);

    let persisted = ProcessedDirCache::load(&h.lifecycle.config().cache_path());
    assert_eq!(persisted.registry_snapshot().unwrap().effects, second);
}

#[tokio::test]
async fn test_install_end_to_end_with_node() {
    if !crate::testing::node_available() {
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let root = fs::canonicalize(tmp.path()).unwrap();
    let mut config = PluginPipelineConfig::for_data_dir(root.join("data"));
    config.roots = StorageRoots::from_working_dir(root.join("app"));
    config.shared_packages = vec!["three".to_string()];

    let effects = root.join("app/node_modules/@lumen/effects");
    fs::create_dir_all(&effects).unwrap();
    fs::write(
        effects.join("package.json"),
        r#"{"name": "@lumen/effects", "type": "module", "main": "index.js"}"#,
    )
    .unwrap();
    fs::write(effects.join("index.js"), "export class Effect {}\n").unwrap();
    let three = root.join("app/node_modules/three");
    fs::create_dir_all(three.join("addons")).unwrap();
    fs::write(
        three.join("package.json"),
        r#"{"name": "three", "type": "module", "main": "index.js"}"#,
    )
    .unwrap();
    fs::write(three.join("index.js"), "export const REVISION = '1';\n").unwrap();
    fs::write(three.join("addons/pass.js"), "export const pass = 'pass';\n").unwrap();

    let source = root.join("sources/glow");
    fs::create_dir_all(source.join("lib")).unwrap();
    fs::write(source.join("package.json"), r#"{"name": "glow", "type": "module"}"#).unwrap();
    fs::write(
        source.join("index.js"),
        "import { Effect } from '@lumen/effects';\n\
         import { REVISION } from 'three';\n\
         import { pass } from 'three/addons/pass.js';\n\
         import { tint } from './lib/tint';\n\
         export function register(effectRegistry) {\n\
         \x20 class Glow extends Effect {}\n\
         \x20 effectRegistry.registerGlobal(Glow, 'primary', { revision: REVISION, pass, tint });\n\
         }\n",
    )
    .unwrap();
    fs::write(source.join("lib/tint.js"), "export const tint = 'warm';\n").unwrap();

    let registry = Arc::new(InMemoryEffectRegistry::new());
    let lifecycle = PluginLifecycle::new(config, Arc::new(NodeRuntime::new("node")), registry.clone());

    let result = lifecycle.install(InstallRequest::local(&source), None).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.effects.len(), 1);
    assert_eq!(result.effects[0].category, "primary");
    assert_eq!(
        result.effects[0].metadata,
        serde_json::json!({"revision": "1", "pass": "pass", "tint": "warm"})
    );
    let entry = registry.get("Glow").unwrap();
    assert_eq!(entry.owner, "glow");
}
