use std::fs;

use pretty_assertions::assert_eq;

use super::*;
use crate::testing::Behavior;
use crate::testing::FakeRuntime;
use crate::testing::config;
use crate::testing::effect;

fn plugin_dir(root: &Path, name: &str) -> PathBuf {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("index.mjs"), "export function register() {}\n").unwrap();
    fs::canonicalize(dir).unwrap()
}

fn loader(runtime: &Arc<FakeRuntime>, timeout: Duration) -> PluginLoader {
    PluginLoader::new(runtime.clone(), timeout)
}

#[tokio::test]
async fn test_load_captures_registrations() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = plugin_dir(tmp.path(), "glow");
    let runtime = Arc::new(FakeRuntime::new().on(
        "glow",
        Behavior::Register(vec![effect("Glow", "primary"), config("GlowConfig")]),
    ));

    let result = loader(&runtime, Duration::from_secs(5)).load(&dir).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.entry, Some(dir.join("index.mjs")));
    assert_eq!(result.effects.len(), 1);
    assert_eq!(result.effects[0].category, "primary");
    assert_eq!(result.effects[0].class_ref.module, dir.join("index.mjs"));
    assert_eq!(result.configs[0].name, "GlowConfig");
    assert!(result.positions.is_empty());
}

#[tokio::test]
async fn test_same_location_imported_once() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = plugin_dir(tmp.path(), "glow");
    let runtime = Arc::new(FakeRuntime::new().on(
        "glow",
        Behavior::Register(vec![effect("Glow", "primary")]),
    ));
    let loader = loader(&runtime, Duration::from_secs(5));

    let first = loader.load(&dir).await;
    let second = loader.load(&dir.join("index.mjs")).await;

    assert_eq!(runtime.invocations(&dir.join("index.mjs")), 1);
    assert_eq!(first, second);
    assert!(loader.is_imported(&dir.join("index.mjs")));
}

#[tokio::test]
async fn test_independent_loaders_do_not_share_cache() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = plugin_dir(tmp.path(), "glow");
    let runtime = Arc::new(FakeRuntime::new());

    loader(&runtime, Duration::from_secs(5)).load(&dir).await;
    loader(&runtime, Duration::from_secs(5)).load(&dir).await;

    assert_eq!(runtime.total_invocations(), 2);
}

#[tokio::test]
async fn test_thrown_error_becomes_failed_result() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = plugin_dir(tmp.path(), "broken");
    let runtime = Arc::new(FakeRuntime::new().on("broken", Behavior::Throw("TypeError: boom".to_string())));

    let result = loader(&runtime, Duration::from_secs(5)).load(&dir).await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("TypeError: boom"));
    assert!(result.effects.is_empty());
}

#[tokio::test]
async fn test_missing_entry_is_failed_result() {
    let tmp = tempfile::tempdir().unwrap();
    let empty = tmp.path().join("empty");
    fs::create_dir_all(&empty).unwrap();
    let runtime = Arc::new(FakeRuntime::new());

    let result = loader(&runtime, Duration::from_secs(5)).load(&empty).await;

    assert!(!result.success);
    assert_eq!(runtime.total_invocations(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_abandons_but_import_completes_later() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = plugin_dir(tmp.path(), "slow");
    let runtime = Arc::new(FakeRuntime::new().on(
        "slow",
        Behavior::Hang(Duration::from_secs(10), vec![effect("Slow", "primary")]),
    ));
    let loader = loader(&runtime, Duration::from_secs(1));

    let result = loader.load(&dir).await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("timed out"));

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert!(loader.is_imported(&dir.join("index.mjs")));

    let later = loader.load(&dir).await;
    assert!(later.success);
    assert_eq!(later.effects[0].name, "Slow");
    assert_eq!(runtime.invocations(&dir.join("index.mjs")), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_on_circular_initialization() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = plugin_dir(tmp.path(), "engine");
    let runtime = Arc::new(FakeRuntime::new().on(
        "engine",
        Behavior::ThrowThenRegister {
            times: 2,
            message: "ReferenceError: Cannot access 'Effect' before initialization".to_string(),
            calls: vec![effect("Base", "core")],
        },
    ));
    let loader = loader(&runtime, Duration::from_secs(5));

    let result = loader.load_with_retry(&dir, &RetryConfig::default()).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(runtime.invocations(&dir.join("index.mjs")), 3);
}

#[tokio::test(start_paused = true)]
async fn test_retry_gives_up_after_max_attempts() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = plugin_dir(tmp.path(), "engine");
    let runtime = Arc::new(FakeRuntime::new().on(
        "engine",
        Behavior::Throw("circular dependency detected".to_string()),
    ));
    let loader = loader(&runtime, Duration::from_secs(5));

    let result = loader
        .load_with_retry(&dir, &RetryConfig::default().with_max_attempts(2))
        .await;

    assert!(!result.success);
    assert_eq!(runtime.invocations(&dir.join("index.mjs")), 2);
}

#[tokio::test]
async fn test_other_errors_not_retried() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = plugin_dir(tmp.path(), "engine");
    let runtime = Arc::new(FakeRuntime::new().on("engine", Behavior::Throw("SyntaxError".to_string())));
    let loader = loader(&runtime, Duration::from_secs(5));

    let result = loader.load_with_retry(&dir, &RetryConfig::default()).await;

    assert!(!result.success);
    assert_eq!(runtime.invocations(&dir.join("index.mjs")), 1);
}

#[test]
fn test_backoff_increases_and_caps() {
    let retry = RetryConfig::default().with_initial_backoff(Duration::from_millis(100));
    assert_eq!(retry.backoff_for(1), Duration::from_millis(100));
    assert_eq!(retry.backoff_for(2), Duration::from_millis(200));
    assert_eq!(retry.backoff_for(3), Duration::from_millis(400));
    assert_eq!(retry.backoff_for(20), retry.max_backoff);
}
