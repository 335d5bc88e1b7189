use std::fs;

use pretty_assertions::assert_eq;

use super::*;

fn setup() -> (tempfile::TempDir, PathBuf, PathBuf, PathBuf) {
    let tmp = tempfile::tempdir().unwrap();
    let root = fs::canonicalize(tmp.path()).unwrap();
    let source = root.join("plugins/glow");
    let processed = root.join("processed/glow-1");
    fs::create_dir_all(&source).unwrap();
    fs::create_dir_all(&processed).unwrap();
    let cache_file = root.join("data/processed_dirs.json");
    (tmp, source, processed, cache_file)
}

#[test]
fn test_put_get_roundtrip_across_reload() {
    let (_tmp, source, processed, file) = setup();
    let mut cache = ProcessedDirCache::load(&file);
    assert!(cache.is_empty());

    cache.put(&source, &processed, Some("abc")).unwrap();
    assert_eq!(cache.get(&source, Some("abc")), Some(processed.clone()));

    let reloaded = ProcessedDirCache::load(&file);
    assert_eq!(reloaded.len(), 1);
    assert_eq!(reloaded.get(&source, None), Some(processed));
}

#[test]
fn test_get_misses_after_out_of_band_delete() {
    let (_tmp, source, processed, file) = setup();
    let mut cache = ProcessedDirCache::load(&file);
    cache.put(&source, &processed, None).unwrap();

    fs::remove_dir_all(&processed).unwrap();

    assert_eq!(cache.get(&source, None), None);
    assert!(cache.mapping(&source).is_some());
}

#[test]
fn test_get_misses_on_fingerprint_change() {
    let (_tmp, source, processed, file) = setup();
    let mut cache = ProcessedDirCache::load(&file);
    cache.put(&source, &processed, Some("old")).unwrap();

    assert_eq!(cache.get(&source, Some("new")), None);
    assert_eq!(cache.get(&source, None), Some(processed));
}

#[test]
fn test_keys_are_canonical() {
    let (_tmp, source, processed, file) = setup();
    let mut cache = ProcessedDirCache::load(&file);
    cache.put(&source.join("../glow/."), &processed, None).unwrap();

    assert_eq!(cache.get(&source, None), Some(processed));
}

#[test]
fn test_invalidate() {
    let (_tmp, source, processed, file) = setup();
    let mut cache = ProcessedDirCache::load(&file);
    cache.put(&source, &processed, None).unwrap();

    assert_eq!(cache.invalidate(&source).unwrap(), Some(processed.clone()));
    assert_eq!(cache.invalidate(&source).unwrap(), None);
    assert!(processed.exists());
    assert!(ProcessedDirCache::load(&file).is_empty());
}

#[test]
fn test_sweep_orphans() {
    let (_tmp, source, processed, file) = setup();
    let other_source = source.with_file_name("other");
    let gone = processed.with_file_name("other-1");
    let mut cache = ProcessedDirCache::load(&file);
    cache.put(&source, &processed, None).unwrap();
    cache.put(&other_source, &gone, None).unwrap();

    let report = cache.sweep_orphans().unwrap();
    assert_eq!(report, SweepReport { removed: 1, total: 2 });
    assert_eq!(cache.referenced_dirs(), HashSet::from([processed]));
}

#[test]
fn test_version_mismatch_discards_file() {
    let (_tmp, source, processed, file) = setup();
    fs::create_dir_all(file.parent().unwrap()).unwrap();
    let stale = serde_json::json!({
        "version": CACHE_VERSION + 1,
        "timestamp": "2026-01-01T00:00:00Z",
        "mappings": {
            (source.to_string_lossy().to_string()): {
                "processed_dir": processed,
                "created_at": "2026-01-01T00:00:00Z"
            }
        }
    });
    fs::write(&file, stale.to_string()).unwrap();

    assert!(ProcessedDirCache::load(&file).is_empty());
}

#[test]
fn test_corrupt_file_is_empty() {
    let (_tmp, _source, _processed, file) = setup();
    fs::create_dir_all(file.parent().unwrap()).unwrap();
    fs::write(&file, "{not json").unwrap();

    assert!(ProcessedDirCache::load(&file).is_empty());
}

#[test]
fn test_registry_snapshot_lifecycle() {
    let (_tmp, _source, _processed, file) = setup();
    let mut cache = ProcessedDirCache::load(&file);
    assert!(cache.registry_snapshot().is_none());

    let entry = SnapshotEntry {
        name: "Glow".to_string(),
        category: "primary".to_string(),
        owner: "glow".to_string(),
    };
    cache.store_registry_snapshot(vec![entry.clone()]).unwrap();
    let reloaded = ProcessedDirCache::load(&file);
    assert_eq!(reloaded.registry_snapshot().unwrap().effects, vec![entry]);

    cache.invalidate_registry_snapshot().unwrap();
    assert!(ProcessedDirCache::load(&file).registry_snapshot().is_none());
}

#[test]
fn test_fingerprint_tracks_content_and_ignores_skipped_dirs() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("index.js"), "a").unwrap();
    let first = fingerprint_dir(dir).unwrap();
    assert_eq!(first.len(), 64);

    fs::create_dir_all(dir.join("node_modules/x")).unwrap();
    fs::write(dir.join("node_modules/x/index.js"), "ignored").unwrap();
    assert_eq!(fingerprint_dir(dir).unwrap(), first);

    fs::write(dir.join("index.js"), "b").unwrap();
    assert_ne!(fingerprint_dir(dir).unwrap(), first);
}
