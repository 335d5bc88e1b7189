//! Persisted mapping from plugin source directories to processed output.
//!
//! Stored at `<data_dir>/processed_dirs.json`:
//!
//! ```json
//! {
//!   "version": 1,
//!   "timestamp": "2026-01-01T00:00:00Z",
//!   "mappings": {
//!     "/home/me/plugins/glow": {
//!       "processed_dir": "/home/me/.lumen/processed/glow-1767225600000",
//!       "source_hash": "9f86d0…",
//!       "created_at": "2026-01-01T00:00:00Z"
//!     }
//!   },
//!   "registry_snapshot": null
//! }
//! ```
//!
//! A mapping only counts when its processed directory still exists.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use tracing::debug;
use tracing::warn;
use walkdir::WalkDir;

use crate::error::Result;
use crate::error::plugin_error::CacheSnafu;
use crate::materializer::is_skipped_dir;
use crate::rewriter::normalize_lexically;

/// Current on-disk format. Any other version discards the file.
pub const CACHE_VERSION: u32 = 1;

/// One source directory's processed output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedDirMapping {
    pub processed_dir: PathBuf,
    #[serde(default)]
    pub source_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A committed effect as recorded in the registry snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub name: String,
    pub category: String,
    pub owner: String,
}

/// Summary of the live registry, reused until a plugin operation changes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub created_at: DateTime<Utc>,
    pub effects: Vec<SnapshotEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheDocument {
    version: u32,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    mappings: BTreeMap<String, ProcessedDirMapping>,
    #[serde(default)]
    registry_snapshot: Option<RegistrySnapshot>,
}

impl CacheDocument {
    fn empty() -> Self {
        Self {
            version: CACHE_VERSION,
            timestamp: Utc::now(),
            mappings: BTreeMap::new(),
            registry_snapshot: None,
        }
    }
}

/// Result of [`ProcessedDirCache::sweep_orphans`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: usize,
    pub total: usize,
}

/// File-backed processed-directory cache.
///
/// Mutations persist immediately; a failed write leaves the in-memory state
/// updated and returns [`crate::PluginError::Cache`].
#[derive(Debug)]
pub struct ProcessedDirCache {
    path: PathBuf,
    document: CacheDocument,
}

impl ProcessedDirCache {
    /// Load from disk. Missing, unreadable or wrong-version files yield an
    /// empty cache.
    pub fn load(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            document: read_document(path),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.document.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.document.mappings.is_empty()
    }

    /// Processed directory for `source`, if the mapping exists, its directory
    /// is still on disk and (when given) the fingerprint matches.
    pub fn get(&self, source: &Path, fingerprint: Option<&str>) -> Option<PathBuf> {
        let key = cache_key(source);
        let mapping = self.document.mappings.get(&key)?;
        if !mapping.processed_dir.is_dir() {
            debug!(source = %key, processed = %mapping.processed_dir.display(), "Processed dir vanished, cache miss");
            return None;
        }
        if let Some(fingerprint) = fingerprint {
            if mapping.source_hash.as_deref() != Some(fingerprint) {
                debug!(source = %key, "Source fingerprint changed, cache miss");
                return None;
            }
        }
        Some(mapping.processed_dir.clone())
    }

    /// Raw mapping for `source`, regardless of validity.
    pub fn mapping(&self, source: &Path) -> Option<&ProcessedDirMapping> {
        self.document.mappings.get(&cache_key(source))
    }

    /// Record or replace the mapping for `source`.
    pub fn put(&mut self, source: &Path, processed_dir: &Path, fingerprint: Option<&str>) -> Result<()> {
        let key = cache_key(source);
        debug!(source = %key, processed = %processed_dir.display(), "Caching processed dir");
        self.document.mappings.insert(
            key,
            ProcessedDirMapping {
                processed_dir: processed_dir.to_path_buf(),
                source_hash: fingerprint.map(String::from),
                created_at: Utc::now(),
            },
        );
        self.save()
    }

    /// Drop the mapping for `source`, returning its processed directory.
    ///
    /// The directory itself is left on disk.
    pub fn invalidate(&mut self, source: &Path) -> Result<Option<PathBuf>> {
        let removed = self.document.mappings.remove(&cache_key(source));
        if removed.is_none() {
            return Ok(None);
        }
        self.save()?;
        Ok(removed.map(|m| m.processed_dir))
    }

    /// Remove mappings whose processed directory no longer exists.
    pub fn sweep_orphans(&mut self) -> Result<SweepReport> {
        let total = self.document.mappings.len();
        self.document
            .mappings
            .retain(|_, mapping| mapping.processed_dir.is_dir());
        let removed = total - self.document.mappings.len();
        if removed > 0 {
            debug!(removed, total, "Swept orphaned cache mappings");
            self.save()?;
        }
        Ok(SweepReport { removed, total })
    }

    /// Every processed directory referenced by a mapping.
    pub fn referenced_dirs(&self) -> HashSet<PathBuf> {
        self.document
            .mappings
            .values()
            .map(|m| m.processed_dir.clone())
            .collect()
    }

    pub fn registry_snapshot(&self) -> Option<&RegistrySnapshot> {
        self.document.registry_snapshot.as_ref()
    }

    pub fn store_registry_snapshot(&mut self, effects: Vec<SnapshotEntry>) -> Result<()> {
        self.document.registry_snapshot = Some(RegistrySnapshot {
            created_at: Utc::now(),
            effects,
        });
        self.save()
    }

    /// Forget the registry snapshot so the next reader rebuilds it.
    pub fn invalidate_registry_snapshot(&mut self) -> Result<()> {
        if self.document.registry_snapshot.take().is_none() {
            return Ok(());
        }
        self.save()
    }

    /// Write the cache to disk.
    pub fn save(&mut self) -> Result<()> {
        self.document.timestamp = Utc::now();
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheSnafu {
                    path: parent.to_path_buf(),
                    message: format!("Failed to create directory: {e}"),
                }
                .build()
            })?;
        }

        let content = serde_json::to_string_pretty(&self.document).map_err(|e| {
            CacheSnafu {
                path: self.path.clone(),
                message: format!("Failed to serialize: {e}"),
            }
            .build()
        })?;

        std::fs::write(&self.path, content).map_err(|e| {
            CacheSnafu {
                path: self.path.clone(),
                message: format!("Failed to write: {e}"),
            }
            .build()
        })?;
        Ok(())
    }
}

fn read_document(path: &Path) -> CacheDocument {
    if !path.exists() {
        return CacheDocument::empty();
    }
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read processed cache");
            return CacheDocument::empty();
        }
    };
    match serde_json::from_str::<CacheDocument>(&content) {
        Ok(doc) if doc.version == CACHE_VERSION => {
            debug!(path = %path.display(), mappings = doc.mappings.len(), "Loaded processed cache");
            doc
        }
        Ok(doc) => {
            warn!(
                path = %path.display(),
                found = doc.version,
                expected = CACHE_VERSION,
                "Processed cache version mismatch, starting fresh"
            );
            CacheDocument::empty()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Corrupted processed cache, starting fresh");
            CacheDocument::empty()
        }
    }
}

/// Canonical string key for a source path.
pub fn cache_key(source: &Path) -> String {
    let canonical = std::fs::canonicalize(source).unwrap_or_else(|_| {
        if source.is_absolute() {
            normalize_lexically(source)
        } else {
            std::env::current_dir()
                .map(|cwd| normalize_lexically(&cwd.join(source)))
                .unwrap_or_else(|_| source.to_path_buf())
        }
    });
    canonical.to_string_lossy().into_owned()
}

/// SHA-256 over the sorted relative paths and contents of every file that
/// materialization would see.
pub fn fingerprint_dir(dir: &Path) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let walker = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !is_skipped_dir(&entry.file_name().to_string_lossy())
        });

    for entry in walker {
        let entry = entry.map_err(std::io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        hasher.update(relative.to_string_lossy().replace('\\', "/").as_bytes());
        hasher.update([0u8]);
        hasher.update(std::fs::read(entry.path())?);
        hasher.update([0u8]);
    }
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{b:02x}");
            s
        })
}

#[cfg(test)]
#[path = "processed_cache.test.rs"]
mod tests;
