//! Resolved settings for the plugin pipeline.

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use crate::json_config::AppConfig;

pub const DEFAULT_ENGINE_PACKAGE: &str = "@lumen/effects";
pub const DEFAULT_NODE_BINARY: &str = "node";
pub const DEFAULT_LOAD_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_BULK_LOAD_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_ORPHAN_RETENTION_HOURS: u64 = 24;

/// Suffix appended to the archive path to find its unpacked sibling.
pub const UNPACKED_SUFFIX: &str = ".unpacked";

/// Locations that may hold a shared package's `node_modules` tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRoots {
    pub working_dir: PathBuf,
    pub app_root: Option<PathBuf>,
    /// Immutable packaged archive. Anything under it is read-only.
    pub archive: Option<PathBuf>,
    /// Explicit unpacked directory; derived from `archive` when unset.
    pub unpacked: Option<PathBuf>,
}

impl StorageRoots {
    /// Roots for a process running straight from `working_dir`.
    pub fn from_working_dir(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            app_root: None,
            archive: None,
            unpacked: None,
        }
    }

    /// The archive's unpacked sibling, if any archive is configured.
    pub fn unpacked_dir(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.unpacked {
            return Some(dir.clone());
        }
        self.archive.as_ref().map(|archive| {
            let mut name = archive.as_os_str().to_os_string();
            name.push(UNPACKED_SUFFIX);
            PathBuf::from(name)
        })
    }

    /// Immutable roots: anything resolved beneath these cannot be symlinked
    /// into or written to.
    pub fn read_only_roots(&self) -> Vec<PathBuf> {
        self.archive.iter().cloned().collect()
    }
}

/// Everything the plugin pipeline needs, with defaults applied.
#[derive(Debug, Clone)]
pub struct PluginPipelineConfig {
    pub data_dir: PathBuf,
    pub node_binary: PathBuf,
    pub load_timeout: Duration,
    pub bulk_load_timeout: Duration,
    pub orphan_retention: Duration,
    pub engine_package: String,
    pub shared_packages: Vec<String>,
    pub roots: StorageRoots,
}

impl PluginPipelineConfig {
    /// Defaults rooted at `data_dir`, resolving packages from the current
    /// working directory.
    pub fn for_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let working_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            data_dir: data_dir.into(),
            node_binary: PathBuf::from(DEFAULT_NODE_BINARY),
            load_timeout: Duration::from_secs(DEFAULT_LOAD_TIMEOUT_SECS),
            bulk_load_timeout: Duration::from_secs(DEFAULT_BULK_LOAD_TIMEOUT_SECS),
            orphan_retention: Duration::from_secs(DEFAULT_ORPHAN_RETENTION_HOURS * 3600),
            engine_package: DEFAULT_ENGINE_PACKAGE.to_string(),
            shared_packages: Vec::new(),
            roots: StorageRoots::from_working_dir(working_dir),
        }
    }

    /// Resolve the file configuration found under `home`.
    pub fn from_app_config(home: &Path, config: &AppConfig) -> Self {
        let section = config.plugins.clone().unwrap_or_default();
        let data_dir = section.data_dir.unwrap_or_else(|| home.to_path_buf());

        let mut resolved = Self::for_data_dir(data_dir);
        if let Some(node) = section.node_binary {
            resolved.node_binary = node;
        }
        if let Some(secs) = section.load_timeout_secs {
            resolved.load_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = section.bulk_load_timeout_secs {
            resolved.bulk_load_timeout = Duration::from_secs(secs);
        }
        if let Some(hours) = section.orphan_retention_hours {
            resolved.orphan_retention = Duration::from_secs(hours * 3600);
        }
        if let Some(engine) = section.engine_package.filter(|e| !e.is_empty()) {
            resolved.engine_package = engine;
        }
        if let Some(shared) = section.shared_packages {
            resolved.shared_packages = shared;
        }
        resolved.roots.app_root = section.app_root;
        resolved.roots.archive = section.archive_path;
        resolved.roots.unpacked = section.unpacked_path;
        resolved
    }

    /// Directory that receives remotely fetched plugin sources.
    pub fn plugins_dir(&self) -> PathBuf {
        self.data_dir.join("plugins")
    }

    /// Parent of every materialized plugin directory.
    pub fn processed_root(&self) -> PathBuf {
        self.data_dir.join("processed")
    }

    /// Plugin configuration store file.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("plugins.json")
    }

    /// Processed-directory cache file.
    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join("processed_dirs.json")
    }

    /// The engine package followed by the other shared packages, deduplicated.
    pub fn all_shared_packages(&self) -> Vec<String> {
        let mut packages = vec![self.engine_package.clone()];
        for pkg in &self.shared_packages {
            if !packages.contains(pkg) {
                packages.push(pkg.clone());
            }
        }
        packages
    }
}

#[cfg(test)]
#[path = "pipeline.test.rs"]
mod tests;
