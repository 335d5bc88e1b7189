//! Plugin lifecycle orchestration.
//!
//! [`PluginLifecycle`] sequences validation, fetching, materialization,
//! loading and registration for install, bulk load, uninstall, reload and
//! orphan cleanup. Every public operation resolves to a result value; only
//! [`PluginLifecycle::toggle`] returns `Err`.
//!
//! Operations on the same plugin name are serialized.

use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::SystemTime;

use lumen_config::PluginPipelineConfig;
use serde::Serialize;
use snafu::ResultExt;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config_store::PluginConfigStore;
use crate::config_store::PluginDescriptor;
use crate::config_store::PluginKind;
use crate::config_store::PluginOrigin;
use crate::entry::resolve_entry;
use crate::error::PluginError;
use crate::error::Result;
use crate::error::plugin_error::AlreadyExistsSnafu;
use crate::error::plugin_error::IoSnafu;
use crate::error::plugin_error::LoadSnafu;
use crate::error::plugin_error::MaterializationSnafu;
use crate::error::plugin_error::NotFoundSnafu;
use crate::error::plugin_error::ResolutionSnafu;
use crate::error::plugin_error::ValidationSnafu;
use crate::fetch::RemoteSource;
use crate::fetch::name_from_url;
use crate::loader::LoadResult;
use crate::loader::PluginLoader;
use crate::loader::RetryConfig;
use crate::materializer::Materializer;
use crate::materializer::new_processed_dir;
use crate::materializer::sanitize_path_component;
use crate::processed_cache::ProcessedDirCache;
use crate::processed_cache::SnapshotEntry;
use crate::processed_cache::SweepReport;
use crate::processed_cache::fingerprint_dir;
use crate::progress::LifecyclePhase;
use crate::progress::ProgressObserver;
use crate::progress::ProgressReporter;
use crate::registrar::CapturedRegistration;
use crate::registrar::CommittingRegistrar;
use crate::registry::EffectRegistry;
use crate::resolver::read_manifest;
use crate::runtime::ModuleRuntime;
use crate::runtime::NodeRuntime;

/// Owner tag for registrations made by the engine bootstrap.
pub const ENGINE_OWNER: &str = "engine";

/// Where to install a plugin from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallSource {
    Local(PathBuf),
    Remote { url: String, git_ref: Option<String> },
}

/// Install parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub source: InstallSource,
    /// Overrides the name derived from the manifest, directory or URL.
    pub name: Option<String>,
}

impl InstallRequest {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self {
            source: InstallSource::Local(path.into()),
            name: None,
        }
    }

    pub fn remote(url: impl Into<String>, git_ref: Option<String>) -> Self {
        Self {
            source: InstallSource::Remote {
                url: url.into(),
                git_ref,
            },
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Result of install, reload, uninstall and engine bootstrap.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OperationResult {
    pub success: bool,
    pub name: String,
    pub effects: Vec<CapturedRegistration>,
    pub configs: Vec<CapturedRegistration>,
    pub processed_dir: Option<PathBuf>,
    pub error: Option<String>,
    /// Non-fatal problems from best-effort steps.
    pub warnings: Vec<String>,
}

impl OperationResult {
    fn failed(name: &str, error: &PluginError, warnings: Vec<String>) -> Self {
        Self {
            success: false,
            name: name.to_string(),
            error: Some(error.to_string()),
            warnings,
            ..Default::default()
        }
    }
}

/// A plugin that failed during bulk load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedPlugin {
    pub name: String,
    pub error: String,
}

/// Result of [`PluginLifecycle::load_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkLoadResult {
    pub loaded: Vec<String>,
    pub failed: Vec<FailedPlugin>,
}

/// Result of [`PluginLifecycle::cleanup_orphans`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed_dirs: Vec<PathBuf>,
    pub cache_sweep: SweepReport,
    pub warnings: Vec<String>,
}

/// What a failed install has to undo.
#[derive(Default)]
struct Rollback {
    store_entry: bool,
    fetched: Option<PathBuf>,
    source_links: Option<PathBuf>,
}

/// Output of the processing phase.
struct Prepared {
    processed_dir: PathBuf,
    fingerprint: Option<String>,
    reused: bool,
}

/// Coordinates the plugin pipeline.
pub struct PluginLifecycle {
    config: PluginPipelineConfig,
    store: PluginConfigStore,
    cache: tokio::sync::Mutex<ProcessedDirCache>,
    materializer: Materializer,
    loader: PluginLoader,
    registry: Arc<dyn EffectRegistry>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PluginLifecycle {
    pub fn new(
        config: PluginPipelineConfig,
        runtime: Arc<dyn ModuleRuntime>,
        registry: Arc<dyn EffectRegistry>,
    ) -> Self {
        Self {
            store: PluginConfigStore::new(config.store_path()),
            cache: tokio::sync::Mutex::new(ProcessedDirCache::load(&config.cache_path())),
            materializer: Materializer::from_config(&config),
            loader: PluginLoader::new(runtime, config.load_timeout),
            registry,
            locks: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Use the configured `node` binary as the module runtime.
    pub fn with_node_runtime(config: PluginPipelineConfig, registry: Arc<dyn EffectRegistry>) -> Self {
        let runtime = Arc::new(NodeRuntime::new(config.node_binary.clone()));
        Self::new(config, runtime, registry)
    }

    pub fn config(&self) -> &PluginPipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &PluginConfigStore {
        &self.store
    }

    pub fn registry(&self) -> &Arc<dyn EffectRegistry> {
        &self.registry
    }

    pub fn loader(&self) -> &PluginLoader {
        &self.loader
    }

    fn name_lock(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    // ---------------------------------------------------------------------
    // install
    // ---------------------------------------------------------------------

    /// Install a plugin and commit its registrations.
    ///
    /// If anything fails after the store entry was written, the entry is
    /// removed again, along with a fetched source and any packages linked
    /// into the source directory. Materialized output is left for the
    /// orphan sweep.
    pub async fn install(
        &self,
        request: InstallRequest,
        observer: Option<&dyn ProgressObserver>,
    ) -> OperationResult {
        let mut progress = ProgressReporter::new("install", observer);
        progress.enter(LifecyclePhase::Validating, "Validating plugin");

        let name = match self.install_name(&request) {
            Ok(name) => name,
            Err(e) => {
                progress.fail(e.to_string());
                return OperationResult::failed(&display_source(&request), &e, Vec::new());
            }
        };
        let _guard = self.name_lock(&name).lock_owned().await;

        let mut rollback = Rollback::default();
        match self
            .install_inner(&name, &request, &mut progress, &mut rollback)
            .await
        {
            Ok(result) => {
                progress.enter(LifecyclePhase::Complete, format!("Installed {name}"));
                info!(name = %name, effects = result.effects.len(), "Plugin installed");
                result
            }
            Err(e) => {
                progress.fail(e.to_string());
                let mut warnings = Vec::new();
                if rollback.store_entry {
                    match self.store.remove(&name) {
                        Ok(_) => debug!(name = %name, "Rolled back store entry"),
                        Err(re) => warnings.push(format!("rollback failed: {re}")),
                    }
                }
                if let Some(dir) = rollback.source_links {
                    let removed = self.materializer.unlink_source_dependencies(&dir);
                    debug!(name = %name, removed, "Rolled back source dependency links");
                }
                if let Some(dir) = rollback.fetched {
                    if let Err(re) = tokio::fs::remove_dir_all(&dir).await {
                        warnings.push(format!("failed to remove fetched source {}: {re}", dir.display()));
                    }
                }
                warn!(name = %name, error = %e, "Plugin install failed");
                OperationResult::failed(&name, &e, warnings)
            }
        }
    }

    fn install_name(&self, request: &InstallRequest) -> Result<String> {
        let name = match (&request.name, &request.source) {
            (Some(name), _) => name.clone(),
            (None, InstallSource::Local(path)) => name_from_dir(path),
            (None, InstallSource::Remote { url, .. }) => name_from_url(url),
        };
        if name.trim().is_empty() {
            return ValidationSnafu {
                path: PathBuf::from(display_source(request)),
                message: "cannot derive a plugin name".to_string(),
            }
            .fail();
        }
        if self.store.get(&name).is_some() {
            return AlreadyExistsSnafu { name }.fail();
        }
        Ok(name)
    }

    async fn install_inner(
        &self,
        name: &str,
        request: &InstallRequest,
        progress: &mut ProgressReporter<'_>,
        rollback: &mut Rollback,
    ) -> Result<OperationResult> {
        let descriptor = match &request.source {
            InstallSource::Local(path) => {
                let source = std::fs::canonicalize(path).context(IoSnafu { path: path.clone() })?;
                validate_plugin_dir(&source)?;
                PluginDescriptor::local(name, source)
            }
            InstallSource::Remote { url, git_ref } => {
                progress.enter(LifecyclePhase::Downloading, format!("Fetching {url}"));
                let target = self.config.plugins_dir().join(sanitize_path_component(name));
                if target.exists() {
                    return ValidationSnafu {
                        path: target,
                        message: "download target already exists".to_string(),
                    }
                    .fail();
                }
                RemoteSource::parse(url, git_ref.as_deref()).fetch(&target).await?;
                rollback.fetched = Some(target.clone());
                validate_plugin_dir(&target)?;
                let origin = PluginOrigin {
                    url: url.clone(),
                    git_ref: git_ref.clone(),
                };
                PluginDescriptor::remote(name, target, origin)
            }
        };

        progress.enter(LifecyclePhase::Configuring, "Recording plugin");
        let source = descriptor.source_path.clone();
        let kind = descriptor.kind;
        self.store.add(descriptor)?;
        rollback.store_entry = true;

        progress.enter(LifecyclePhase::Processing, "Materializing plugin");
        let prepared = self.prepare(name, &source, true).await?;
        if kind == PluginKind::Local {
            rollback.source_links = Some(source.clone());
            let report = self.materializer.link_source_dependencies(&source);
            debug!(name, linked = report.linked.len(), copied = report.copied.len(), "Linked source dependencies");
        }

        progress.enter(LifecyclePhase::Loading, "Loading plugin module");
        let loaded = self.loader.load(&prepared.processed_dir).await;
        let loaded = into_result(&prepared.processed_dir, loaded)?;

        progress.enter(LifecyclePhase::Registering, "Registering effects");
        self.commit(name, &loaded);

        progress.enter(LifecyclePhase::Caching, "Updating caches");
        let warnings = self.finish_caching(&source, &prepared).await;

        Ok(OperationResult {
            success: true,
            name: name.to_string(),
            effects: loaded.effects,
            configs: loaded.configs,
            processed_dir: Some(prepared.processed_dir),
            error: None,
            warnings,
        })
    }

    // ---------------------------------------------------------------------
    // bulk load
    // ---------------------------------------------------------------------

    /// Load every enabled plugin, one at a time, each bounded by the bulk
    /// load timeout. One plugin's failure never stops the others.
    pub async fn load_all(&self, observer: Option<&dyn ProgressObserver>) -> BulkLoadResult {
        let mut progress = ProgressReporter::new("load_all", observer);
        let plugins = self.store.enabled_plugins();
        let total = plugins.len();
        let mut result = BulkLoadResult::default();

        for (index, descriptor) in plugins.into_iter().enumerate() {
            progress.enter_at(
                LifecyclePhase::Loading,
                format!("Loading {} ({}/{total})", descriptor.name, index + 1),
                batch_percent(index, total),
            );
            let _guard = self.name_lock(&descriptor.name).lock_owned().await;
            match self.load_descriptor(&descriptor).await {
                Ok(_) => result.loaded.push(descriptor.name),
                Err(e) => {
                    warn!(name = %descriptor.name, error = %e, "Plugin failed during bulk load");
                    result.failed.push(FailedPlugin {
                        name: descriptor.name,
                        error: e.to_string(),
                    });
                }
            }
        }

        if let Err(e) = self.cache.lock().await.invalidate_registry_snapshot() {
            warn!(error = %e, "Failed to invalidate registry snapshot");
        }
        progress.enter(
            LifecyclePhase::Complete,
            format!("Loaded {}, failed {}", result.loaded.len(), result.failed.len()),
        );
        info!(loaded = result.loaded.len(), failed = result.failed.len(), "Bulk load finished");
        result
    }

    async fn load_descriptor(&self, descriptor: &PluginDescriptor) -> Result<LoadResult> {
        let prepared = self.prepare(&descriptor.name, &descriptor.source_path, true).await?;
        let loaded = self
            .loader
            .load_with_timeout(&prepared.processed_dir, self.config.bulk_load_timeout)
            .await;
        let loaded = into_result(&prepared.processed_dir, loaded)?;
        self.commit(&descriptor.name, &loaded);
        if !prepared.reused {
            if let Err(e) = self.cache.lock().await.put(
                &descriptor.source_path,
                &prepared.processed_dir,
                prepared.fingerprint.as_deref(),
            ) {
                warn!(name = %descriptor.name, error = %e, "Failed to cache processed dir");
            }
        }
        Ok(loaded)
    }

    // ---------------------------------------------------------------------
    // uninstall / reload
    // ---------------------------------------------------------------------

    /// Remove a plugin. Every cleanup step runs even if an earlier one
    /// failed; failures are reported as warnings.
    pub async fn uninstall(&self, name: &str, delete_source: bool) -> OperationResult {
        let _guard = self.name_lock(name).lock_owned().await;
        let Some(descriptor) = self.store.get(name) else {
            let e = NotFoundSnafu { name }.build();
            return OperationResult::failed(name, &e, Vec::new());
        };
        let mut warnings = Vec::new();

        let removed = self.registry.unregister_owner(name);
        debug!(name, removed, "Unregistered plugin effects");

        if descriptor.kind == PluginKind::Local {
            self.materializer.unlink_source_dependencies(&descriptor.source_path);
        }

        self.discard_processed(&descriptor.source_path, &mut warnings).await;

        let mut error = None;
        if let Err(e) = self.store.remove(name) {
            warnings.push(format!("store: {e}"));
            error = Some(e.to_string());
        }

        if delete_source && descriptor.source_path.exists() {
            if let Err(e) = tokio::fs::remove_dir_all(&descriptor.source_path).await {
                warnings.push(format!("delete {}: {e}", descriptor.source_path.display()));
            }
        }

        if let Err(e) = self.cache.lock().await.invalidate_registry_snapshot() {
            warnings.push(format!("snapshot: {e}"));
        }

        info!(name, warnings = warnings.len(), "Plugin uninstalled");
        OperationResult {
            success: error.is_none(),
            name: name.to_string(),
            error,
            warnings,
            ..Default::default()
        }
    }

    /// Re-materialize and re-load a configured plugin. The store entry is
    /// left as is.
    pub async fn reload(&self, name: &str, observer: Option<&dyn ProgressObserver>) -> OperationResult {
        let mut progress = ProgressReporter::new("reload", observer);
        let _guard = self.name_lock(name).lock_owned().await;

        progress.enter(LifecyclePhase::Validating, format!("Reloading {name}"));
        let Some(descriptor) = self.store.get(name) else {
            let e = NotFoundSnafu { name }.build();
            progress.fail(e.to_string());
            return OperationResult::failed(name, &e, Vec::new());
        };

        let mut warnings = Vec::new();
        let removed = self.registry.unregister_owner(name);
        debug!(name, removed, "Cleared previous registrations");
        // The stale dir stays on disk until the new one exists so the fresh
        // path can never coincide with it.
        let stale = match self.cache.lock().await.invalidate(&descriptor.source_path) {
            Ok(stale) => stale,
            Err(e) => {
                warnings.push(format!("cache: {e}"));
                None
            }
        };

        let outcome = self.reload_inner(name, &descriptor, &mut progress).await;
        if let Some(dir) = stale {
            remove_processed_dir(&dir, &mut warnings).await;
        }
        match outcome {
            Ok(mut result) => {
                warnings.append(&mut result.warnings);
                result.warnings = warnings;
                progress.enter(LifecyclePhase::Complete, format!("Reloaded {name}"));
                result
            }
            Err(e) => {
                progress.fail(e.to_string());
                warn!(name, error = %e, "Plugin reload failed");
                OperationResult::failed(name, &e, warnings)
            }
        }
    }

    async fn reload_inner(
        &self,
        name: &str,
        descriptor: &PluginDescriptor,
        progress: &mut ProgressReporter<'_>,
    ) -> Result<OperationResult> {
        validate_plugin_dir(&descriptor.source_path)?;

        progress.enter(LifecyclePhase::Processing, "Materializing plugin");
        let prepared = self.prepare(name, &descriptor.source_path, false).await?;

        progress.enter(LifecyclePhase::Loading, "Loading plugin module");
        let loaded = self.loader.load(&prepared.processed_dir).await;
        let loaded = into_result(&prepared.processed_dir, loaded)?;

        progress.enter(LifecyclePhase::Registering, "Registering effects");
        self.commit(name, &loaded);

        progress.enter(LifecyclePhase::Caching, "Updating caches");
        let warnings = self.finish_caching(&descriptor.source_path, &prepared).await;

        Ok(OperationResult {
            success: true,
            name: name.to_string(),
            effects: loaded.effects,
            configs: loaded.configs,
            processed_dir: Some(prepared.processed_dir),
            error: None,
            warnings,
        })
    }

    // ---------------------------------------------------------------------
    // cleanup / engine / toggle
    // ---------------------------------------------------------------------

    /// Delete processed directories older than the retention window that no
    /// configured plugin references, then sweep dead cache mappings.
    pub async fn cleanup_orphans(&self) -> CleanupReport {
        let mut report = CleanupReport::default();
        let mut cache = self.cache.lock().await;

        let referenced: HashSet<PathBuf> = self
            .store
            .plugins()
            .iter()
            .filter_map(|d| cache.mapping(&d.source_path))
            .map(|m| m.processed_dir.clone())
            .collect();

        let root = self.config.processed_root();
        let cutoff = SystemTime::now()
            .checked_sub(self.config.orphan_retention)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        match std::fs::read_dir(&root) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if !path.is_dir() || referenced.contains(&path) {
                        continue;
                    }
                    let modified = entry
                        .metadata()
                        .and_then(|m| m.modified())
                        .unwrap_or_else(|_| SystemTime::now());
                    if modified > cutoff {
                        continue;
                    }
                    match std::fs::remove_dir_all(&path) {
                        Ok(()) => {
                            debug!(dir = %path.display(), "Removed orphaned processed dir");
                            report.removed_dirs.push(path);
                        }
                        Err(e) => report.warnings.push(format!("{}: {e}", path.display())),
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => report.warnings.push(format!("{}: {e}", root.display())),
        }

        match cache.sweep_orphans() {
            Ok(sweep) => report.cache_sweep = sweep,
            Err(e) => report.warnings.push(e.to_string()),
        }
        info!(
            removed = report.removed_dirs.len(),
            mappings_removed = report.cache_sweep.removed,
            "Orphan cleanup finished"
        );
        report
    }

    /// Load the engine's own registration module and commit it under
    /// [`ENGINE_OWNER`], retrying while its modules are still initializing.
    pub async fn bootstrap_engine(&self) -> OperationResult {
        self.bootstrap_engine_with(&RetryConfig::default()).await
    }

    pub async fn bootstrap_engine_with(&self, retry: &RetryConfig) -> OperationResult {
        let package = self.config.engine_package.clone();
        let Some(resolved) = self.materializer.resolver().resolve(&package) else {
            let e = ResolutionSnafu { package }.build();
            return OperationResult::failed(ENGINE_OWNER, &e, Vec::new());
        };

        let entry = resolved.entry_point();
        let loaded = self.loader.load_with_retry(&entry, retry).await;
        let loaded = match into_result(&entry, loaded) {
            Ok(loaded) => loaded,
            Err(e) => return OperationResult::failed(ENGINE_OWNER, &e, Vec::new()),
        };

        self.commit(ENGINE_OWNER, &loaded);
        let mut warnings = Vec::new();
        if let Err(e) = self.cache.lock().await.invalidate_registry_snapshot() {
            warnings.push(format!("snapshot: {e}"));
        }
        info!(package = %resolved.name, effects = loaded.effects.len(), "Engine registered");
        OperationResult {
            success: true,
            name: ENGINE_OWNER.to_string(),
            effects: loaded.effects,
            configs: loaded.configs,
            processed_dir: None,
            error: None,
            warnings,
        }
    }

    /// Flip a plugin's enabled flag, returning the new value.
    pub async fn toggle(&self, name: &str) -> Result<bool> {
        let _guard = self.name_lock(name).lock_owned().await;
        self.store.toggle(name)
    }

    /// Committed effects, from the persisted snapshot when still valid.
    pub async fn registry_snapshot(&self) -> Vec<SnapshotEntry> {
        let mut cache = self.cache.lock().await;
        if let Some(snapshot) = cache.registry_snapshot() {
            return snapshot.effects.clone();
        }
        let effects: Vec<SnapshotEntry> = self
            .registry
            .effects()
            .into_iter()
            .map(|e| SnapshotEntry {
                name: e.name,
                category: e.category,
                owner: e.owner,
            })
            .collect();
        if let Err(e) = cache.store_registry_snapshot(effects.clone()) {
            warn!(error = %e, "Failed to persist registry snapshot");
        }
        effects
    }

    // ---------------------------------------------------------------------
    // shared steps
    // ---------------------------------------------------------------------

    /// Reuse a cached processed dir when allowed and still valid, otherwise
    /// materialize into a fresh one.
    async fn prepare(&self, name: &str, source: &Path, use_cache: bool) -> Result<Prepared> {
        let fingerprint = {
            let source = source.to_path_buf();
            match tokio::task::spawn_blocking(move || fingerprint_dir(&source)).await {
                Ok(Ok(fp)) => Some(fp),
                Ok(Err(e)) => {
                    warn!(name, error = %e, "Failed to fingerprint plugin source");
                    None
                }
                Err(e) => {
                    warn!(name, error = %e, "Fingerprint task failed");
                    None
                }
            }
        };

        if use_cache {
            if let Some(dir) = self.cache.lock().await.get(source, fingerprint.as_deref()) {
                debug!(name, dir = %dir.display(), "Reusing processed dir");
                return Ok(Prepared {
                    processed_dir: dir,
                    fingerprint,
                    reused: true,
                });
            }
        }

        let dest = new_processed_dir(&self.config.processed_root(), name);
        let materializer = self.materializer.clone();
        let (task_source, task_dest) = (source.to_path_buf(), dest.clone());
        let report = tokio::task::spawn_blocking(move || {
            let report = materializer.materialize(&task_source, &task_dest)?;
            materializer.link_dependencies(&task_dest);
            Ok::<_, PluginError>(report)
        })
        .await
        .map_err(|e| {
            MaterializationSnafu {
                path: dest.clone(),
                message: format!("materialization task failed: {e}"),
            }
            .build()
        })??;
        if !report.failures.is_empty() {
            warn!(name, failed = report.failures.len(), "Some plugin files were skipped");
        }

        Ok(Prepared {
            processed_dir: dest,
            fingerprint,
            reused: false,
        })
    }

    /// Replace `owner`'s registrations with the captured ones and link
    /// configs.
    fn commit(&self, owner: &str, loaded: &LoadResult) {
        self.registry.unregister_owner(owner);
        let mut committing = CommittingRegistrar::new(self.registry.clone(), owner);
        loaded.capture().replay_into(&mut committing);
        let linked = self.registry.link_configs();
        debug!(owner, committed = committing.committed(), linked, "Committed registrations");
    }

    async fn finish_caching(&self, source: &Path, prepared: &Prepared) -> Vec<String> {
        let mut warnings = Vec::new();
        let mut cache = self.cache.lock().await;
        if !prepared.reused {
            if let Err(e) = cache.put(source, &prepared.processed_dir, prepared.fingerprint.as_deref()) {
                warnings.push(format!("cache: {e}"));
            }
        }
        if let Err(e) = cache.invalidate_registry_snapshot() {
            warnings.push(format!("snapshot: {e}"));
        }
        for w in &warnings {
            warn!(warning = %w, "Cache update degraded");
        }
        warnings
    }

    async fn discard_processed(&self, source: &Path, warnings: &mut Vec<String>) {
        let invalidated = self.cache.lock().await.invalidate(source);
        match invalidated {
            Ok(Some(dir)) => remove_processed_dir(&dir, warnings).await,
            Ok(None) => {}
            Err(e) => warnings.push(format!("cache: {e}")),
        }
    }
}

/// Spread bulk load progress from the loading phase up to completion.
fn batch_percent(index: usize, total: usize) -> u8 {
    let start = usize::from(LifecyclePhase::Loading.percent());
    let end = usize::from(LifecyclePhase::Complete.percent());
    let percent = start + (end - start) * index / total.max(1);
    u8::try_from(percent).unwrap_or(LifecyclePhase::Complete.percent())
}

async fn remove_processed_dir(dir: &Path, warnings: &mut Vec<String>) {
    if !dir.exists() {
        return;
    }
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        warnings.push(format!("remove {}: {e}", dir.display()));
    }
}

fn into_result(entry: &Path, loaded: LoadResult) -> Result<LoadResult> {
    if loaded.success {
        return Ok(loaded);
    }
    LoadSnafu {
        entry: entry.to_path_buf(),
        message: loaded.error.unwrap_or_else(|| "unknown load failure".to_string()),
    }
    .fail()
}

fn validate_plugin_dir(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        return ValidationSnafu {
            path: dir.to_path_buf(),
            message: "plugin source must be a directory".to_string(),
        }
        .fail();
    }
    resolve_entry(dir).map(|_| ())
}

/// Manifest `name`, else the directory name.
fn name_from_dir(path: &Path) -> String {
    read_manifest(path)
        .and_then(|m| m.get("name").and_then(|n| n.as_str()).map(String::from))
        .filter(|n| !n.is_empty())
        .or_else(|| path.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_default()
}

fn display_source(request: &InstallRequest) -> String {
    match &request.source {
        InstallSource::Local(path) => path.display().to_string(),
        InstallSource::Remote { url, .. } => url.clone(),
    }
}

#[cfg(test)]
#[path = "lifecycle.test.rs"]
mod tests;
