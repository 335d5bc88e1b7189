//! Module loading with an import-once cache.
//!
//! Each resolved module location is imported at most once per loader: the
//! registration entry point is never run twice for the same location, since
//! that would register effects twice. A changed plugin must be materialized
//! to a new location to be imported again.
//!
//! Loads are bounded by a timeout. A timed-out import keeps running in the
//! background and still fills the cache if it finishes.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::entry::resolve_entry;
use crate::error::PluginError;
use crate::error::Result;
use crate::error::plugin_error::LoadSnafu;
use crate::error::plugin_error::TimeoutSnafu;
use crate::registrar::CapturedRegistration;
use crate::registrar::CapturingRegistrar;
use crate::registrar::ClassRef;
use crate::registrar::Registrar;
use crate::runtime::ModuleRuntime;
use crate::runtime::RegistrationCall;

/// Outcome of a load, as reported to callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadResult {
    pub success: bool,
    /// Canonical location of the imported module, once resolved.
    pub entry: Option<PathBuf>,
    pub effects: Vec<CapturedRegistration>,
    pub configs: Vec<CapturedRegistration>,
    pub positions: Vec<CapturedRegistration>,
    pub error: Option<String>,
}

impl LoadResult {
    fn loaded(module: &LoadedModule) -> Self {
        Self {
            success: true,
            entry: Some(module.location.clone()),
            effects: module.capture.effects.clone(),
            configs: module.capture.configs.clone(),
            positions: module.capture.positions.clone(),
            error: None,
        }
    }

    fn failed(error: &PluginError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Default::default()
        }
    }

    /// The captured registrations, ready to replay.
    pub fn capture(&self) -> CapturingRegistrar {
        CapturingRegistrar {
            effects: self.effects.clone(),
            configs: self.configs.clone(),
            positions: self.positions.clone(),
        }
    }
}

/// A successfully imported module.
#[derive(Debug, Clone)]
pub struct LoadedModule {
    pub location: PathBuf,
    pub capture: Arc<CapturingRegistrar>,
}

/// Retry settings for loads that hit a module mid-initialization.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (1 = no retry).
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Delay before attempt `attempt + 1`, for `attempt >= 1`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as i32;
        let millis = self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(millis as u64).min(self.max_backoff)
    }
}

type ImportCell = Arc<OnceCell<Arc<CapturingRegistrar>>>;

/// Imports plugin modules through a [`ModuleRuntime`].
pub struct PluginLoader {
    runtime: Arc<dyn ModuleRuntime>,
    timeout: Duration,
    imported: Mutex<HashMap<PathBuf, ImportCell>>,
}

impl PluginLoader {
    pub fn new(runtime: Arc<dyn ModuleRuntime>, timeout: Duration) -> Self {
        Self {
            runtime,
            timeout,
            imported: Mutex::new(HashMap::new()),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether `location` has already been imported successfully.
    pub fn is_imported(&self, location: &Path) -> bool {
        let location = canonical(location);
        self.imported
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&location)
            .is_some_and(|cell| cell.initialized())
    }

    /// Load with the default timeout. Never fails; errors are reported in
    /// the result.
    pub async fn load(&self, path: &Path) -> LoadResult {
        self.load_with_timeout(path, self.timeout).await
    }

    pub async fn load_with_timeout(&self, path: &Path, timeout: Duration) -> LoadResult {
        match self.try_load(path, timeout).await {
            Ok(module) => LoadResult::loaded(&module),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Plugin load failed");
                LoadResult::failed(&e)
            }
        }
    }

    /// Load, retrying only while the failure says a module was read during
    /// its own initialization.
    pub async fn load_with_retry(&self, path: &Path, retry: &RetryConfig) -> LoadResult {
        let attempts = retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.try_load(path, self.timeout).await {
                Ok(module) => return LoadResult::loaded(&module),
                Err(e) if e.is_circular_initialization() && attempt < attempts => {
                    let delay = retry.backoff_for(attempt);
                    warn!(
                        path = %path.display(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Module still initializing, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), attempt, error = %e, "Plugin load failed");
                    return LoadResult::failed(&e);
                }
            }
        }
    }

    /// Resolve, import once, and capture registrations.
    pub async fn try_load(&self, path: &Path, timeout: Duration) -> Result<LoadedModule> {
        let location = canonical(&resolve_entry(path)?);
        let cell = self.cell_for(&location);

        if let Some(capture) = cell.get() {
            debug!(entry = %location.display(), "Module already imported, reusing capture");
            return Ok(LoadedModule {
                location,
                capture: capture.clone(),
            });
        }

        let runtime = self.runtime.clone();
        let task_location = location.clone();
        let task = tokio::spawn(async move {
            cell.get_or_try_init(|| async {
                let calls = runtime.import_and_register(&task_location).await?;
                Ok::<_, PluginError>(Arc::new(capture_calls(&task_location, calls)))
            })
            .await
            .cloned()
        });

        let capture = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_err)) => {
                return LoadSnafu {
                    entry: location,
                    message: format!("plugin task aborted: {join_err}"),
                }
                .fail();
            }
            Err(_) => {
                return TimeoutSnafu {
                    entry: location,
                    timeout_ms: timeout.as_millis(),
                }
                .fail();
            }
        };

        info!(
            entry = %location.display(),
            effects = capture.effects.len(),
            configs = capture.configs.len(),
            "Plugin module loaded"
        );
        Ok(LoadedModule { location, capture })
    }

    fn cell_for(&self, location: &Path) -> ImportCell {
        self.imported
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(location.to_path_buf())
            .or_default()
            .clone()
    }
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn capture_calls(location: &Path, calls: Vec<RegistrationCall>) -> CapturingRegistrar {
    let mut capture = CapturingRegistrar::new();
    for call in calls {
        capture.register(
            call.kind,
            CapturedRegistration {
                name: call.name,
                category: call.category,
                metadata: call.metadata,
                class_ref: ClassRef {
                    module: location.to_path_buf(),
                    class_name: call.class_name,
                },
            },
        );
    }
    capture
}

#[cfg(test)]
#[path = "loader.test.rs"]
mod tests;
