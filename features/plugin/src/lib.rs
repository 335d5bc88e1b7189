//! Plugin loading and registration for lumen.
//!
//! Plugins are directories of ES modules that register effects against the
//! engine package. Loading one runs through a fixed pipeline:
//!
//! 1. **Resolve** shared packages across storage roots ([`resolver`])
//! 2. **Materialize** a processed copy with bare specifiers and relative
//!    imports rewritten to absolute `file://` URLs ([`materializer`],
//!    [`rewriter`])
//! 3. **Load** the entry module once, capturing its registrations
//!    ([`entry`], [`runtime`], [`loader`])
//! 4. **Commit** captured registrations into the effect registry
//!    ([`registrar`], [`registry`])
//!
//! [`PluginLifecycle`] drives the pipeline for install, bulk load,
//! uninstall, reload and orphan cleanup, keeping descriptors in a
//! [`PluginConfigStore`] and processed output in a [`ProcessedDirCache`].
//!
//! # Processed directory layout
//!
//! ```text
//! <data_dir>/processed/<plugin>-<millis>/
//!   index.mjs              # rewritten entry
//!   lib/util.mjs
//!   node_modules/
//!     @lumen/effects -> <storage root>/node_modules/@lumen/effects
//! ```

pub mod config_store;
pub mod entry;
pub mod fetch;
pub mod lifecycle;
pub mod loader;
pub mod materializer;
pub mod processed_cache;
pub mod progress;
pub mod registrar;
pub mod registry;
pub mod resolver;
pub mod rewriter;
pub mod runtime;

mod error;

#[cfg(test)]
mod testing;

pub use config_store::PluginConfigStore;
pub use config_store::PluginDescriptor;
pub use config_store::PluginKind;
pub use config_store::PluginOrigin;
pub use entry::resolve_entry;
pub use error::PluginError;
pub use error::Result;
pub use fetch::RemoteSource;
pub use lifecycle::BulkLoadResult;
pub use lifecycle::CleanupReport;
pub use lifecycle::ENGINE_OWNER;
pub use lifecycle::FailedPlugin;
pub use lifecycle::InstallRequest;
pub use lifecycle::InstallSource;
pub use lifecycle::OperationResult;
pub use lifecycle::PluginLifecycle;
pub use loader::LoadResult;
pub use loader::PluginLoader;
pub use loader::RetryConfig;
pub use materializer::Materializer;
pub use processed_cache::ProcessedDirCache;
pub use progress::LifecyclePhase;
pub use progress::ProgressObserver;
pub use progress::ProgressReport;
pub use registrar::CapturedRegistration;
pub use registrar::CapturingRegistrar;
pub use registrar::CommittingRegistrar;
pub use registrar::Registrar;
pub use registry::EffectRegistry;
pub use registry::InMemoryEffectRegistry;
pub use registry::RegisteredEntry;
pub use resolver::DependencyResolver;
pub use resolver::ResolvedPackage;
pub use rewriter::ImportRewriter;
pub use runtime::ModuleRuntime;
pub use runtime::NodeRuntime;
