//! Mirrors a plugin source tree into a self-contained processed directory.
//!
//! Module files are rewritten and renamed to `.mjs`; everything else is
//! copied verbatim. The processed directory then receives a `node_modules`
//! holding every shared package the host provides, linked when the package
//! is writable and copied when it lives in read-only storage.

use std::collections::HashSet;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use lumen_config::PluginPipelineConfig;
use snafu::ResultExt;
use tracing::debug;
use tracing::info;
use tracing::warn;
use walkdir::WalkDir;

use crate::error::Result;
use crate::error::plugin_error::IoSnafu;
use crate::error::plugin_error::ValidationSnafu;
use crate::resolver::DependencyResolver;
use crate::resolver::NODE_MODULES;
use crate::resolver::ResolvedPackage;
use crate::resolver::package_dir;
use crate::rewriter::ImportRewriter;
use crate::rewriter::PROCESSED_MODULE_EXT;
use crate::rewriter::RelativeAnchor;
use crate::rewriter::has_module_extension;

/// Directories never mirrored: VCS metadata, build output and dependency trees.
pub const SKIPPED_DIRS: &[&str] = &[".git", ".hg", ".svn", "node_modules", "target", ".cache"];

/// Lists the packages copied (not linked) into a plugin's own
/// `node_modules`, so they can be removed again.
pub const COPIED_PACKAGES_MARKER: &str = ".lumen-copied.json";

/// A file that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Outcome of [`Materializer::materialize`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializeReport {
    /// Module files rewritten into the output.
    pub rewritten: usize,
    /// Non-module files copied verbatim.
    pub copied: usize,
    pub failures: Vec<FileFailure>,
}

/// Outcome of assembling a `node_modules` directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkReport {
    pub linked: Vec<String>,
    pub copied: Vec<String>,
    /// Already present at the destination.
    pub existing: Vec<String>,
    /// Not found in any storage root.
    pub missing: Vec<String>,
    pub failures: Vec<FileFailure>,
}

/// Produces processed plugin directories.
#[derive(Debug, Clone)]
pub struct Materializer {
    resolver: DependencyResolver,
    rewriter: ImportRewriter,
    shared_packages: Vec<String>,
}

impl Materializer {
    /// `shared_packages` must include the engine package; it is linked like
    /// any other but never rewritten.
    pub fn new(
        resolver: DependencyResolver,
        engine_package: impl Into<String>,
        shared_packages: Vec<String>,
    ) -> Self {
        Self {
            resolver,
            rewriter: ImportRewriter::new(engine_package),
            shared_packages,
        }
    }

    pub fn from_config(config: &PluginPipelineConfig) -> Self {
        Self::new(
            DependencyResolver::new(config.roots.clone()),
            config.engine_package.clone(),
            config.all_shared_packages(),
        )
    }

    pub fn resolver(&self) -> &DependencyResolver {
        &self.resolver
    }

    pub fn rewriter(&self) -> &ImportRewriter {
        &self.rewriter
    }

    /// Shared packages plus the engine's own runtime dependencies, in order
    /// and without duplicates.
    pub fn required_packages(&self) -> Vec<String> {
        let mut packages = self.shared_packages.clone();
        if let Some(engine) = self.resolver.resolve(self.rewriter.engine_package()) {
            packages.extend(engine.dependency_names());
        }
        let mut seen = std::collections::HashSet::new();
        packages.retain(|p| seen.insert(p.clone()));
        packages
    }

    fn resolved_shared(&self) -> Vec<(String, Option<ResolvedPackage>)> {
        self.shared_packages
            .iter()
            .map(|name| (name.clone(), self.resolver.resolve(name)))
            .collect()
    }

    /// Mirror `source_dir` into `dest_dir`.
    ///
    /// Only a missing source or an uncreatable destination is an error;
    /// individual file failures are logged and listed in the report.
    pub fn materialize(&self, source_dir: &Path, dest_dir: &Path) -> Result<MaterializeReport> {
        if !source_dir.is_dir() {
            return ValidationSnafu {
                path: source_dir.to_path_buf(),
                message: "plugin source is not a directory".to_string(),
            }
            .fail();
        }
        std::fs::create_dir_all(dest_dir).context(IoSnafu {
            path: dest_dir.to_path_buf(),
        })?;

        let packages = self.resolved_shared();
        let mut report = MaterializeReport::default();
        let mut written_modules = HashSet::new();
        let walker = WalkDir::new(source_dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || !is_skipped_dir(&entry.file_name().to_string_lossy())
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                    record_failure(&mut report.failures, path, e.to_string());
                    continue;
                }
            };
            let Ok(relative) = entry.path().strip_prefix(source_dir) else {
                continue;
            };
            let target = dest_dir.join(relative);

            if entry.file_type().is_dir() {
                if let Err(e) = std::fs::create_dir_all(&target) {
                    record_failure(&mut report.failures, target, e.to_string());
                }
                continue;
            }

            if has_module_extension(entry.path()) {
                let output = target.with_extension(PROCESSED_MODULE_EXT);
                if !written_modules.insert(output.clone()) {
                    let message = format!("output {} already written by another module", output.display());
                    record_failure(&mut report.failures, entry.path().to_path_buf(), message);
                    continue;
                }
                let anchor = RelativeAnchor {
                    target_dir: target.parent().unwrap_or(dest_dir).to_path_buf(),
                    source_dir: entry.path().parent().unwrap_or(source_dir).to_path_buf(),
                    normalize_extensions: true,
                };
                match self.rewrite_module_file(entry.path(), &output, &packages, &anchor) {
                    Ok(()) => report.rewritten += 1,
                    Err(e) => record_failure(&mut report.failures, entry.path().to_path_buf(), e.to_string()),
                }
            } else {
                match std::fs::copy(entry.path(), &target) {
                    Ok(_) => report.copied += 1,
                    Err(e) => record_failure(&mut report.failures, entry.path().to_path_buf(), e.to_string()),
                }
            }
        }

        info!(
            source = %source_dir.display(),
            dest = %dest_dir.display(),
            rewritten = report.rewritten,
            copied = report.copied,
            failed = report.failures.len(),
            "Materialized plugin"
        );
        Ok(report)
    }

    fn rewrite_module_file(
        &self,
        source: &Path,
        output: &Path,
        packages: &[(String, Option<ResolvedPackage>)],
        anchor: &RelativeAnchor,
    ) -> io::Result<()> {
        let text = std::fs::read_to_string(source)?;
        let rewritten = self.rewriter.rewrite_module(&text, packages, anchor);
        std::fs::write(output, rewritten)
    }

    /// Populate `<dest_dir>/node_modules` with every required package.
    pub fn link_dependencies(&self, dest_dir: &Path) -> LinkReport {
        let node_modules = dest_dir.join(NODE_MODULES);
        let mut report = LinkReport::default();

        for package in self.required_packages() {
            let target = package_dir(&node_modules, &package);
            if std::fs::symlink_metadata(&target).is_ok() {
                report.existing.push(package);
                continue;
            }
            let Some(resolved) = self.resolver.resolve(&package) else {
                debug!(package = %package, "Shared package unavailable, not linked");
                report.missing.push(package);
                continue;
            };
            if let Some(parent) = target.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    record_failure(&mut report.failures, parent.to_path_buf(), e.to_string());
                    continue;
                }
            }

            if resolved.read_only {
                match copy_dir_recursive(&resolved.root, &target) {
                    Ok(()) => report.copied.push(package),
                    Err(e) => record_failure(&mut report.failures, target, e.to_string()),
                }
            } else {
                match symlink_dir(&resolved.root, &target) {
                    Ok(()) => report.linked.push(package),
                    Err(e) => record_failure(&mut report.failures, target, e.to_string()),
                }
            }
        }

        debug!(
            dir = %node_modules.display(),
            linked = report.linked.len(),
            copied = report.copied.len(),
            missing = report.missing.len(),
            "Prepared dependency directory"
        );
        report
    }

    /// Same as [`Self::link_dependencies`] but inside the original plugin
    /// directory, so it can resolve shared packages without materializing.
    ///
    /// Copied packages are recorded in [`COPIED_PACKAGES_MARKER`] for
    /// [`Self::unlink_source_dependencies`].
    pub fn link_source_dependencies(&self, plugin_dir: &Path) -> LinkReport {
        let mut report = self.link_dependencies(plugin_dir);
        if report.copied.is_empty() {
            return report;
        }
        let marker = plugin_dir.join(NODE_MODULES).join(COPIED_PACKAGES_MARKER);
        let mut copied = read_copied_marker(&marker);
        copied.extend(report.copied.iter().cloned());
        let mut seen = HashSet::new();
        copied.retain(|p| seen.insert(p.clone()));
        if let Err(e) = write_copied_marker(&marker, &copied) {
            record_failure(&mut report.failures, marker, e.to_string());
        }
        report
    }

    /// Remove what [`Self::link_source_dependencies`] added: package
    /// symlinks and the packages listed in the copy marker.
    ///
    /// Other real directories are left alone. Returns the number removed.
    pub fn unlink_source_dependencies(&self, plugin_dir: &Path) -> usize {
        let node_modules = plugin_dir.join(NODE_MODULES);
        let marker = node_modules.join(COPIED_PACKAGES_MARKER);
        let copied: HashSet<String> = read_copied_marker(&marker).into_iter().collect();
        let mut packages = self.required_packages();
        for package in &copied {
            if !packages.contains(package) {
                packages.push(package.clone());
            }
        }

        let mut removed = 0;
        for package in packages {
            let target = package_dir(&node_modules, &package);
            let Ok(meta) = std::fs::symlink_metadata(&target) else {
                continue;
            };
            let outcome = if meta.file_type().is_symlink() {
                remove_symlink(&target)
            } else if meta.is_dir() && copied.contains(&package) {
                std::fs::remove_dir_all(&target)
            } else {
                continue;
            };
            match outcome {
                Ok(()) => {
                    removed += 1;
                    if let Some(parent) = target.parent() {
                        if parent != node_modules && is_dir_empty(parent) {
                            let _ = std::fs::remove_dir(parent);
                        }
                    }
                }
                Err(e) => warn!(path = %target.display(), error = %e, "Failed to remove dependency"),
            }
        }
        if marker.exists() {
            if let Err(e) = std::fs::remove_file(&marker) {
                warn!(path = %marker.display(), error = %e, "Failed to remove copy marker");
            }
        }
        if removed > 0 && is_dir_empty(&node_modules) {
            let _ = std::fs::remove_dir(&node_modules);
        }
        removed
    }
}

fn read_copied_marker(marker: &Path) -> Vec<String> {
    let Ok(text) = std::fs::read_to_string(marker) else {
        return Vec::new();
    };
    serde_json::from_str(&text).unwrap_or_else(|e| {
        warn!(path = %marker.display(), error = %e, "Ignoring unreadable copy marker");
        Vec::new()
    })
}

fn write_copied_marker(marker: &Path, packages: &[String]) -> io::Result<()> {
    let json = serde_json::to_string_pretty(packages).map_err(io::Error::other)?;
    std::fs::write(marker, json)
}

/// Allocate a fresh `<root>/<name>-<millis>` directory path.
///
/// The path is unique at call time; it is not created.
pub fn new_processed_dir(root: &Path, plugin_name: &str) -> PathBuf {
    let base = format!(
        "{}-{}",
        sanitize_path_component(plugin_name),
        chrono::Utc::now().timestamp_millis()
    );
    let mut candidate = root.join(&base);
    let mut n = 1;
    while candidate.exists() {
        candidate = root.join(format!("{base}-{n}"));
        n += 1;
    }
    candidate
}

/// Replace non-`[a-zA-Z0-9.\-_]` characters with `-`.
pub fn sanitize_path_component(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

pub fn is_skipped_dir(name: &str) -> bool {
    SKIPPED_DIRS.contains(&name)
}

fn record_failure(failures: &mut Vec<FileFailure>, path: PathBuf, message: String) {
    warn!(path = %path.display(), error = %message, "Skipping file during materialization");
    failures.push(FileFailure { path, message });
}

pub(crate) fn copy_dir_recursive(src: &Path, dst: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        if std::fs::metadata(&src_path)?.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

fn is_dir_empty(path: &Path) -> bool {
    path.read_dir()
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

#[cfg(unix)]
fn symlink_dir(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

#[cfg(windows)]
fn symlink_dir(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(src, dst)
}

#[cfg(unix)]
fn remove_symlink(path: &Path) -> io::Result<()> {
    std::fs::remove_file(path)
}

#[cfg(windows)]
fn remove_symlink(path: &Path) -> io::Result<()> {
    std::fs::remove_dir(path)
}

#[cfg(test)]
#[path = "materializer.test.rs"]
mod tests;
