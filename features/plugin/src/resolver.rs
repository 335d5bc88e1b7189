//! Shared package resolution across storage roots.
//!
//! A package may exist in up to four places depending on how the host is
//! running. Probe order is fixed:
//!
//! 1. `<working_dir>/node_modules/<pkg>`
//! 2. `<app_root>/node_modules/<pkg>`
//! 3. `<unpacked>/node_modules/<pkg>` (archive sibling with native code)
//! 4. `<archive>/node_modules/<pkg>` (read-only)

use std::path::Path;
use std::path::PathBuf;

use lumen_config::StorageRoots;
use serde_json::Value;
use tracing::debug;
use tracing::trace;

/// Directory holding installed packages.
pub const NODE_MODULES: &str = "node_modules";

/// Package manifest file name.
pub const PACKAGE_MANIFEST: &str = "package.json";

/// A package located on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    pub name: String,
    /// Canonical package root.
    pub root: PathBuf,
    /// Root lies in immutable storage: cannot be symlinked into, must be
    /// copied, and must not be referenced by absolute URL.
    pub read_only: bool,
}

impl ResolvedPackage {
    /// File the bare specifier resolves to.
    ///
    /// Checks `exports` (string, `"."`, then `import`/`default`/`require`
    /// conditions), then `module`, then `main`, then `index.js`.
    pub fn entry_point(&self) -> PathBuf {
        let relative = read_manifest(&self.root)
            .and_then(|manifest| manifest_entry(&manifest))
            .unwrap_or_else(|| "index.js".to_string());
        self.root.join(relative.trim_start_matches("./"))
    }

    /// Names listed under `dependencies` in the package manifest.
    pub fn dependency_names(&self) -> Vec<String> {
        read_manifest(&self.root)
            .and_then(|manifest| {
                manifest
                    .get("dependencies")
                    .and_then(Value::as_object)
                    .map(|deps| deps.keys().cloned().collect())
            })
            .unwrap_or_default()
    }
}

/// Locates shared packages in the configured storage roots.
#[derive(Debug, Clone)]
pub struct DependencyResolver {
    roots: StorageRoots,
    read_only_roots: Vec<PathBuf>,
}

impl DependencyResolver {
    pub fn new(roots: StorageRoots) -> Self {
        let read_only_roots = roots
            .read_only_roots()
            .into_iter()
            .flat_map(|root| {
                let canonical = std::fs::canonicalize(&root).ok();
                std::iter::once(root).chain(canonical)
            })
            .collect();
        Self {
            roots,
            read_only_roots,
        }
    }

    pub fn roots(&self) -> &StorageRoots {
        &self.roots
    }

    /// Candidate package directories in probe order.
    pub fn candidates(&self, package: &str) -> Vec<PathBuf> {
        let mut bases = vec![self.roots.working_dir.clone()];
        bases.extend(self.roots.app_root.clone());
        bases.extend(self.roots.unpacked_dir());
        bases.extend(self.roots.archive.clone());

        bases
            .into_iter()
            .map(|base| package_dir(&base.join(NODE_MODULES), package))
            .collect()
    }

    /// First existing candidate, resolved through symlinks.
    ///
    /// Returns `None` when the package exists nowhere; callers continue
    /// without rewriting references to it.
    pub fn resolve(&self, package: &str) -> Option<ResolvedPackage> {
        if !is_valid_package_name(package) {
            debug!(package, "Refusing to resolve malformed package name");
            return None;
        }

        for candidate in self.candidates(package) {
            trace!(package, candidate = %candidate.display(), "Probing");
            if !candidate.exists() {
                continue;
            }
            let root = std::fs::canonicalize(&candidate).unwrap_or(candidate);
            let read_only = self.is_read_only(&root);
            debug!(package, root = %root.display(), read_only, "Resolved package");
            return Some(ResolvedPackage {
                name: package.to_string(),
                root,
                read_only,
            });
        }

        debug!(package, "Package not found in any storage root");
        None
    }

    /// Whether `path` lives in immutable storage.
    pub fn is_read_only(&self, path: &Path) -> bool {
        self.read_only_roots.iter().any(|root| path.starts_with(root))
    }
}

/// Join a possibly scoped package name (`@scope/name`) onto `node_modules`.
pub fn package_dir(node_modules: &Path, package: &str) -> PathBuf {
    package
        .split('/')
        .fold(node_modules.to_path_buf(), |dir, part| dir.join(part))
}

fn is_valid_package_name(package: &str) -> bool {
    if package.is_empty() || package.starts_with('.') || package.starts_with('/') {
        return false;
    }
    let parts: Vec<&str> = package.split('/').collect();
    match parts.as_slice() {
        [name] => !name.is_empty() && *name != "..",
        [scope, name] => scope.starts_with('@') && scope.len() > 1 && !name.is_empty() && *name != "..",
        _ => false,
    }
}

pub(crate) fn read_manifest(dir: &Path) -> Option<Value> {
    let content = std::fs::read_to_string(dir.join(PACKAGE_MANIFEST)).ok()?;
    serde_json::from_str(&content).ok()
}

fn manifest_entry(manifest: &Value) -> Option<String> {
    if let Some(exports) = manifest.get("exports") {
        if let Some(entry) = exports_entry(exports) {
            return Some(entry);
        }
    }
    ["module", "main"]
        .iter()
        .find_map(|key| manifest.get(*key).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn exports_entry(exports: &Value) -> Option<String> {
    match exports {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => {
            if let Some(dot) = map.get(".") {
                return exports_entry(dot);
            }
            ["import", "default", "require", "node"]
                .iter()
                .find_map(|cond| map.get(*cond).and_then(exports_entry))
        }
        _ => None,
    }
}

#[cfg(test)]
#[path = "resolver.test.rs"]
mod tests;
