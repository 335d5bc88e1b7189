//! Entry module resolution for plugin directories.

use std::path::Path;
use std::path::PathBuf;

use serde_json::Value;
use tracing::trace;

use crate::error::Result;
use crate::error::plugin_error::ValidationSnafu;
use crate::resolver::read_manifest;
use crate::rewriter::MODULE_EXTENSIONS;
use crate::rewriter::PROCESSED_MODULE_EXT;
use crate::rewriter::has_module_extension;

/// Basenames tried when the manifest declares no entry.
pub const FALLBACK_ENTRY_NAMES: &[&str] = &["plugin", "index", "main"];

/// Find the module to import for `path`.
///
/// A file is used as-is unless a processed `.mjs` twin sits next to it. For
/// a directory, the manifest's `module` then `main` is used, falling back to
/// [`FALLBACK_ENTRY_NAMES`]. The processed extension is always tried first.
pub fn resolve_entry(path: &Path) -> Result<PathBuf> {
    if path.is_file() {
        return Ok(prefer_processed(path).unwrap_or_else(|| path.to_path_buf()));
    }
    if !path.is_dir() {
        return ValidationSnafu {
            path: path.to_path_buf(),
            message: "plugin path does not exist".to_string(),
        }
        .fail();
    }

    let declared = read_manifest(path)
        .map(|manifest| declared_entries(&manifest))
        .unwrap_or_default();
    for relative in &declared {
        if let Some(found) = probe(&path.join(relative.trim_start_matches("./"))) {
            trace!(entry = %found.display(), "Resolved declared entry");
            return Ok(found);
        }
    }

    for name in FALLBACK_ENTRY_NAMES {
        if let Some(found) = probe(&path.join(name)) {
            trace!(entry = %found.display(), "Resolved fallback entry");
            return Ok(found);
        }
    }

    ValidationSnafu {
        path: path.to_path_buf(),
        message: format!(
            "no entry module found (declared: {declared:?}, fallbacks: {FALLBACK_ENTRY_NAMES:?})"
        ),
    }
    .fail()
}

fn declared_entries(manifest: &Value) -> Vec<String> {
    ["module", "main"]
        .iter()
        .filter_map(|key| manifest.get(*key).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Try `candidate` with the processed extension first, then as written, then
/// with each module extension appended.
fn probe(candidate: &Path) -> Option<PathBuf> {
    if has_module_extension(candidate) {
        return prefer_processed(candidate).or_else(|| candidate.is_file().then(|| candidate.to_path_buf()));
    }
    if candidate.is_file() {
        return Some(candidate.to_path_buf());
    }
    std::iter::once(PROCESSED_MODULE_EXT)
        .chain(MODULE_EXTENSIONS.iter().copied())
        .map(|ext| {
            let mut raw = candidate.as_os_str().to_os_string();
            raw.push(".");
            raw.push(ext);
            PathBuf::from(raw)
        })
        .find(|p| p.is_file())
}

fn prefer_processed(path: &Path) -> Option<PathBuf> {
    if !has_module_extension(path) {
        return None;
    }
    let processed = path.with_extension(PROCESSED_MODULE_EXT);
    processed.is_file().then_some(processed)
}

#[cfg(test)]
#[path = "entry.test.rs"]
mod tests;
