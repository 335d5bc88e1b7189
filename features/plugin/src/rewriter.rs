//! Import specifier rewriting.
//!
//! Plugins are relocated before they run, so their module references must
//! still resolve afterwards. Shared package references become absolute file
//! URLs; relative references are re-anchored at the plugin's new location.
//!
//! Rewriting is text substitution driven by a small set of [`RewriteRule`]s,
//! one per syntax form and quote style:
//!
//! | form            | matches                                       |
//! |-----------------|-----------------------------------------------|
//! | `StaticImport`  | `import x from 'p'`, `import 'p'`, `export … from 'p'` |
//! | `DynamicImport` | `import('p')`                                 |
//! | `RequireCall`   | `require('p')`                                |

use std::borrow::Cow;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use regex::Captures;
use regex::Regex;
use tracing::trace;
use tracing::warn;
use url::Url;

use crate::resolver::ResolvedPackage;

/// Extension given to every processed module so the runtime always treats
/// it as a standard module.
pub const PROCESSED_MODULE_EXT: &str = "mjs";

/// Extensions treated as module source.
pub const MODULE_EXTENSIONS: &[&str] = &["js", "mjs", "cjs"];

/// Syntax form a rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxForm {
    StaticImport,
    DynamicImport,
    RequireCall,
}

/// Quote style around the specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quote {
    Single,
    Double,
}

impl Quote {
    fn as_char(self) -> char {
        match self {
            Self::Single => '\'',
            Self::Double => '"',
        }
    }
}

/// One substitution rule: a syntax form with a quote style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewriteRule {
    pub form: SyntaxForm,
    pub quote: Quote,
}

impl RewriteRule {
    /// Every rule, in application order.
    pub const ALL: [RewriteRule; 6] = [
        RewriteRule::new(SyntaxForm::StaticImport, Quote::Single),
        RewriteRule::new(SyntaxForm::StaticImport, Quote::Double),
        RewriteRule::new(SyntaxForm::DynamicImport, Quote::Single),
        RewriteRule::new(SyntaxForm::DynamicImport, Quote::Double),
        RewriteRule::new(SyntaxForm::RequireCall, Quote::Single),
        RewriteRule::new(SyntaxForm::RequireCall, Quote::Double),
    ];

    pub const fn new(form: SyntaxForm, quote: Quote) -> Self {
        Self { form, quote }
    }

    fn head_pattern(self) -> &'static str {
        match self.form {
            SyntaxForm::StaticImport => r"\bfrom\s*|\bimport\s*",
            SyntaxForm::DynamicImport => r"\bimport\s*\(\s*",
            SyntaxForm::RequireCall => r"\brequire\s*\(\s*",
        }
    }

    /// Compile the rule for a specifier pattern.
    ///
    /// `specifier` is a regex fragment; it may not contain capture groups
    /// named `head` or `spec`.
    pub fn compile(self, specifier: &str) -> Option<Regex> {
        let q = regex::escape(&self.quote.as_char().to_string());
        let pattern = format!(
            r"(?P<head>{head}){q}(?P<spec>{specifier}){q}",
            head = self.head_pattern()
        );
        match Regex::new(&pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Invalid rewrite pattern");
                None
            }
        }
    }

    /// Replace every match whose specifier `replace` maps to a new value.
    pub fn apply<'a>(
        self,
        source: &'a str,
        specifier: &str,
        replace: &dyn Fn(&str) -> Option<String>,
    ) -> Cow<'a, str> {
        let Some(re) = self.compile(specifier) else {
            return Cow::Borrowed(source);
        };
        let q = self.quote.as_char();
        re.replace_all(source, |caps: &Captures<'_>| match replace(&caps["spec"]) {
            Some(new_spec) => format!("{}{q}{new_spec}{q}", &caps["head"]),
            None => caps[0].to_string(),
        })
    }
}

/// Apply every rule in order.
fn apply_all_rules(
    source: &str,
    specifier: &str,
    replace: &dyn Fn(&str) -> Option<String>,
) -> String {
    RewriteRule::ALL
        .iter()
        .fold(source.to_string(), |text, rule| {
            rule.apply(&text, specifier, replace).into_owned()
        })
}

/// Where relative references should point after rewriting.
#[derive(Debug, Clone)]
pub struct RelativeAnchor {
    /// Directory the rewritten file will live in.
    pub target_dir: PathBuf,
    /// Directory the original file lives in; used to probe extension-less
    /// references.
    pub source_dir: PathBuf,
    /// Rename module targets to [`PROCESSED_MODULE_EXT`].
    pub normalize_extensions: bool,
}

impl RelativeAnchor {
    /// Anchor at the plugin's own directory, keeping file names unchanged.
    pub fn in_place(dir: &Path) -> Self {
        Self {
            target_dir: dir.to_path_buf(),
            source_dir: dir.to_path_buf(),
            normalize_extensions: false,
        }
    }

    fn resolve(&self, relative: &str) -> PathBuf {
        let target = normalize_lexically(&self.target_dir.join(relative));
        if !self.normalize_extensions {
            return target;
        }

        let source = normalize_lexically(&self.source_dir.join(relative));
        if has_module_extension(&target) {
            target.with_extension(PROCESSED_MODULE_EXT)
        } else if source.is_file() {
            target
        } else if let Some(ext) = MODULE_EXTENSIONS
            .iter()
            .find(|ext| with_appended_extension(&source, ext).is_file())
        {
            trace!(relative, ext, "Resolved extension-less reference");
            with_appended_extension(&target, PROCESSED_MODULE_EXT)
        } else if source.is_dir() && source.join("index.js").is_file() {
            target.join(format!("index.{PROCESSED_MODULE_EXT}"))
        } else {
            target
        }
    }
}

/// Rewrites module references in plugin source text.
#[derive(Debug, Clone)]
pub struct ImportRewriter {
    engine_package: String,
}

impl ImportRewriter {
    /// `engine_package` is never rewritten: its internal cross-module
    /// resolution only works through directory lookup.
    pub fn new(engine_package: impl Into<String>) -> Self {
        Self {
            engine_package: engine_package.into(),
        }
    }

    pub fn engine_package(&self) -> &str {
        &self.engine_package
    }

    /// Rewrite references to `package`.
    ///
    /// The text is returned unchanged when the package is the engine, is not
    /// mentioned, could not be resolved, or resolved into read-only storage.
    pub fn rewrite_package(
        &self,
        source: &str,
        package: &str,
        resolved: Option<&ResolvedPackage>,
    ) -> String {
        if package == self.engine_package || !source.contains(package) {
            return source.to_string();
        }
        let Some(resolved) = resolved else {
            return source.to_string();
        };
        if resolved.read_only {
            trace!(package, "Leaving read-only package to directory resolution");
            return source.to_string();
        }

        let entry = resolved.entry_point();
        let prefix_len = package.len();
        let specifier = format!(r#"{}(?:/[^'"\r\n]*)?"#, regex::escape(package));
        let replace = |spec: &str| -> Option<String> {
            let subpath = spec[prefix_len..].trim_start_matches('/');
            if subpath.is_empty() {
                Some(to_file_url(&entry))
            } else {
                Some(to_file_url(&resolved.root.join(subpath)))
            }
        };
        apply_all_rules(source, &specifier, &replace)
    }

    /// Re-anchor `./` and `../` references.
    pub fn rewrite_relative(&self, source: &str, anchor: &RelativeAnchor) -> String {
        if !source.contains("./") {
            return source.to_string();
        }
        let specifier = r#"\.{1,2}/[^'"\r\n]*"#;
        let replace = |spec: &str| {
            let (path, suffix) = split_query(spec);
            Some(format!("{}{suffix}", to_file_url(&anchor.resolve(path))))
        };
        apply_all_rules(source, specifier, &replace)
    }

    /// Rewrite every shared package, then relative references.
    pub fn rewrite_module(
        &self,
        source: &str,
        packages: &[(String, Option<ResolvedPackage>)],
        anchor: &RelativeAnchor,
    ) -> String {
        let rewritten = packages.iter().fold(source.to_string(), |text, (name, resolved)| {
            self.rewrite_package(&text, name, resolved.as_ref())
        });
        self.rewrite_relative(&rewritten, anchor)
    }
}

/// True for `.js`, `.mjs` and `.cjs` files.
pub fn has_module_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| MODULE_EXTENSIONS.contains(&ext))
}

/// Convert an absolute path into a `file://` URL safe to splice into a
/// quoted module specifier.
///
/// Relative paths cannot be expressed as file URLs and are returned as-is.
pub fn to_file_url(path: &Path) -> String {
    match Url::from_file_path(path) {
        Ok(url) => escape_specifier(url.as_str()),
        Err(()) => {
            warn!(path = %path.display(), "Cannot convert relative path to a file URL");
            escape_specifier(&path.to_string_lossy())
        }
    }
}

/// Percent-encode the characters that would end or escape a JS string
/// literal.
fn escape_specifier(url: &str) -> String {
    url.replace('\\', "%5C")
        .replace('\'', "%27")
        .replace('"', "%22")
}

/// Resolve `.` and `..` without touching the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn split_query(spec: &str) -> (&str, &str) {
    match spec.find(['?', '#']) {
        Some(idx) => (&spec[..idx], &spec[idx..]),
        None => (spec, ""),
    }
}

fn with_appended_extension(path: &Path, ext: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_os_string();
    raw.push(".");
    raw.push(ext);
    PathBuf::from(raw)
}

#[cfg(test)]
#[path = "rewriter.test.rs"]
mod tests;
