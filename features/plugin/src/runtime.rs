//! Execution of plugin modules.
//!
//! Plugin code is JavaScript, so it runs in an external JS runtime. The
//! runtime imports the entry module, calls its registration export against
//! three mock registries and reports every call it saw. Nothing it reports
//! reaches a live registry until the loader decides to commit.

use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::error::plugin_error::LoadSnafu;
use crate::registrar::RegistrationKind;
use crate::rewriter::to_file_url;

/// A registration call made against one of the mock registries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationCall {
    pub kind: RegistrationKind,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub metadata: Value,
    pub class_name: String,
}

/// Imports a module and runs its registration entry point.
#[async_trait]
pub trait ModuleRuntime: Send + Sync + 'static {
    /// Import `entry` and invoke its registration export with mock
    /// registries, returning the calls made in order.
    ///
    /// A module that throws or exports no registration function is a
    /// [`crate::PluginError::Load`].
    async fn import_and_register(&self, entry: &Path) -> Result<Vec<RegistrationCall>>;
}

/// Prefix of the stdout line carrying the captured calls.
const REPORT_MARKER: &str = "__LUMEN_REGISTRATIONS__";

/// Environment variable holding the entry module URL.
const ENTRY_ENV: &str = "LUMEN_PLUGIN_ENTRY";

const HARNESS: &str = r#"
const calls = [];
const plain = (value) => {
  try { return JSON.parse(JSON.stringify(value ?? {})); } catch { return {}; }
};
const mock = (kind) => {
  const record = (cls, category, metadata) => {
    const meta = metadata && typeof metadata === 'object' ? metadata : {};
    const className = (cls && cls.name) || String(meta.name ?? 'anonymous');
    calls.push({
      kind,
      name: String(meta.name ?? meta.id ?? className),
      category: String(category ?? meta.category ?? ''),
      metadata: plain(meta),
      class_name: className,
    });
    return true;
  };
  return { registerGlobal: record, register: record };
};
try {
  const mod = await import(process.env.LUMEN_PLUGIN_ENTRY);
  const target = mod.default;
  const register = typeof mod.register === 'function' ? mod.register
    : typeof target === 'function' ? target
    : target && typeof target.register === 'function' ? target.register.bind(target)
    : null;
  if (!register) {
    process.stderr.write('module exports no register function\n');
    process.exit(3);
  }
  await register(mock('effect'), mock('config'), mock('position'));
  process.stdout.write('\n__LUMEN_REGISTRATIONS__' + JSON.stringify(calls) + '\n');
} catch (e) {
  process.stderr.write(String((e && e.stack) || e) + '\n');
  process.exit(2);
}
"#;

/// Runs plugins through a `node` binary.
#[derive(Debug, Clone)]
pub struct NodeRuntime {
    binary: PathBuf,
}

impl NodeRuntime {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

#[async_trait]
impl ModuleRuntime for NodeRuntime {
    async fn import_and_register(&self, entry: &Path) -> Result<Vec<RegistrationCall>> {
        let url = to_file_url(entry);
        debug!(binary = %self.binary.display(), entry = %url, "Running plugin module");

        let mut command = tokio::process::Command::new(&self.binary);
        command
            .args(["--input-type=module", "-e", HARNESS])
            .env(ENTRY_ENV, &url)
            .stdin(std::process::Stdio::null());
        if let Some(dir) = entry.parent() {
            command.current_dir(dir);
        }

        let output = command.output().await.map_err(|e| {
            LoadSnafu {
                entry: entry.to_path_buf(),
                message: format!("Failed to start {}: {e}", self.binary.display()),
            }
            .build()
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LoadSnafu {
                entry: entry.to_path_buf(),
                message: summarize_stderr(&stderr),
            }
            .build());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_report(entry, &stdout)
    }
}

/// Extract the captured calls from harness stdout.
pub(crate) fn parse_report(entry: &Path, stdout: &str) -> Result<Vec<RegistrationCall>> {
    let Some(payload) = stdout
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix(REPORT_MARKER))
    else {
        return Err(LoadSnafu {
            entry: entry.to_path_buf(),
            message: "runtime produced no registration report".to_string(),
        }
        .build());
    };
    serde_json::from_str(payload).map_err(|e| {
        LoadSnafu {
            entry: entry.to_path_buf(),
            message: format!("Malformed registration report: {e}"),
        }
        .build()
    })
}

/// First non-empty stderr line plus the line count, enough to identify the
/// failure without dumping a whole stack.
fn summarize_stderr(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    match lines.as_slice() {
        [] => "plugin module exited with an error".to_string(),
        [only] => only.trim().to_string(),
        [first, rest @ ..] => format!("{} (+{} more lines)", first.trim(), rest.len()),
    }
}

#[cfg(test)]
#[path = "runtime.test.rs"]
mod tests;
