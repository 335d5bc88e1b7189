//! Subcommand implementations.

use std::path::Path;

use anyhow::bail;
use serde::Serialize;

use lumen_error::ErrorExt;
use lumen_error::PlainError;
use lumen_error::StatusCode;
use lumen_plugin::CleanupReport;
use lumen_plugin::InstallRequest;
use lumen_plugin::OperationResult;
use lumen_plugin::PluginDescriptor;
use lumen_plugin::PluginKind;
use lumen_plugin::PluginLifecycle;
use lumen_plugin::ProgressReport;

#[derive(Debug, Clone, Copy, Default)]
pub struct Output {
    pub json: bool,
}

impl Output {
    fn emit<T: Serialize>(self, value: &T, text: impl FnOnce() -> String) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{}", text());
        }
        Ok(())
    }
}

/// URLs and scp-style git addresses are remote; everything else is a path.
pub fn install_request(source: &str, git_ref: Option<String>, name: Option<String>) -> InstallRequest {
    let request = if is_remote(source) {
        InstallRequest::remote(source, git_ref)
    } else {
        InstallRequest::local(source)
    };
    match name {
        Some(name) => request.with_name(name),
        None => request,
    }
}

fn is_remote(source: &str) -> bool {
    source.contains("://") || (source.starts_with("git@") && !Path::new(source).exists())
}

fn print_progress(report: &ProgressReport) {
    eprintln!("[{:>3}%] {}: {}", report.percent, report.phase, report.message);
}

pub async fn install(lifecycle: &PluginLifecycle, request: InstallRequest, output: Output) -> anyhow::Result<()> {
    let result = lifecycle.install(request, Some(&print_progress)).await;
    report_operation(&result, "installed", output)
}

pub fn list(lifecycle: &PluginLifecycle, output: Output) -> anyhow::Result<()> {
    let plugins = lifecycle.store().plugins();
    output.emit(&plugins, || {
        if plugins.is_empty() {
            return "No plugins installed.".to_string();
        }
        plugins
            .iter()
            .map(format_plugin_line)
            .collect::<Vec<_>>()
            .join("\n")
    })
}

pub async fn uninstall(
    lifecycle: &PluginLifecycle,
    name: &str,
    delete_source: bool,
    output: Output,
) -> anyhow::Result<()> {
    let result = lifecycle.uninstall(name, delete_source).await;
    report_operation(&result, "uninstalled", output)
}

/// Plugins may not need the engine, so a failed bootstrap only warns.
async fn bootstrap_engine(lifecycle: &PluginLifecycle) -> Option<String> {
    let engine = lifecycle.bootstrap_engine().await;
    if engine.success {
        return None;
    }
    let error = engine.error.unwrap_or_else(|| "unknown error".to_string());
    tracing::warn!(error = %error, "Engine bootstrap failed");
    Some(error)
}

pub async fn reload(lifecycle: &PluginLifecycle, name: &str, output: Output) -> anyhow::Result<()> {
    bootstrap_engine(lifecycle).await;
    let result = lifecycle.reload(name, Some(&print_progress)).await;
    report_operation(&result, "reloaded", output)
}

pub async fn toggle(lifecycle: &PluginLifecycle, name: &str) -> anyhow::Result<()> {
    let enabled = match lifecycle.toggle(name).await {
        Ok(enabled) => enabled,
        Err(e) => bail!("failed to toggle {name}: {} ({:?})", e.output_msg(), e.status_code()),
    };
    println!("{name}: {}", if enabled { "enabled" } else { "disabled" });
    Ok(())
}

/// Load every enabled plugin. Fails only when plugins were attempted and
/// none of them loaded.
pub async fn load_all(lifecycle: &PluginLifecycle, output: Output) -> anyhow::Result<()> {
    let engine_error = bootstrap_engine(lifecycle).await;

    let result = lifecycle.load_all(Some(&print_progress)).await;
    let snapshot = lifecycle.registry_snapshot().await;
    output.emit(&snapshot, || {
        let mut lines = vec![format!(
            "Loaded {} plugin(s), {} failed, {} effect(s) registered",
            result.loaded.len(),
            result.failed.len(),
            snapshot.len()
        )];
        if let Some(error) = &engine_error {
            lines.push(format!("  warning: engine bootstrap failed: {error}"));
        }
        lines.extend(
            result
                .failed
                .iter()
                .map(|f| format!("  failed {}: {}", f.name, f.error)),
        );
        lines.join("\n")
    })?;

    if result.loaded.is_empty() && !result.failed.is_empty() {
        let message = format!("all {} plugin(s) failed to load", result.failed.len());
        return Err(PlainError::new(message, StatusCode::PluginLoadFailed).into());
    }
    Ok(())
}

pub async fn cleanup(lifecycle: &PluginLifecycle, output: Output) -> anyhow::Result<()> {
    let report = lifecycle.cleanup_orphans().await;
    let summary = CleanupSummary::from(&report);
    output.emit(&summary, || format_cleanup(&report))
}

#[derive(Debug, Serialize)]
struct CleanupSummary {
    removed_dirs: usize,
    mappings_removed: usize,
    warnings: Vec<String>,
}

impl From<&CleanupReport> for CleanupSummary {
    fn from(report: &CleanupReport) -> Self {
        Self {
            removed_dirs: report.removed_dirs.len(),
            mappings_removed: report.cache_sweep.removed,
            warnings: report.warnings.clone(),
        }
    }
}

fn report_operation(result: &OperationResult, verb: &str, output: Output) -> anyhow::Result<()> {
    if !result.success {
        for warning in &result.warnings {
            eprintln!("warning: {warning}");
        }
        bail!(
            "{}: {}",
            result.name,
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    output.emit(result, || format_operation(result, verb))
}

pub fn format_plugin_line(plugin: &PluginDescriptor) -> String {
    let state = if plugin.enabled { "enabled" } else { "disabled" };
    let origin = match (&plugin.kind, &plugin.origin) {
        (PluginKind::Remote, Some(origin)) => match &origin.git_ref {
            Some(git_ref) => format!("{}#{git_ref}", origin.url),
            None => origin.url.clone(),
        },
        _ => plugin.source_path.display().to_string(),
    };
    format!("{:<24} {:<8} {origin}", plugin.name, state)
}

pub fn format_operation(result: &OperationResult, verb: &str) -> String {
    let mut lines = vec![format!(
        "{} {verb} ({} effect(s))",
        result.name,
        result.effects.len()
    )];
    lines.extend(
        result
            .effects
            .iter()
            .map(|e| format!("  {} [{}]", e.name, e.category)),
    );
    lines.extend(result.warnings.iter().map(|w| format!("  warning: {w}")));
    lines.join("\n")
}

pub fn format_cleanup(report: &CleanupReport) -> String {
    let mut lines = vec![format!(
        "Removed {} processed dir(s), {} stale mapping(s)",
        report.removed_dirs.len(),
        report.cache_sweep.removed
    )];
    lines.extend(report.warnings.iter().map(|w| format!("  warning: {w}")));
    lines.join("\n")
}

#[cfg(test)]
#[path = "commands.test.rs"]
mod tests;
