//! Fetching remote plugin sources.
//!
//! Git repositories are shallow-cloned (SSH URLs for github.com fall back to
//! HTTPS); `.tar.gz`/`.tgz` URLs are downloaded with `curl` and unpacked
//! with `tar`.

use std::path::Path;

use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::error::Result;
use crate::error::plugin_error::FetchSnafu;

/// A remote plugin location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteSource {
    Git { url: String, git_ref: Option<String> },
    Tarball { url: String },
}

impl RemoteSource {
    /// Classify `url` by its suffix.
    pub fn parse(url: &str, git_ref: Option<&str>) -> Self {
        let lower = url.to_ascii_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Self::Tarball {
                url: url.to_string(),
            }
        } else {
            Self::Git {
                url: url.to_string(),
                git_ref: git_ref.map(String::from),
            }
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Git { url, .. } | Self::Tarball { url } => url,
        }
    }

    /// Fetch into `target`, which must not exist yet.
    pub async fn fetch(&self, target: &Path) -> Result<()> {
        match self {
            Self::Git { url, git_ref } => git_clone_with_fallback(url, target, git_ref.as_deref()).await,
            Self::Tarball { url } => download_tarball(url, target).await,
        }
    }
}

/// Derive a plugin name from the last URL path segment.
pub fn name_from_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    let segment = trimmed
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(trimmed);
    let name = [".tar.gz", ".tgz", ".git"]
        .iter()
        .find_map(|suffix| segment.strip_suffix(suffix))
        .unwrap_or(segment);
    name.to_string()
}

/// HTTPS equivalent of a github.com SSH URL.
pub fn https_fallback_url(url: &str) -> Option<String> {
    let path = url.strip_prefix("git@github.com:")?;
    Some(format!("https://github.com/{}.git", path.trim_end_matches(".git")))
}

/// Shallow clone a git repository.
pub async fn git_clone(url: &str, target: &Path, git_ref: Option<&str>) -> Result<()> {
    let mut args = vec![
        "-c",
        "credential.helper=",
        "-c",
        "core.sshCommand=ssh -o BatchMode=yes -o StrictHostKeyChecking=accept-new",
        "clone",
        "--depth",
        "1",
    ];
    if let Some(r) = git_ref {
        args.push("--branch");
        args.push(r);
    }
    args.push(url);
    let target_str = target.to_string_lossy();
    args.push(&target_str);

    debug!(url, ?git_ref, target = %target.display(), "Cloning plugin repository");
    run("git", &args, url).await?;
    info!(url, target = %target.display(), "Plugin repository cloned");
    Ok(())
}

/// Clone, retrying a failed github.com SSH clone over HTTPS.
pub async fn git_clone_with_fallback(url: &str, target: &Path, git_ref: Option<&str>) -> Result<()> {
    match git_clone(url, target, git_ref).await {
        Ok(()) => Ok(()),
        Err(e) => {
            let Some(https_url) = https_fallback_url(url) else {
                return Err(e);
            };
            warn!(ssh_url = url, https_url = %https_url, "SSH clone failed, trying HTTPS");
            if target.exists() {
                let _ = tokio::fs::remove_dir_all(target).await;
            }
            git_clone(&https_url, target, git_ref).await
        }
    }
}

/// Download a gzipped tarball and unpack its top-level directory into
/// `target`.
pub async fn download_tarball(url: &str, target: &Path) -> Result<()> {
    let fetch_error = |message: String| {
        FetchSnafu {
            url: url.to_string(),
            message,
        }
        .build()
    };

    tokio::fs::create_dir_all(target)
        .await
        .map_err(|e| fetch_error(format!("Failed to create {}: {e}", target.display())))?;
    let archive = target.join(".lumen-download.tgz");
    let archive_str = archive.to_string_lossy().to_string();
    let target_str = target.to_string_lossy().to_string();

    debug!(url, target = %target.display(), "Downloading plugin tarball");
    let result = async {
        run("curl", &["-fsSL", "-o", archive_str.as_str(), url], url).await?;
        run(
            "tar",
            &["-xzf", archive_str.as_str(), "-C", target_str.as_str(), "--strip-components=1"],
            url,
        )
        .await
    }
    .await;
    let _ = tokio::fs::remove_file(&archive).await;

    if result.is_ok() {
        info!(url, target = %target.display(), "Plugin tarball unpacked");
    }
    result
}

async fn run(program: &str, args: &[&str], url: &str) -> Result<()> {
    let output = tokio::process::Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| {
            FetchSnafu {
                url: url.to_string(),
                message: format!("Failed to spawn {program}: {e}"),
            }
            .build()
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return FetchSnafu {
            url: url.to_string(),
            message: format!("{program} failed: {}", stderr.trim()),
        }
        .fail();
    }
    Ok(())
}

#[cfg(test)]
#[path = "fetch.test.rs"]
mod tests;
