//! Source fetcher backed by the git CLI.

use super::process::{run_process, ProcessSpec};
use crate::config::ExecutorConfig;
use crate::errors::{FetchError, RuntimeError};
use crate::stages::{FetchedSource, SourceFetcher};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

/// Clones stage repositories with `git`.
#[derive(Debug, Clone)]
pub struct GitFetcher {
    bin: String,
}

impl Default for GitFetcher {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitFetcher {
    /// Uses `bin` as the git binary.
    #[must_use]
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    /// Creates a fetcher from the executor configuration.
    #[must_use]
    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self::new(config.git_bin.clone())
    }

    async fn git(&self, repo: &str, args: Vec<String>, dir: &Path) -> Result<String, FetchError> {
        let result = run_process(ProcessSpec::new(&self.bin, args).in_dir(dir))
            .await
            .map_err(|e| spawn_failure(repo, &e))?;
        if result.succeeded() {
            Ok(result.stdout)
        } else {
            Err(classify_clone_failure(repo, dir, &result.stderr))
        }
    }
}

#[async_trait]
impl SourceFetcher for GitFetcher {
    async fn fetch(&self, repo: &str, dest: &Path) -> Result<FetchedSource, FetchError> {
        let url = normalize_reference(repo)?;
        let dest = absolute(dest)?;
        self.remove(&dest).await?;

        let parent = dest.parent().unwrap_or_else(|| Path::new("/"));
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| FetchError::Filesystem {
                path: parent.to_path_buf(),
                source,
            })?;

        info!(repo = %url, dest = %dest.display(), "Cloning repository");
        let clone_args = vec![
            "clone".to_string(),
            "--quiet".to_string(),
            url,
            dest.display().to_string(),
        ];
        self.git(repo, clone_args, parent).await?;

        let head = self
            .git(repo, vec!["rev-parse".to_string(), "HEAD".to_string()], &dest)
            .await?;
        let commit_id = head.trim().to_string();
        info!(commit = %commit_id, dir = %dest.display(), "Repository cloned");

        Ok(FetchedSource {
            dir: dest,
            commit_id,
        })
    }
}

/// Anchors a relative checkout path at the current directory. Clone runs
/// from the parent directory, so a relative target would nest.
fn absolute(path: &Path) -> Result<PathBuf, FetchError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .map_err(|source| FetchError::Filesystem {
            path: path.to_path_buf(),
            source,
        })
}

/// Turns a repository reference into a clonable URL.
///
/// References without a scheme get `https://`. SSH (`git@host:path`) and
/// local paths are kept as they are.
///
/// # Errors
///
/// Returns [`FetchError::InvalidReference`] for empty or whitespace-bearing
/// references.
pub fn normalize_reference(repo: &str) -> Result<String, FetchError> {
    let trimmed = repo.trim();
    if trimmed.is_empty() {
        return Err(FetchError::InvalidReference {
            repo: repo.to_string(),
            reason: "reference is empty".to_string(),
        });
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(FetchError::InvalidReference {
            repo: repo.to_string(),
            reason: "reference contains whitespace".to_string(),
        });
    }
    if trimmed.contains("://")
        || trimmed.starts_with("git@")
        || trimmed.starts_with('/')
        || trimmed.starts_with('.')
    {
        return Ok(trimmed.to_string());
    }
    Ok(format!("https://{trimmed}"))
}

/// Classifies a failed git invocation from its standard error.
///
/// Local directory failures are checked first: git reports an unwritable
/// work tree as "Permission denied" too.
#[must_use]
pub fn classify_clone_failure(repo: &str, dir: &Path, stderr: &str) -> FetchError {
    const FILESYSTEM: [&str; 5] = [
        "could not create work tree dir",
        "could not create leading directories",
        "read-only file system",
        "no space left on device",
        "already exists and is not an empty directory",
    ];
    const AUTH: [&str; 5] = [
        "authentication failed",
        "could not read username",
        "permission denied (publickey",
        "access denied",
        "returned error: 403",
    ];
    const NETWORK: [&str; 6] = [
        "could not resolve host",
        "connection refused",
        "connection timed out",
        "network is unreachable",
        "failed to connect",
        "operation timed out",
    ];

    let message = stderr.trim().to_string();
    let lower = message.to_lowercase();
    if FILESYSTEM.iter().any(|needle| lower.contains(needle)) {
        let kind = if lower.contains("permission denied") {
            std::io::ErrorKind::PermissionDenied
        } else {
            std::io::ErrorKind::Other
        };
        FetchError::Filesystem {
            path: dir.to_path_buf(),
            source: std::io::Error::new(kind, message),
        }
    } else if AUTH.iter().any(|needle| lower.contains(needle)) {
        FetchError::Auth {
            repo: repo.to_string(),
            message,
        }
    } else if NETWORK.iter().any(|needle| lower.contains(needle)) {
        FetchError::Network {
            repo: repo.to_string(),
            message,
        }
    } else {
        FetchError::Command {
            repo: repo.to_string(),
            message,
        }
    }
}

fn spawn_failure(repo: &str, err: &RuntimeError) -> FetchError {
    FetchError::Command {
        repo: repo.to_string(),
        message: err.to_string(),
    }
}
