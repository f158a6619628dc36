//! Ports - the external capabilities a stage run depends on.
//!
//! Container builds and runs, repository fetching, report serialization and
//! operator output are injected through these traits so the lifecycle and the
//! orchestrator never talk to a process or the network directly.

use crate::core::CmdResult;
use crate::errors::{FetchError, RuntimeError};
use crate::report::{JsonReportSerializer, OperatorOutput, ReportSerializer, StderrOutput};
use crate::utils::EnvMap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A shared volume mounted into a stage container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    /// Volume name as known to the container runtime.
    pub name: String,
    /// Mount point inside the container.
    pub dir: String,
}

impl VolumeMount {
    /// Creates a new volume mount.
    #[must_use]
    pub fn new(name: impl Into<String>, dir: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
        }
    }
}

/// Builds and runs container images.
///
/// `build_image` and `run_image` return `Ok` whenever the command ran, even if
/// it exited non-zero; callers inspect [`CmdResult::exit_status`]. `Err` is
/// reserved for commands that could not be started.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Builds the image `id` from `work_dir` with build arguments `env`.
    async fn build_image(
        &self,
        id: &str,
        work_dir: &Path,
        env: &EnvMap,
    ) -> Result<CmdResult, RuntimeError>;

    /// Runs the image `id`, feeding `stdin`, with run variables `env`.
    async fn run_image(
        &self,
        id: &str,
        work_dir: &Path,
        volume: Option<&VolumeMount>,
        stdin: &str,
        env: &EnvMap,
    ) -> Result<CmdResult, RuntimeError>;

    /// Creates a volume bound to the host directory `dir`.
    async fn create_volume(&self, dir: &Path, name: &str) -> Result<(), RuntimeError>;

    /// Removes a volume.
    async fn remove_volume(&self, name: &str) -> Result<(), RuntimeError>;
}

/// A checked-out repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedSource {
    /// Local directory holding the checkout.
    pub dir: PathBuf,
    /// Commit id of the checkout.
    pub commit_id: String,
}

/// Fetches stage sources from a repository.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetches `repo` into `dest`, replacing anything already there.
    async fn fetch(&self, repo: &str, dest: &Path) -> Result<FetchedSource, FetchError>;

    /// Removes a checkout directory. Removing a missing directory succeeds.
    async fn remove(&self, dir: &Path) -> Result<(), FetchError> {
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(FetchError::Filesystem {
                path: dir.to_path_buf(),
                source,
            }),
        }
    }
}

/// Everything a pipeline run needs from the outside world.
#[derive(Clone)]
pub struct ExecutionPorts {
    /// Container runtime.
    pub runtime: Arc<dyn ContainerRuntime>,
    /// Source fetcher.
    pub fetcher: Arc<dyn SourceFetcher>,
    /// Report serializer used for error reports.
    pub serializer: Arc<dyn ReportSerializer>,
    /// Where the default error handler writes its report.
    pub output: Arc<dyn OperatorOutput>,
}

impl std::fmt::Debug for ExecutionPorts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionPorts")
            .field("serializer", &self.serializer.format_name())
            .finish_non_exhaustive()
    }
}

impl ExecutionPorts {
    /// Creates ports with JSON reports written to stderr.
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>, fetcher: Arc<dyn SourceFetcher>) -> Self {
        Self {
            runtime,
            fetcher,
            serializer: Arc::new(JsonReportSerializer::pretty()),
            output: Arc::new(StderrOutput),
        }
    }

    /// Sets the report serializer.
    #[must_use]
    pub fn with_serializer(mut self, serializer: Arc<dyn ReportSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Sets the operator output.
    #[must_use]
    pub fn with_output(mut self, output: Arc<dyn OperatorOutput>) -> Self {
        self.output = output;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopFetcher;

    #[async_trait]
    impl SourceFetcher for NoopFetcher {
        async fn fetch(&self, _repo: &str, dest: &Path) -> Result<FetchedSource, FetchError> {
            Ok(FetchedSource {
                dir: dest.to_path_buf(),
                commit_id: String::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_default_remove_deletes_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let checkout = tmp.path().join("checkout");
        std::fs::create_dir_all(checkout.join("nested")).unwrap();
        std::fs::write(checkout.join("nested/file.txt"), "x").unwrap();

        NoopFetcher.remove(&checkout).await.unwrap();

        assert!(!checkout.exists());
    }

    #[tokio::test]
    async fn test_default_remove_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("never-created");

        assert!(NoopFetcher.remove(&missing).await.is_ok());
        assert!(NoopFetcher.remove(&missing).await.is_ok());
    }
}
