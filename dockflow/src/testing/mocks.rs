//! Scriptable in-memory adapters.
//!
//! Both mocks record every call so tests can assert on what a run asked the
//! outside world to do.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::core::CmdResult;
use crate::errors::{FetchError, RuntimeError};
use crate::runtime::format_command;
use crate::stages::{ContainerRuntime, FetchedSource, SourceFetcher, VolumeMount};
use crate::utils::EnvMap;

/// A recorded `build_image` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildCall {
    /// Image id.
    pub id: String,
    /// Build directory.
    pub work_dir: PathBuf,
    /// Build variables.
    pub env: EnvMap,
}

/// A recorded `run_image` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunCall {
    /// Image id.
    pub id: String,
    /// Run directory.
    pub work_dir: PathBuf,
    /// Mounted volume.
    pub volume: Option<VolumeMount>,
    /// Standard input given to the container.
    pub stdin: String,
    /// Run variables.
    pub env: EnvMap,
}

/// Container runtime whose outcomes are scripted per image id.
///
/// Unscripted builds and runs succeed with empty output.
#[derive(Debug, Default)]
pub struct MockContainerRuntime {
    build_exits: HashMap<String, i32>,
    build_spawn_failures: HashSet<String>,
    run_exits: HashMap<String, i32>,
    run_stdout: HashMap<String, String>,
    echo_stdin: bool,
    fail_create_volume: bool,
    fail_create_volume_prefix: Option<String>,
    fail_remove_volume: bool,
    builds: Mutex<Vec<BuildCall>>,
    runs: Mutex<Vec<RunCall>>,
    created_volumes: Mutex<Vec<(PathBuf, String)>>,
    removed_volumes: Mutex<Vec<String>>,
}

impl MockContainerRuntime {
    /// Creates a runtime where everything succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds of `id` exit with `code`.
    #[must_use]
    pub fn with_build_exit(mut self, id: impl Into<String>, code: i32) -> Self {
        self.build_exits.insert(id.into(), code);
        self
    }

    /// Builds of `id` cannot be started.
    #[must_use]
    pub fn with_build_spawn_failure(mut self, id: impl Into<String>) -> Self {
        self.build_spawn_failures.insert(id.into());
        self
    }

    /// Runs of `id` exit with `code`.
    #[must_use]
    pub fn with_run_exit(mut self, id: impl Into<String>, code: i32) -> Self {
        self.run_exits.insert(id.into(), code);
        self
    }

    /// Runs of `id` print `stdout`.
    #[must_use]
    pub fn with_run_stdout(mut self, id: impl Into<String>, stdout: impl Into<String>) -> Self {
        self.run_stdout.insert(id.into(), stdout.into());
        self
    }

    /// Unscripted runs print their standard input.
    #[must_use]
    pub fn echoing_stdin(mut self) -> Self {
        self.echo_stdin = true;
        self
    }

    /// Volume creation fails.
    #[must_use]
    pub fn with_create_volume_failure(mut self) -> Self {
        self.fail_create_volume = true;
        self
    }

    /// Creating volumes whose name starts with `prefix` fails.
    #[must_use]
    pub fn with_create_volume_failure_for(mut self, prefix: impl Into<String>) -> Self {
        self.fail_create_volume_prefix = Some(prefix.into());
        self
    }

    /// Volume removal fails.
    #[must_use]
    pub fn with_remove_volume_failure(mut self) -> Self {
        self.fail_remove_volume = true;
        self
    }

    /// Recorded builds, in order.
    #[must_use]
    pub fn build_calls(&self) -> Vec<BuildCall> {
        self.builds.lock().clone()
    }

    /// Recorded runs, in order.
    #[must_use]
    pub fn run_calls(&self) -> Vec<RunCall> {
        self.runs.lock().clone()
    }

    /// Created volumes as `(dir, name)`.
    #[must_use]
    pub fn created_volumes(&self) -> Vec<(PathBuf, String)> {
        self.created_volumes.lock().clone()
    }

    /// Removed volume names.
    #[must_use]
    pub fn removed_volumes(&self) -> Vec<String> {
        self.removed_volumes.lock().clone()
    }
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(ToString::to_string).collect()
}

#[async_trait]
impl ContainerRuntime for MockContainerRuntime {
    async fn build_image(
        &self,
        id: &str,
        work_dir: &Path,
        env: &EnvMap,
    ) -> Result<CmdResult, RuntimeError> {
        self.builds.lock().push(BuildCall {
            id: id.to_string(),
            work_dir: work_dir.to_path_buf(),
            env: env.clone(),
        });
        let cmd = format_command("docker", &args(&["build", "-t", id, "."]));
        let dir = work_dir.display().to_string();

        if self.build_spawn_failures.contains(id) {
            return Err(RuntimeError::Spawn {
                cmd,
                dir,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "docker: not found"),
            });
        }
        let exit = self.build_exits.get(id).copied().unwrap_or(0);
        let stderr = if exit == 0 { String::new() } else { format!("build of {id} failed") };
        Ok(CmdResult::default()
            .with_cmd(cmd)
            .with_dir(dir)
            .with_stdout(format!("Successfully tagged {id}:latest"))
            .with_stderr(stderr)
            .with_exit_status(exit))
    }

    async fn run_image(
        &self,
        id: &str,
        work_dir: &Path,
        volume: Option<&VolumeMount>,
        stdin: &str,
        env: &EnvMap,
    ) -> Result<CmdResult, RuntimeError> {
        self.runs.lock().push(RunCall {
            id: id.to_string(),
            work_dir: work_dir.to_path_buf(),
            volume: volume.cloned(),
            stdin: stdin.to_string(),
            env: env.clone(),
        });
        let stdout = match self.run_stdout.get(id) {
            Some(out) => out.clone(),
            None if self.echo_stdin => stdin.to_string(),
            None => String::new(),
        };
        let exit = self.run_exits.get(id).copied().unwrap_or(0);
        Ok(CmdResult::default()
            .with_cmd(format_command("docker", &args(&["run", "-i", "--rm", id])))
            .with_dir(work_dir.display().to_string())
            .with_stdin(stdin)
            .with_stdout(stdout)
            .with_exit_status(exit))
    }

    async fn create_volume(&self, dir: &Path, name: &str) -> Result<(), RuntimeError> {
        let scripted = self
            .fail_create_volume_prefix
            .as_deref()
            .is_some_and(|prefix| name.starts_with(prefix));
        if self.fail_create_volume || scripted {
            return Err(RuntimeError::NonZeroExit {
                cmd: format!("docker volume create --name={name}"),
                exit_status: 1,
                stderr: "volume driver unavailable".to_string(),
            });
        }
        self.created_volumes
            .lock()
            .push((dir.to_path_buf(), name.to_string()));
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<(), RuntimeError> {
        self.removed_volumes.lock().push(name.to_string());
        if self.fail_remove_volume {
            return Err(RuntimeError::NonZeroExit {
                cmd: format!("docker volume rm -f {name}"),
                exit_status: 1,
                stderr: "volume is in use".to_string(),
            });
        }
        Ok(())
    }
}

/// Source fetcher that never touches the network or the filesystem.
#[derive(Debug)]
pub struct MockSourceFetcher {
    commit_id: String,
    fetch_failure: Option<String>,
    fail_remove: bool,
    fetches: Mutex<Vec<(String, PathBuf)>>,
    removals: Mutex<Vec<PathBuf>>,
}

impl Default for MockSourceFetcher {
    fn default() -> Self {
        Self {
            commit_id: "0000000000000000000000000000000000000000".to_string(),
            fetch_failure: None,
            fail_remove: false,
            fetches: Mutex::new(Vec::new()),
            removals: Mutex::new(Vec::new()),
        }
    }
}

impl MockSourceFetcher {
    /// Creates a fetcher where everything succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches report `commit_id`.
    #[must_use]
    pub fn with_commit(mut self, commit_id: impl Into<String>) -> Self {
        self.commit_id = commit_id.into();
        self
    }

    /// Fetches fail with a network error carrying `message`.
    #[must_use]
    pub fn with_fetch_failure(mut self, message: impl Into<String>) -> Self {
        self.fetch_failure = Some(message.into());
        self
    }

    /// Removing checkouts fails.
    #[must_use]
    pub fn with_remove_failure(mut self) -> Self {
        self.fail_remove = true;
        self
    }

    /// Recorded fetches as `(repo, dest)`.
    #[must_use]
    pub fn fetched(&self) -> Vec<(String, PathBuf)> {
        self.fetches.lock().clone()
    }

    /// Recorded removals.
    #[must_use]
    pub fn removed(&self) -> Vec<PathBuf> {
        self.removals.lock().clone()
    }
}

#[async_trait]
impl SourceFetcher for MockSourceFetcher {
    async fn fetch(&self, repo: &str, dest: &Path) -> Result<FetchedSource, FetchError> {
        self.fetches
            .lock()
            .push((repo.to_string(), dest.to_path_buf()));
        if let Some(message) = &self.fetch_failure {
            return Err(FetchError::Network {
                repo: repo.to_string(),
                message: message.clone(),
            });
        }
        Ok(FetchedSource {
            dir: dest.to_path_buf(),
            commit_id: self.commit_id.clone(),
        })
    }

    async fn remove(&self, dir: &Path) -> Result<(), FetchError> {
        if self.fail_remove {
            return Err(FetchError::Filesystem {
                path: dir.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "permission denied"),
            });
        }
        self.removals.lock().push(dir.to_path_buf());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_runtime_scripts_and_records() {
        let runtime = MockContainerRuntime::new()
            .with_build_exit("a", 2)
            .with_run_stdout("b", "out");

        let build = runtime.build_image("a", Path::new("/src/a"), &EnvMap::new()).await.unwrap();
        let run = runtime
            .run_image("b", Path::new("/src/b"), None, "in", &EnvMap::new())
            .await
            .unwrap();

        assert_eq!(build.exit_status, 2);
        assert_eq!(run.stdout, "out");
        assert_eq!(runtime.build_calls()[0].work_dir, PathBuf::from("/src/a"));
        assert_eq!(runtime.run_calls()[0].stdin, "in");
    }

    #[tokio::test]
    async fn test_mock_runtime_echo() {
        let runtime = MockContainerRuntime::new().echoing_stdin();
        let run = runtime
            .run_image("x", Path::new("/"), None, "payload", &EnvMap::new())
            .await
            .unwrap();
        assert_eq!(run.stdout, "payload");
    }

    #[tokio::test]
    async fn test_mock_fetcher() {
        let fetcher = MockSourceFetcher::new().with_commit("abc123");
        let source = fetcher.fetch("github.com/a/b", Path::new("/tmp/x")).await.unwrap();
        fetcher.remove(&source.dir).await.unwrap();

        assert_eq!(source.commit_id, "abc123");
        assert_eq!(fetcher.fetched().len(), 1);
        assert_eq!(fetcher.removed(), vec![PathBuf::from("/tmp/x")]);

        let failing = MockSourceFetcher::new().with_fetch_failure("timeout");
        assert!(failing.fetch("r", Path::new("/tmp/y")).await.unwrap_err().is_remote());
    }
}
