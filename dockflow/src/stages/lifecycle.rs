//! Stage lifecycle: setup, build, run, teardown.
//!
//! A [`StageRun`] drives one stage through its phases in order and stops at
//! the first failing phase. Teardown still runs after a build or run failure,
//! and after a setup failure when a checkout directory was already assigned.
//! Teardown is tracked with a flag so a second call is a no-op.

use super::context::{ResolvedStage, StageContext};
use super::ports::{ExecutionPorts, FetchedSource};
use super::result::StageExecutionResult;
use super::spec::Stage;
use crate::core::{CmdResult, StatusCode};
use crate::errors::{DockflowError, RuntimeError, StageError};
use crate::utils::now_utc;
use std::path::PathBuf;
use tracing::{debug, error, info};

/// Exit status recorded for phases that failed without running a process.
const NOT_STARTED: i32 = -1;

/// A failed phase: what it recorded and why it failed.
#[derive(Debug)]
pub struct PhaseFailure {
    /// Result recorded for the phase.
    pub result: CmdResult,
    /// The failure.
    pub error: DockflowError,
}

impl PhaseFailure {
    fn new(result: CmdResult, error: impl Into<DockflowError>) -> Self {
        Self {
            result,
            error: error.into(),
        }
    }
}

/// One execution of one stage.
pub struct StageRun<'a> {
    stage: &'a Stage,
    ctx: &'a StageContext,
    ports: &'a ExecutionPorts,
    resolved: Option<ResolvedStage>,
    checkout: Option<PathBuf>,
    torn_down: bool,
}

impl<'a> StageRun<'a> {
    /// Prepares a run of `stage` in `ctx`.
    #[must_use]
    pub const fn new(stage: &'a Stage, ctx: &'a StageContext, ports: &'a ExecutionPorts) -> Self {
        Self {
            stage,
            ctx,
            ports,
            resolved: None,
            checkout: None,
            torn_down: false,
        }
    }

    /// The context resolved by setup, once setup succeeded.
    #[must_use]
    pub const fn resolved(&self) -> Option<&ResolvedStage> {
        self.resolved.as_ref()
    }

    /// Returns true once teardown has completed.
    #[must_use]
    pub const fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Runs every phase, feeding `stdin` to the container.
    ///
    /// # Errors
    ///
    /// Returns a [`StageError`] carrying the full execution result when the
    /// terminal status is not `Ok`.
    pub async fn execute(&mut self, stdin: &str) -> Result<StageExecutionResult, StageError> {
        let internal_id = self.ctx.internal_id(self.stage);
        let mut result = StageExecutionResult::started(self.stage.clone());

        info!(
            stage = %internal_id,
            "Executing Stage {} [{}/{}]",
            internal_id,
            self.ctx.index + 1,
            self.ctx.total
        );

        debug!(stage = %internal_id, "Setting up stage");
        let resolved = match self.setup().await {
            Ok((resolved, cmd)) => {
                result.setup_result = cmd;
                result.stage = resolved.record(self.stage);
                result.commit_id = resolved.commit_id().map(String::from);
                self.resolved = Some(resolved.clone());
                resolved
            }
            Err(failure) => {
                result.setup_result = failure.result;
                if self.checkout.is_some() {
                    result.teardown_result = self.teardown_recorded().await;
                }
                return Err(self.fail(result, StatusCode::SetupError, failure.error));
            }
        };
        info!(stage = %internal_id, container = %resolved.container_id, "Stage set up");

        debug!(stage = %internal_id, "Building stage");
        match self.build(&resolved).await {
            Ok(cmd) => result.build_result = cmd,
            Err(failure) => {
                result.build_result = failure.result;
                result.teardown_result = self.teardown_recorded().await;
                return Err(self.fail(result, StatusCode::BuildError, failure.error));
            }
        }
        info!(stage = %internal_id, "Stage built");

        debug!(stage = %internal_id, "Running stage");
        match self.run(&resolved, stdin).await {
            Ok(cmd) => result.run_result = cmd,
            Err(failure) => {
                result.run_result = failure.result;
                result.teardown_result = self.teardown_recorded().await;
                return Err(self.fail(result, StatusCode::RunError, failure.error));
            }
        }
        info!(stage = %internal_id, "Stage ran");

        debug!(stage = %internal_id, "Tearing down stage");
        match self.teardown().await {
            Ok(cmd) => result.teardown_result = cmd,
            Err(failure) => {
                result.teardown_result = failure.result;
                return Err(self.fail(result, StatusCode::TeardownError, failure.error));
            }
        }

        info!(
            stage = %internal_id,
            "Stage {} [{}/{}] executed successfully",
            internal_id,
            self.ctx.index + 1,
            self.ctx.total
        );
        Ok(result.finish(StatusCode::Ok, None))
    }

    /// Removes the stage checkout, if any.
    ///
    /// Safe to call repeatedly; calls after the first successful one do
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns a [`PhaseFailure`] if the checkout could not be removed.
    pub async fn teardown(&mut self) -> Result<CmdResult, PhaseFailure> {
        if self.torn_down {
            return Ok(CmdResult::ok());
        }
        let Some(dir) = self.checkout.clone() else {
            self.torn_down = true;
            return Ok(CmdResult::ok());
        };

        let start = now_utc();
        info!(dir = %dir.display(), "Removing fetched repository");
        match self.ports.fetcher.remove(&dir).await {
            Ok(()) => {
                self.torn_down = true;
                Ok(CmdResult::ok()
                    .with_dir(dir.display().to_string())
                    .with_times(start, now_utc()))
            }
            Err(e) => {
                let cmd = CmdResult::failed(StatusCode::SystemError.code(), e.to_string())
                    .with_dir(dir.display().to_string())
                    .with_times(start, now_utc());
                Err(PhaseFailure::new(cmd, e))
            }
        }
    }

    async fn teardown_recorded(&mut self) -> CmdResult {
        match self.teardown().await {
            Ok(cmd) => cmd,
            Err(failure) => {
                error!(
                    stage = %self.ctx.internal_id(self.stage),
                    error = %failure.error,
                    "Error tearing down stage after failure"
                );
                failure.result
            }
        }
    }

    async fn setup(&mut self) -> Result<(ResolvedStage, CmdResult), PhaseFailure> {
        let start = now_utc();
        let source = match &self.stage.repo {
            Some(repo) => Some(self.fetch(repo).await?),
            None => None,
        };
        let resolved = ResolvedStage::resolve(self.stage, self.ctx, source);
        let cmd = CmdResult::ok()
            .with_dir(resolved.base_dir.display().to_string())
            .with_times(start, now_utc());
        Ok((resolved, cmd))
    }

    async fn fetch(&mut self, repo: &str) -> Result<FetchedSource, PhaseFailure> {
        let start = now_utc();
        let dest = self.ctx.checkout_dir(&self.stage.effective_container_id());
        self.checkout = Some(dest.clone());

        info!(repo = %repo, dest = %dest.display(), "Fetching stage repository");
        match self.ports.fetcher.fetch(repo, &dest).await {
            Ok(source) => {
                info!(commit = %source.commit_id, dir = %source.dir.display(), "Repository fetched");
                if source.dir != dest {
                    self.checkout = Some(source.dir.clone());
                }
                Ok(source)
            }
            Err(e) => {
                let cmd = CmdResult::failed(StatusCode::SystemError.code(), e.to_string())
                    .with_dir(dest.display().to_string())
                    .with_times(start, now_utc());
                Err(PhaseFailure::new(cmd, e))
            }
        }
    }

    async fn build(&self, resolved: &ResolvedStage) -> Result<CmdResult, PhaseFailure> {
        let outcome = self
            .ports
            .runtime
            .build_image(&resolved.container_id, &resolved.work_dir, &resolved.build_env)
            .await;
        check_command("build", resolved, outcome)
    }

    async fn run(&self, resolved: &ResolvedStage, stdin: &str) -> Result<CmdResult, PhaseFailure> {
        let outcome = self
            .ports
            .runtime
            .run_image(
                &resolved.container_id,
                &resolved.work_dir,
                resolved.volume.as_ref(),
                stdin,
                &resolved.run_env,
            )
            .await;
        check_command("run", resolved, outcome)
    }

    fn fail(&self, result: StageExecutionResult, status: StatusCode, error: DockflowError) -> StageError {
        error!(
            stage = %self.ctx.internal_id(self.stage),
            status = %status,
            error = %error,
            "Stage failed"
        );
        let result = result.finish(status, Some(error.to_string()));
        StageError {
            stage: self.stage.name.clone(),
            status,
            source: error,
            result: Box::new(result),
        }
    }
}

fn check_command(
    phase: &str,
    resolved: &ResolvedStage,
    outcome: Result<CmdResult, RuntimeError>,
) -> Result<CmdResult, PhaseFailure> {
    match outcome {
        Ok(cmd) if cmd.succeeded() => Ok(cmd),
        Ok(cmd) => {
            let error = DockflowError::command_failed(phase, &resolved.internal_id, cmd.exit_status);
            Err(PhaseFailure::new(cmd, error))
        }
        Err(e) => {
            let cmd = match &e {
                RuntimeError::Spawn { cmd, dir, .. } => CmdResult::failed(NOT_STARTED, e.to_string())
                    .with_cmd(cmd.clone())
                    .with_dir(dir.clone()),
                _ => CmdResult::failed(NOT_STARTED, e.to_string())
                    .with_dir(resolved.work_dir.display().to_string()),
            };
            Err(PhaseFailure::new(cmd, e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FetchError;
    use crate::report::CollectingOutput;
    use crate::stages::SourceFetcher;
    use crate::testing::{MockContainerRuntime, MockSourceFetcher};
    use crate::utils::RunId;
    use async_trait::async_trait;
    use mockall::mock;
    use std::path::Path;
    use std::sync::Arc;

    mock! {
        Fetcher {}

        #[async_trait]
        impl SourceFetcher for Fetcher {
            async fn fetch(&self, repo: &str, dest: &Path) -> Result<FetchedSource, FetchError>;
            async fn remove(&self, dir: &Path) -> Result<(), FetchError>;
        }
    }

    fn ports(runtime: MockContainerRuntime, fetcher: Arc<dyn SourceFetcher>) -> ExecutionPorts {
        ExecutionPorts::new(Arc::new(runtime), fetcher).with_output(Arc::new(CollectingOutput::new()))
    }

    fn ctx() -> StageContext {
        StageContext::new("P", RunId::new(), "/tmp/dockflow-test").with_default_base_dir("/src")
    }

    #[tokio::test]
    async fn test_successful_stage() {
        let runtime = MockContainerRuntime::new().with_run_stdout("collect", "rows");
        let ports = ports(runtime, Arc::new(MockSourceFetcher::new()));
        let stage = Stage::new("collect", "trt13");
        let ctx = ctx();

        let mut run = StageRun::new(&stage, &ctx, &ports);
        let result = run.execute("input").await.unwrap();

        assert_eq!(result.status, StatusCode::Ok);
        assert_eq!(result.run_result.stdout, "rows");
        assert_eq!(result.run_result.stdin, "input");
        assert_eq!(result.stage.container_id.as_deref(), Some("collect"));
        assert!(result.error.is_none());
        assert!(run.is_torn_down());
    }

    #[tokio::test]
    async fn test_build_failure_skips_run() {
        let runtime = Arc::new(MockContainerRuntime::new().with_build_exit("collect", 1));
        let ports = ExecutionPorts::new(runtime.clone(), Arc::new(MockSourceFetcher::new()));
        let stage = Stage::new("collect", "trt13");
        let ctx = ctx();

        let err = StageRun::new(&stage, &ctx, &ports).execute("").await.unwrap_err();

        assert_eq!(err.status, StatusCode::BuildError);
        let result = err.into_result();
        assert_eq!(result.status, StatusCode::BuildError);
        assert_eq!(result.build_result.exit_status, 1);
        assert!(result.run_result.is_empty());
        assert!(runtime.run_calls().is_empty());
    }

    #[tokio::test]
    async fn test_build_spawn_failure() {
        let runtime = MockContainerRuntime::new().with_build_spawn_failure("collect");
        let ports = ports(runtime, Arc::new(MockSourceFetcher::new()));
        let stage = Stage::new("collect", "trt13");
        let ctx = ctx();

        let result = StageRun::new(&stage, &ctx, &ports)
            .execute("")
            .await
            .unwrap_err()
            .into_result();

        assert_eq!(result.status, StatusCode::BuildError);
        assert_eq!(result.build_result.exit_status, NOT_STARTED);
        assert!(result.build_result.cmd.contains("build"));
    }

    #[tokio::test]
    async fn test_run_failure() {
        let runtime = MockContainerRuntime::new().with_run_exit("collect", 4);
        let ports = ports(runtime, Arc::new(MockSourceFetcher::new()));
        let stage = Stage::new("collect", "trt13");
        let ctx = ctx();

        let result = StageRun::new(&stage, &ctx, &ports)
            .execute("")
            .await
            .unwrap_err()
            .into_result();

        assert_eq!(result.status, StatusCode::RunError);
        assert_eq!(result.run_result.exit_status, 4);
        assert!(result.error.unwrap().contains("Data Unavailable"));
    }

    #[tokio::test]
    async fn test_repo_stage_injects_commit_and_cleans_up() {
        let fetcher = Arc::new(MockSourceFetcher::new().with_commit("abc123"));
        let runtime = Arc::new(MockContainerRuntime::new());
        let ports = ExecutionPorts::new(runtime.clone(), fetcher.clone());
        let stage = Stage::new("collect", "trt13")
            .with_repo("github.com/dadosjusbr/coletores")
            .with_repo_version_env_var("GIT_COMMIT");
        let ctx = ctx();

        let result = StageRun::new(&stage, &ctx, &ports).execute("").await.unwrap();

        assert_eq!(result.commit_id.as_deref(), Some("abc123"));
        assert_eq!(result.stage.build_env.get("GIT_COMMIT"), Some(&"abc123".to_string()));
        assert_eq!(result.stage.run_env.get("GIT_COMMIT"), Some(&"abc123".to_string()));
        let checkout = PathBuf::from("/tmp/dockflow-test/collect");
        assert_eq!(result.stage.base_dir, Some(checkout.clone()));
        assert_eq!(runtime.build_calls()[0].work_dir, checkout.join("trt13"));
        assert_eq!(fetcher.removed(), vec![checkout]);
    }

    #[tokio::test]
    async fn test_teardown_failure_overrides_clean_run() {
        let fetcher = Arc::new(MockSourceFetcher::new().with_remove_failure());
        let ports = ExecutionPorts::new(Arc::new(MockContainerRuntime::new()), fetcher);
        let stage = Stage::new("collect", "trt13").with_repo("github.com/a/b");
        let ctx = ctx();

        let result = StageRun::new(&stage, &ctx, &ports)
            .execute("")
            .await
            .unwrap_err()
            .into_result();

        assert_eq!(result.status, StatusCode::TeardownError);
        assert!(result.build_result.succeeded());
        assert!(result.run_result.succeeded());
        assert_eq!(result.teardown_result.exit_status, StatusCode::SystemError.code());
    }

    #[tokio::test]
    async fn test_teardown_failure_does_not_mask_build_error() {
        let fetcher = Arc::new(MockSourceFetcher::new().with_remove_failure());
        let runtime = MockContainerRuntime::new().with_build_exit("collect", 1);
        let ports = ExecutionPorts::new(Arc::new(runtime), fetcher);
        let stage = Stage::new("collect", "trt13").with_repo("github.com/a/b");
        let ctx = ctx();

        let result = StageRun::new(&stage, &ctx, &ports)
            .execute("")
            .await
            .unwrap_err()
            .into_result();

        assert_eq!(result.status, StatusCode::BuildError);
        assert!(!result.teardown_result.succeeded());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_setup_error_and_never_builds() {
        let mut fetcher = MockFetcher::new();
        fetcher.expect_fetch().times(1).returning(|repo, _| {
            Err(FetchError::Network {
                repo: repo.to_string(),
                message: "Could not resolve host".to_string(),
            })
        });
        fetcher.expect_remove().times(1).returning(|_| Ok(()));
        let runtime = Arc::new(MockContainerRuntime::new());
        let ports = ExecutionPorts::new(runtime.clone(), Arc::new(fetcher));
        let stage = Stage::new("collect", "trt13").with_repo("github.com/a/b");
        let ctx = ctx();

        let result = StageRun::new(&stage, &ctx, &ports)
            .execute("")
            .await
            .unwrap_err()
            .into_result();

        assert_eq!(result.status, StatusCode::SetupError);
        assert!(result.setup_result.stderr.contains("Could not resolve host"));
        assert!(result.build_result.is_empty());
        assert!(runtime.build_calls().is_empty());
    }

    #[tokio::test]
    async fn test_local_stage_never_touches_fetcher() {
        let mut fetcher = MockFetcher::new();
        fetcher.expect_fetch().never();
        fetcher.expect_remove().never();
        let ports = ExecutionPorts::new(Arc::new(MockContainerRuntime::new()), Arc::new(fetcher));
        let stage = Stage::new("collect", "trt13");
        let ctx = ctx();

        let mut run = StageRun::new(&stage, &ctx, &ports);
        assert!(run.execute("").await.is_ok());
        assert!(run.teardown().await.is_ok());
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let mut fetcher = MockFetcher::new();
        fetcher.expect_fetch().returning(|_, dest| {
            Ok(FetchedSource {
                dir: dest.to_path_buf(),
                commit_id: "c0ffee".to_string(),
            })
        });
        fetcher.expect_remove().times(1).returning(|_| Ok(()));
        let ports = ExecutionPorts::new(Arc::new(MockContainerRuntime::new()), Arc::new(fetcher));
        let stage = Stage::new("collect", "trt13").with_repo("github.com/a/b");
        let ctx = ctx();

        let mut run = StageRun::new(&stage, &ctx, &ports);
        run.execute("").await.unwrap();
        tokio_test::assert_ok!(run.teardown().await);
        tokio_test::assert_ok!(run.teardown().await);
    }
}
