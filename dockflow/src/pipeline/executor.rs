//! Runs pipelines.
//!
//! A run validates the pipeline, brings up its volumes, drives every stage in
//! order (each stage's run output is the next stage's input), hands the first
//! failure to the error handler and finally tears the volumes down.
//! Every run gets its own [`RunId`]; volume names and checkout directories are
//! scoped by it so runs never share resources.

use super::error_handler;
use super::result::PipelineResult;
use super::spec::Pipeline;
use crate::config::ExecutorConfig;
use crate::core::StatusCode;
use crate::errors::{DockflowError, RuntimeError};
use crate::events::{self, EventSink, NoOpEventSink};
use crate::report::{OperatorOutput, ReportSerializer};
use crate::runtime::{DockerRuntime, GitFetcher};
use crate::stages::{
    ContainerRuntime, ExecutionPorts, SourceFetcher, StageContext, StageExecutionResult,
    StageRun, VolumeMount,
};
use crate::utils::{elapsed_ms, RunId};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Executes pipelines against a set of ports.
#[derive(Clone)]
pub struct PipelineExecutor {
    ports: ExecutionPorts,
    event_sink: Arc<dyn EventSink>,
    workspace_root: PathBuf,
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("ports", &self.ports)
            .field("workspace_root", &self.workspace_root)
            .finish_non_exhaustive()
    }
}

impl PipelineExecutor {
    /// Creates an executor over the given adapters.
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>, fetcher: Arc<dyn SourceFetcher>) -> Self {
        Self {
            ports: ExecutionPorts::new(runtime, fetcher),
            event_sink: Arc::new(NoOpEventSink),
            workspace_root: std::env::temp_dir(),
        }
    }

    /// Creates an executor that uses the container CLI and git.
    #[must_use]
    pub fn docker(config: &ExecutorConfig) -> Self {
        Self::new(
            Arc::new(DockerRuntime::from_config(config)),
            Arc::new(GitFetcher::from_config(config)),
        )
        .with_workspace_root(config.workspace_root.clone())
    }

    /// Sets the report serializer.
    #[must_use]
    pub fn with_serializer(mut self, serializer: Arc<dyn ReportSerializer>) -> Self {
        self.ports = self.ports.with_serializer(serializer);
        self
    }

    /// Sets where the default error handler writes reports.
    #[must_use]
    pub fn with_output(mut self, output: Arc<dyn OperatorOutput>) -> Self {
        self.ports = self.ports.with_output(output);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Sets the directory under which runs keep fetched sources.
    #[must_use]
    pub fn with_workspace_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workspace_root = dir.into();
        self
    }

    /// The ports stages run against.
    #[must_use]
    pub const fn ports(&self) -> &ExecutionPorts {
        &self.ports
    }

    /// Runs `pipeline` with a fresh run id.
    ///
    /// `input` is the first stage's standard input; `None` means empty.
    pub async fn run(&self, pipeline: &Pipeline, input: Option<String>) -> PipelineResult {
        self.run_with_id(pipeline, input, RunId::new()).await
    }

    /// Runs `pipeline` as run `run_id`.
    ///
    /// Always returns a complete result; failures are recorded in it.
    pub async fn run_with_id(
        &self,
        pipeline: &Pipeline,
        input: Option<String>,
        run_id: RunId,
    ) -> PipelineResult {
        let mut result = PipelineResult::started(pipeline, run_id);
        let run_dir = self.workspace_root.join(format!("dockflow-{run_id}"));

        info!(
            pipeline = %pipeline.name,
            run_id = %run_id,
            stages = pipeline.stages.len(),
            "Executing pipeline"
        );
        self.event_sink
            .emit(
                events::PIPELINE_STARTED,
                Some(json!({
                    "pipeline": pipeline.name,
                    "run_id": run_id,
                    "stages": pipeline.stages.len(),
                })),
            )
            .await;

        let mut volumes = Vec::new();
        let shared = match self.setup(pipeline, run_id, &mut volumes).await {
            Ok(shared) => shared,
            Err(e) => {
                error!(pipeline = %pipeline.name, error = %e, "Error setting up pipeline");
                result.fail_setup(e.to_string());
                self.event_sink
                    .emit(
                        events::PIPELINE_SETUP_FAILED,
                        Some(json!({"pipeline": pipeline.name, "error": e.to_string()})),
                    )
                    .await;
                if !volumes.is_empty() {
                    if let Err(e) = self.teardown(pipeline, &volumes, &run_dir).await {
                        warn!(pipeline = %pipeline.name, error = %e, "Error removing volumes after failed setup");
                    }
                }
                return self.complete(result).await;
            }
        };

        let ctx = StageContext::new(&pipeline.name, run_id, &run_dir)
            .with_default_base_dir(&pipeline.default_base_dir)
            .with_default_env(
                pipeline.default_build_env.clone(),
                pipeline.default_run_env.clone(),
            )
            .with_volume(shared);
        self.run_stages(pipeline, &ctx, input.unwrap_or_default(), &mut result)
            .await;

        if let Err(e) = self.teardown(pipeline, &volumes, &run_dir).await {
            error!(pipeline = %pipeline.name, error = %e, "Error tearing down pipeline");
            result.fail_teardown(e.to_string());
            self.event_sink
                .emit(
                    events::PIPELINE_TEARDOWN_FAILED,
                    Some(json!({"pipeline": pipeline.name, "error": e.to_string()})),
                )
                .await;
        }

        self.complete(result).await
    }

    /// Validates the pipeline and creates its volumes: the shared one, then
    /// every stage-level volume. Created volumes are pushed to `volumes` as
    /// they come up, so a partial setup can still be torn down.
    async fn setup(
        &self,
        pipeline: &Pipeline,
        run_id: RunId,
        volumes: &mut Vec<VolumeMount>,
    ) -> Result<Option<VolumeMount>, DockflowError> {
        pipeline.validate()?;

        let shared = match pipeline.volume() {
            Some((name, dir)) => {
                let mount = self.create_volume(pipeline, run_id, name, dir).await?;
                volumes.push(mount.clone());
                Some(mount)
            }
            None => None,
        };

        for stage in pipeline.stages.iter().chain(pipeline.error_handler.stage()) {
            let (Some(name), Some(dir)) = (&stage.volume_name, &stage.volume_dir) else {
                continue;
            };
            let scoped = run_id.scoped(name);
            if volumes.iter().any(|v| v.name == scoped) {
                continue;
            }
            volumes.push(self.create_volume(pipeline, run_id, name, dir).await?);
        }
        Ok(shared)
    }

    async fn create_volume(
        &self,
        pipeline: &Pipeline,
        run_id: RunId,
        name: &str,
        dir: &str,
    ) -> Result<VolumeMount, DockflowError> {
        let host_dir = Path::new(dir);
        tokio::fs::create_dir_all(host_dir)
            .await
            .map_err(|source| RuntimeError::Filesystem {
                path: host_dir.to_path_buf(),
                source,
            })?;
        let scoped = run_id.scoped(name);
        self.ports.runtime.create_volume(host_dir, &scoped).await?;
        info!(pipeline = %pipeline.name, volume = %scoped, dir = %dir, "Volume created");
        Ok(VolumeMount::new(scoped, dir))
    }

    async fn run_stages(
        &self,
        pipeline: &Pipeline,
        ctx: &StageContext,
        mut stdin: String,
        result: &mut PipelineResult,
    ) {
        let total = pipeline.stages.len();
        for (index, stage) in pipeline.stages.iter().enumerate() {
            let stage_ctx = ctx.at(index, total);
            self.event_sink
                .emit(
                    events::STAGE_STARTED,
                    Some(json!({"stage": stage.name, "index": index, "total": total})),
                )
                .await;

            let mut run = StageRun::new(stage, &stage_ctx, &self.ports);
            match run.execute(&stdin).await {
                Ok(stage_result) => {
                    stdin.clone_from(&stage_result.run_result.stdout);
                    self.event_sink
                        .emit(events::STAGE_COMPLETED, Some(stage_event(&stage_result)))
                        .await;
                    result.push_stage(stage_result);
                }
                Err(err) => {
                    let failed_in_teardown = err.status == StatusCode::TeardownError;
                    let stage_result = err.into_result();
                    self.event_sink
                        .emit(events::STAGE_FAILED, Some(stage_event(&stage_result)))
                        .await;
                    result.push_stage(stage_result.clone());

                    if !failed_in_teardown {
                        if let Err(failure) = run.teardown().await {
                            warn!(
                                stage = %ctx.internal_id(stage),
                                error = %failure.error,
                                "Error tearing down failed stage"
                            );
                        }
                    }
                    self.handle_failure(pipeline, ctx, &stage_result, result).await;
                    break;
                }
            }
        }
    }

    async fn handle_failure(
        &self,
        pipeline: &Pipeline,
        ctx: &StageContext,
        failing: &StageExecutionResult,
        result: &mut PipelineResult,
    ) {
        let total = pipeline.stages.len();
        self.event_sink
            .emit(
                events::ERROR_HANDLER_INVOKED,
                Some(json!({
                    "stage": failing.name(),
                    "status": failing.status,
                    "handler": pipeline.error_handler.stage().map(|s| s.name.as_str()),
                })),
            )
            .await;

        let handler_ctx = ctx.at(total, total + 1);
        let outcome = error_handler::handle(
            failing,
            result,
            &pipeline.error_handler,
            &self.ports,
            &handler_ctx,
        )
        .await;
        if !pipeline.error_handler.is_configured() {
            return;
        }
        match outcome {
            Ok(handler_result) => result.push_handler(handler_result),
            Err(err) => result.push_handler(err.into_result()),
        }
    }

    async fn teardown(
        &self,
        pipeline: &Pipeline,
        volumes: &[VolumeMount],
        run_dir: &Path,
    ) -> Result<(), DockflowError> {
        let mut errors: Vec<DockflowError> = Vec::new();

        for v in volumes {
            info!(pipeline = %pipeline.name, volume = %v.name, "Removing volume");
            if let Err(e) = self.ports.runtime.remove_volume(&v.name).await {
                errors.push(e.into());
            }
            if pipeline.skip_volume_dir_cleanup {
                info!(dir = %v.dir, "Keeping volume directory");
            } else if let Err(e) = remove_dir(Path::new(&v.dir)).await {
                errors.push(e.into());
            }
        }

        if let Err(e) = remove_dir(run_dir).await {
            warn!(dir = %run_dir.display(), error = %e, "Could not remove run workspace");
        }

        match errors.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn complete(&self, mut result: PipelineResult) -> PipelineResult {
        result.finish();
        let elapsed = elapsed_ms(&result.start_time, &result.finish_time);
        if result.is_success() {
            info!(
                pipeline = %result.name,
                run_id = %result.run_id,
                elapsed_ms = elapsed,
                "Pipeline executed successfully"
            );
        } else {
            error!(
                pipeline = %result.name,
                run_id = %result.run_id,
                status = %result.status,
                elapsed_ms = elapsed,
                "Pipeline failed"
            );
        }
        self.event_sink
            .emit(
                events::PIPELINE_COMPLETED,
                Some(json!({
                    "pipeline": result.name,
                    "run_id": result.run_id,
                    "status": result.status,
                    "stages": result.stage_results.len(),
                })),
            )
            .await;
        result
    }
}

fn stage_event(result: &StageExecutionResult) -> serde_json::Value {
    json!({
        "stage": result.name(),
        "status": result.status,
        "error": result.error,
    })
}

async fn remove_dir(dir: &Path) -> Result<(), RuntimeError> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(RuntimeError::Filesystem {
            path: dir.to_path_buf(),
            source,
        }),
    }
}
