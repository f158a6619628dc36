//! Ready-made pipelines and results for tests.

use std::sync::Arc;

use crate::core::{CmdResult, StatusCode};
use crate::events::CollectingEventSink;
use crate::pipeline::{Pipeline, PipelineExecutor, PipelineResult};
use crate::report::CollectingOutput;
use crate::stages::{Stage, StageExecutionResult};
use crate::utils::RunId;

use super::mocks::{MockContainerRuntime, MockSourceFetcher};

/// A stage built from a directory named like the stage.
#[must_use]
pub fn stage(name: &str) -> Stage {
    Stage::new(name, name)
}

/// A pipeline with one local stage per name.
#[must_use]
pub fn pipeline(name: &str, stages: &[&str]) -> Pipeline {
    stages
        .iter()
        .fold(Pipeline::new(name).with_default_base_dir("/src"), |p, s| {
            p.with_stage(stage(s))
        })
}

/// A finished result where `collect` succeeded and `parse` failed to build.
#[must_use]
pub fn failed_pipeline_result() -> PipelineResult {
    let definition = pipeline("fixture", &["collect", "parse"]);
    let mut result = PipelineResult::started(&definition, RunId::new());

    let mut collect = StageExecutionResult::started(stage("collect"));
    collect.run_result = CmdResult::ok().with_stdout("rows");
    result.push_stage(collect.finish(StatusCode::Ok, None));

    let mut parse = StageExecutionResult::started(stage("parse"));
    parse.build_result = CmdResult::failed(1, "syntax error")
        .with_cmd("docker build --build-arg YEAR=2020 -t parse .");
    result.push_stage(parse.finish(
        StatusCode::BuildError,
        Some("build failed for fixture/parse: status code 1 (Invalid Parameters)".to_string()),
    ));
    result.finish();
    result
}

/// An executor wired to mocks, with its output and events captured.
pub struct TestHarness {
    /// Container runtime.
    pub runtime: Arc<MockContainerRuntime>,
    /// Source fetcher.
    pub fetcher: Arc<MockSourceFetcher>,
    /// Reports written by the default error handler.
    pub output: Arc<CollectingOutput>,
    /// Emitted events.
    pub events: Arc<CollectingEventSink>,
    /// The executor.
    pub executor: PipelineExecutor,
}

impl TestHarness {
    /// Creates a harness around the given mocks.
    #[must_use]
    pub fn new(runtime: MockContainerRuntime, fetcher: MockSourceFetcher) -> Self {
        let runtime = Arc::new(runtime);
        let fetcher = Arc::new(fetcher);
        let output = Arc::new(CollectingOutput::new());
        let events = Arc::new(CollectingEventSink::new());
        let executor = PipelineExecutor::new(runtime.clone(), fetcher.clone())
            .with_output(output.clone())
            .with_event_sink(events.clone());
        Self {
            runtime,
            fetcher,
            output,
            events,
            executor,
        }
    }

    /// A harness where every command succeeds.
    #[must_use]
    pub fn succeeding() -> Self {
        Self::new(MockContainerRuntime::new(), MockSourceFetcher::new())
    }

    /// Uses `dir` as the workspace root.
    #[must_use]
    pub fn with_workspace_root(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.executor = self.executor.with_workspace_root(dir);
        self
    }

    /// Runs `pipeline` with `input`.
    pub async fn run(&self, pipeline: &Pipeline, input: Option<&str>) -> PipelineResult {
        self.executor
            .run(pipeline, input.map(String::from))
            .await
    }
}
