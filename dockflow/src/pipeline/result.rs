//! Execution result of a whole pipeline run.

use super::spec::Pipeline;
use crate::core::StatusCode;
use crate::stages::StageExecutionResult;
use crate::utils::{now_utc, RunId, Timestamp};
use serde::{Deserialize, Serialize};

/// Everything that happened during one pipeline run.
///
/// `status` tracks the last stage attempted; pipeline setup and teardown
/// failures override it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Pipeline name.
    pub name: String,
    /// Identifier of this run.
    #[serde(rename = "runId")]
    pub run_id: RunId,
    /// The pipeline definition that ran.
    pub pipeline: Pipeline,
    /// One entry per stage attempted, plus the error handler's entry when
    /// a handler stage ran.
    #[serde(rename = "stageResults", default)]
    pub stage_results: Vec<StageExecutionResult>,
    /// Why pipeline setup failed.
    #[serde(rename = "setupError", default, skip_serializing_if = "Option::is_none")]
    pub setup_error: Option<String>,
    /// Why pipeline teardown failed.
    #[serde(rename = "teardownError", default, skip_serializing_if = "Option::is_none")]
    pub teardown_error: Option<String>,
    /// When the run started.
    #[serde(rename = "start")]
    pub start_time: Timestamp,
    /// When the run finished.
    #[serde(rename = "final")]
    pub finish_time: Timestamp,
    /// Overall status.
    pub status: StatusCode,
}

impl PipelineResult {
    /// Starts a result for `pipeline`.
    #[must_use]
    pub fn started(pipeline: &Pipeline, run_id: RunId) -> Self {
        let now = now_utc();
        Self {
            name: pipeline.name.clone(),
            run_id,
            pipeline: pipeline.clone(),
            stage_results: Vec::new(),
            setup_error: None,
            teardown_error: None,
            start_time: now,
            finish_time: now,
            status: StatusCode::Ok,
        }
    }

    /// Records a pipeline setup failure.
    pub fn fail_setup(&mut self, error: impl Into<String>) {
        self.setup_error = Some(error.into());
        self.status = StatusCode::SetupError;
    }

    /// Records a pipeline teardown failure.
    pub fn fail_teardown(&mut self, error: impl Into<String>) {
        self.teardown_error = Some(error.into());
        self.status = StatusCode::TeardownError;
    }

    /// Appends a stage result and takes its status as the overall status.
    pub fn push_stage(&mut self, result: StageExecutionResult) {
        self.status = result.status;
        self.stage_results.push(result);
    }

    /// Appends the error handler's result; the overall status is unchanged.
    pub fn push_handler(&mut self, result: StageExecutionResult) {
        self.stage_results.push(result);
    }

    /// Stamps the finish time.
    pub fn finish(&mut self) {
        self.finish_time = now_utc();
    }

    /// Returns true if the run succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status.is_ok()
    }

    /// Result of the stage named `name`.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageExecutionResult> {
        self.stage_results.iter().find(|r| r.name() == name)
    }
}
