//! Execution result of a single stage.

use super::spec::Stage;
use crate::core::{CmdResult, StatusCode};
use crate::utils::{now_utc, Timestamp};
use serde::{Deserialize, Serialize};

/// What happened when a stage ran.
///
/// Holds one [`CmdResult`] per phase; phases that never ran keep an empty
/// result. `status` is assigned once, when the lifecycle returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageExecutionResult {
    /// The stage definition with resolved values filled in.
    pub stage: Stage,
    /// Commit of the stage repository, if one was fetched.
    #[serde(rename = "commit", default, skip_serializing_if = "Option::is_none")]
    pub commit_id: Option<String>,
    /// When the stage started.
    #[serde(rename = "start")]
    pub start_time: Timestamp,
    /// When the stage finished.
    #[serde(rename = "end")]
    pub finish_time: Timestamp,
    /// Setup phase.
    #[serde(rename = "setupResult", default)]
    pub setup_result: CmdResult,
    /// Build phase.
    #[serde(rename = "buildResult", default)]
    pub build_result: CmdResult,
    /// Run phase.
    #[serde(rename = "runResult", default)]
    pub run_result: CmdResult,
    /// Teardown phase.
    #[serde(rename = "teardownResult", default)]
    pub teardown_result: CmdResult,
    /// Terminal status.
    pub status: StatusCode,
    /// Failure description when `status` is not `Ok`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageExecutionResult {
    /// Starts a result for `stage`, stamping the start time.
    #[must_use]
    pub fn started(stage: Stage) -> Self {
        let now = now_utc();
        Self {
            stage,
            commit_id: None,
            start_time: now,
            finish_time: now,
            setup_result: CmdResult::default(),
            build_result: CmdResult::default(),
            run_result: CmdResult::default(),
            teardown_result: CmdResult::default(),
            status: StatusCode::Unknown,
            error: None,
        }
    }

    /// Finishes the result with its terminal status.
    #[must_use]
    pub fn finish(mut self, status: StatusCode, error: Option<String>) -> Self {
        self.status = status;
        self.error = error;
        self.finish_time = now_utc();
        self
    }

    /// A successful result for a stage that ran no commands.
    #[must_use]
    pub fn synthetic(stage: Stage) -> Self {
        Self::started(stage).finish(StatusCode::Ok, None)
    }

    /// Returns true if the stage succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status.is_ok()
    }

    /// Name of the stage.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.stage.name
    }

    /// The last phase whose command failed, with its result.
    #[must_use]
    pub fn failed_command(&self) -> Option<(&'static str, &CmdResult)> {
        [
            ("teardown", &self.teardown_result),
            ("run", &self.run_result),
            ("build", &self.build_result),
            ("setup", &self.setup_result),
        ]
        .into_iter()
        .find(|(_, cmd)| !cmd.is_empty() && !cmd.succeeded())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_started_then_finished() {
        let result = StageExecutionResult::started(Stage::new("a", "dir"));
        assert_eq!(result.status, StatusCode::Unknown);
        assert!(result.run_result.is_empty());

        let result = result.finish(StatusCode::BuildError, Some("boom".to_string()));
        assert_eq!(result.status, StatusCode::BuildError);
        assert!(result.finish_time >= result.start_time);
        assert!(!result.is_success());
    }

    #[test]
    fn test_synthetic() {
        let result = StageExecutionResult::synthetic(Stage::new("default-error-handler", ""));
        assert!(result.is_success());
        assert_eq!(result.name(), "default-error-handler");
    }

    #[test]
    fn test_failed_command_picks_failing_phase() {
        let mut result = StageExecutionResult::started(Stage::new("a", "dir"));
        assert!(result.failed_command().is_none());

        result.build_result = CmdResult::ok().with_cmd("docker build -t a .");
        result.run_result = CmdResult::failed(2, "boom").with_cmd("docker run -i --rm a");
        let (phase, cmd) = result.failed_command().unwrap();
        assert_eq!(phase, "run");
        assert_eq!(cmd.cmd, "docker run -i --rm a");
    }

    #[test]
    fn test_wire_names() {
        let result = StageExecutionResult::synthetic(Stage::new("a", "dir"));
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["status"], 0);
        assert!(value.get("setupResult").is_some());
        assert!(value.get("teardownResult").is_some());
        assert!(value.get("commit").is_none());
        assert!(value.get("error").is_none());
    }
}
