//! Assertions over execution results.

use crate::core::StatusCode;
use crate::pipeline::PipelineResult;
use crate::stages::StageExecutionResult;

/// Asserts the overall status of a run.
pub fn assert_pipeline_status(result: &PipelineResult, expected: StatusCode) {
    assert_eq!(
        result.status, expected,
        "Expected pipeline status {:?}, got {:?} (setup: {:?}, teardown: {:?})",
        expected, result.status, result.setup_error, result.teardown_error
    );
}

/// Asserts the status of one stage result.
pub fn assert_stage_status(result: &StageExecutionResult, expected: StatusCode) {
    assert_eq!(
        result.status,
        expected,
        "Expected stage '{}' status {:?}, got {:?}: {:?}",
        result.name(),
        expected,
        result.status,
        result.error
    );
}

/// Asserts the names of the recorded stage results, in order.
pub fn assert_stage_names(result: &PipelineResult, expected: &[&str]) {
    let names: Vec<&str> = result
        .stage_results
        .iter()
        .map(StageExecutionResult::name)
        .collect();
    assert_eq!(names, expected, "Unexpected stage results");
}

/// Asserts the statuses of the recorded stage results, in order.
pub fn assert_stage_statuses(result: &PipelineResult, expected: &[StatusCode]) {
    let statuses: Vec<StatusCode> = result.stage_results.iter().map(|r| r.status).collect();
    assert_eq!(statuses, expected, "Unexpected stage statuses");
}
