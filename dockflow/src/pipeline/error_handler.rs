//! What happens after a stage fails.
//!
//! The accumulated pipeline result is serialized into a report. Without a
//! handler stage the report goes to the operator output. With one, the
//! report becomes the handler's standard input.

use super::result::PipelineResult;
use super::spec::ErrorHandler;
use crate::core::StatusCode;
use crate::errors::StageError;
use crate::stages::{ExecutionPorts, Stage, StageContext, StageExecutionResult, StageRun};
use tracing::{error, info, warn};

/// Name recorded on the synthetic result of the default handler.
pub const DEFAULT_HANDLER_NAME: &str = "default-error-handler";

/// Handles the failure of `failing`.
///
/// The default handler never fails and returns a synthetic `Ok` result. A
/// handler stage that fails is reported with `ErrorHandlerError`; the
/// returned error carries its full result.
///
/// # Errors
///
/// Returns a [`StageError`] when the handler stage fails.
pub async fn handle(
    failing: &StageExecutionResult,
    accumulated: &PipelineResult,
    handler: &ErrorHandler,
    ports: &ExecutionPorts,
    ctx: &StageContext,
) -> Result<StageExecutionResult, StageError> {
    warn!(
        pipeline = %accumulated.name,
        stage = %failing.name(),
        status = %failing.status,
        "Handling stage failure"
    );
    let report = render_report(accumulated, ports);

    let Some(stage) = handler.stage() else {
        info!(pipeline = %accumulated.name, "No error handler configured, writing report");
        ports.output.write_report(&report);
        return Ok(StageExecutionResult::synthetic(Stage::new(DEFAULT_HANDLER_NAME, "")));
    };

    info!(
        pipeline = %accumulated.name,
        handler = %stage.name,
        "Running error handler stage"
    );
    let mut run = StageRun::new(stage, ctx, ports);
    match run.execute(&report).await {
        Ok(result) => Ok(result),
        Err(err) => {
            error!(
                pipeline = %accumulated.name,
                handler = %stage.name,
                error = %err,
                "Error handler stage failed"
            );
            let phase_status = err.status;
            let mut result = *err.result;
            result.status = StatusCode::ErrorHandlerError;
            result.error = Some(format!(
                "{} ({})",
                result.error.unwrap_or_default(),
                phase_status
            ));
            Err(StageError {
                stage: err.stage,
                status: StatusCode::ErrorHandlerError,
                source: err.source,
                result: Box::new(result),
            })
        }
    }
}

/// Serializes `accumulated`, falling back to a minimal JSON document when
/// the configured serializer fails.
fn render_report(accumulated: &PipelineResult, ports: &ExecutionPorts) -> String {
    match ports.serializer.serialize(accumulated) {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, format = ports.serializer.format_name(), "Failed to serialize report");
            serde_json::json!({
                "name": accumulated.name,
                "runId": accumulated.run_id,
                "status": accumulated.status,
                "reportError": e.to_string(),
            })
            .to_string()
        }
    }
}
