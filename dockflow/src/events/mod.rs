//! Pipeline lifecycle events.
//!
//! The executor reports progress to an [`EventSink`] in addition to logging
//! it. Event names are dotted, `<subject>.<what happened>`.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Pipeline execution began.
pub const PIPELINE_STARTED: &str = "pipeline.started";
/// Validation or volume setup failed; no stage ran.
pub const PIPELINE_SETUP_FAILED: &str = "pipeline.setup_failed";
/// A stage started its lifecycle.
pub const STAGE_STARTED: &str = "stage.started";
/// A stage finished with `Ok`.
pub const STAGE_COMPLETED: &str = "stage.completed";
/// A stage finished with a failure status.
pub const STAGE_FAILED: &str = "stage.failed";
/// The error handler was invoked for a failed stage.
pub const ERROR_HANDLER_INVOKED: &str = "error_handler.invoked";
/// Pipeline teardown failed.
pub const PIPELINE_TEARDOWN_FAILED: &str = "pipeline.teardown_failed";
/// Pipeline execution finished, successfully or not.
pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
