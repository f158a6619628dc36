//! Pipeline definitions and execution.
//!
//! This module provides:
//! - Pipeline descriptors and their validation
//! - The error handling protocol run after a stage fails
//! - The executor that drives a whole run

mod error_handler;
mod executor;
mod result;
mod spec;

pub use error_handler::{handle as handle_failure, DEFAULT_HANDLER_NAME};
pub use executor::PipelineExecutor;
pub use result::PipelineResult;
pub use spec::{ErrorHandler, Pipeline};
