//! # Dockflow
//!
//! Runs linear pipelines of container stages.
//!
//! Each stage is a directory that is built into an image and run. Stages run
//! strictly in order, the standard output of one stage becoming the standard
//! input of the next, and every run produces a complete report:
//!
//! - **Stage lifecycle**: setup (fetch sources, resolve environment), build,
//!   run and teardown, with one status per stage
//! - **Error handling**: the first failure is handed to an optional handler
//!   stage together with the report so far
//! - **Shared volumes**: created per run and removed when the run ends
//! - **Pluggable adapters**: the container runtime, source fetcher and report
//!   format are traits
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dockflow::prelude::*;
//!
//! let pipeline = Pipeline::from_file("pipeline.json")?;
//! let executor = PipelineExecutor::docker(&ExecutorConfig::from_env()?);
//!
//! let result = executor.run(&pipeline, None).await;
//! std::process::exit(result.status.code());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod pipeline;
pub mod report;
pub mod runtime;
pub mod stages;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::ExecutorConfig;
    pub use crate::core::{CmdResult, StatusCode, StatusError};
    pub use crate::errors::{
        ConfigError, DockflowError, FetchError, PipelineValidationError, ReportError,
        RuntimeError, StageError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{ErrorHandler, Pipeline, PipelineExecutor, PipelineResult};
    pub use crate::report::{
        JsonReportSerializer, OperatorOutput, ReportSerializer, StderrOutput,
        TextReportSerializer,
    };
    pub use crate::runtime::{DockerRuntime, GitFetcher};
    pub use crate::stages::{
        ContainerRuntime, ExecutionPorts, SourceFetcher, Stage, StageExecutionResult, StageRun,
        VolumeMount,
    };
    pub use crate::utils::{merge_env, EnvMap, RunId};
}

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
