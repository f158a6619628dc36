//! Stages and their lifecycle.
//!
//! A [`Stage`] is a directory built into a container image and run. Running a
//! stage goes through setup, build, run and teardown, driven by [`StageRun`]
//! against the [`ExecutionPorts`] of the pipeline.

mod context;
mod lifecycle;
mod ports;
mod result;
mod spec;

pub use context::{ResolvedStage, StageContext};
pub use lifecycle::{PhaseFailure, StageRun};
pub use ports::{ContainerRuntime, ExecutionPorts, FetchedSource, SourceFetcher, VolumeMount};
pub use result::StageExecutionResult;
pub use spec::{derive_container_id, Stage};
