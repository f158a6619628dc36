//! Testing utilities for dockflow pipelines.
//!
//! This module provides:
//! - Scriptable container runtime and source fetcher mocks
//! - Fixture pipelines and a mock-backed executor harness
//! - Assertions over pipeline and stage results

mod assertions;
pub mod fixtures;
mod mocks;

pub use assertions::{
    assert_pipeline_status, assert_stage_names, assert_stage_status, assert_stage_statuses,
};
pub use fixtures::TestHarness;
pub use mocks::{BuildCall, MockContainerRuntime, MockSourceFetcher, RunCall};
