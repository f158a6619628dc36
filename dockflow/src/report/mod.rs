//! Execution reports.
//!
//! A [`ReportSerializer`] renders a [`PipelineResult`](crate::pipeline::PipelineResult)
//! and an [`OperatorOutput`] receives the reports the default error handler
//! produces.

mod output;
mod serializer;

pub use output::{CollectingOutput, OperatorOutput, StderrOutput};
pub use serializer::{JsonReportSerializer, ReportSerializer, TextReportSerializer};
