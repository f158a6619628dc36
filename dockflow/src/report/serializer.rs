//! Report serializers.

use crate::errors::ReportError;
use crate::pipeline::PipelineResult;
use crate::utils::format_timestamp;
use std::fmt::Write;

/// Renders a pipeline result as text.
pub trait ReportSerializer: Send + Sync {
    /// Serializes `result`.
    ///
    /// # Errors
    ///
    /// Returns an error if the result cannot be rendered.
    fn serialize(&self, result: &PipelineResult) -> Result<String, ReportError>;

    /// Short name of the format, e.g. `json`.
    fn format_name(&self) -> &'static str;
}

/// JSON reports, the machine readable format.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonReportSerializer {
    pretty: bool,
}

impl JsonReportSerializer {
    /// Indented JSON.
    #[must_use]
    pub const fn pretty() -> Self {
        Self { pretty: true }
    }

    /// Single-line JSON.
    #[must_use]
    pub const fn compact() -> Self {
        Self { pretty: false }
    }
}

impl ReportSerializer for JsonReportSerializer {
    fn serialize(&self, result: &PipelineResult) -> Result<String, ReportError> {
        let text = if self.pretty {
            serde_json::to_string_pretty(result)?
        } else {
            serde_json::to_string(result)?
        };
        Ok(text)
    }

    fn format_name(&self) -> &'static str {
        "json"
    }
}

/// Human readable summary: one line for the run and one per stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextReportSerializer;

impl ReportSerializer for TextReportSerializer {
    fn serialize(&self, result: &PipelineResult) -> Result<String, ReportError> {
        let mut out = String::new();
        // Writing to a String cannot fail.
        let _ = writeln!(
            out,
            "Pipeline '{}' run {}: {} ({})",
            result.name,
            result.run_id,
            result.status.code(),
            result.status
        );
        let _ = writeln!(
            out,
            "  started {} finished {}",
            format_timestamp(&result.start_time),
            format_timestamp(&result.finish_time)
        );
        if let Some(error) = &result.setup_error {
            let _ = writeln!(out, "  setup error: {error}");
        }
        for (i, stage) in result.stage_results.iter().enumerate() {
            let _ = write!(
                out,
                "  [{}] {}: {} ({})",
                i + 1,
                stage.name(),
                stage.status.code(),
                stage.status
            );
            if let Some(commit) = &stage.commit_id {
                let _ = write!(out, " commit {commit}");
            }
            if let Some((phase, cmd)) = stage.failed_command().filter(|(_, c)| !c.cmd.is_empty()) {
                let _ = write!(out, " {phase} failed: $ {}", cmd.cmd);
            }
            let _ = writeln!(out);
            if let Some(error) = &stage.error {
                let _ = writeln!(out, "      {error}");
            }
        }
        if let Some(error) = &result.teardown_error {
            let _ = writeln!(out, "  teardown error: {error}");
        }
        Ok(out)
    }

    fn format_name(&self) -> &'static str {
        "text"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StatusCode;
    use crate::testing::fixtures;

    #[test]
    fn test_json_serializer_round_trips_status() {
        let result = fixtures::failed_pipeline_result();
        let json = JsonReportSerializer::compact().serialize(&result).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert!(!json.contains('\n'));
        assert_eq!(value["status"], StatusCode::BuildError.code());
        assert_eq!(value["stageResults"].as_array().unwrap().len(), 2);
        assert_eq!(value["stageResults"][1]["buildResult"]["status"], 1);
    }

    #[test]
    fn test_pretty_json_is_indented() {
        let result = fixtures::failed_pipeline_result();
        let json = JsonReportSerializer::pretty().serialize(&result).unwrap();
        assert!(json.contains("\n  \"name\""));
    }

    #[test]
    fn test_text_serializer() {
        let result = fixtures::failed_pipeline_result();
        let text = TextReportSerializer.serialize(&result).unwrap();

        assert!(text.starts_with("Pipeline 'fixture' run "));
        assert!(text.contains(": 8 (Build Error)"));
        assert!(text.contains("[1] collect: 0 (OK)"));
        assert!(text.contains(
            "[2] parse: 8 (Build Error) build failed: $ docker build --build-arg YEAR=2020 -t parse ."
        ));
        assert!(!text.contains("[1] collect: 0 (OK) "));
        assert_eq!(TextReportSerializer.format_name(), "text");
    }
}
