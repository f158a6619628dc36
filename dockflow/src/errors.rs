//! Error types for the dockflow executor.
//!
//! Failures are separated by concern: pipeline validation, the container
//! runtime adapter, the source fetcher adapter, report serialization and
//! configuration. Stage failures are carried by [`StageError`], which always
//! keeps the complete execution result of the failed stage.

use crate::core::StatusCode;
use crate::stages::StageExecutionResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for dockflow operations.
#[derive(Debug, Error)]
pub enum DockflowError {
    /// The pipeline definition is not valid.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// The container runtime failed.
    #[error("{0}")]
    Runtime(#[from] RuntimeError),

    /// Fetching a stage repository failed.
    #[error("{0}")]
    Fetch(#[from] FetchError),

    /// A command ran but reported failure.
    #[error("{phase} failed for {stage}: status code {exit_status} ({status_text})")]
    CommandFailed {
        /// Phase that ran the command (build, run).
        phase: String,
        /// Stage identifier (`pipeline/stage`).
        stage: String,
        /// Process exit status.
        exit_status: i32,
        /// Text for the exit status when it matches a known status code.
        status_text: String,
    },
}

impl DockflowError {
    /// Creates a command failure for a phase.
    #[must_use]
    pub fn command_failed(phase: impl Into<String>, stage: impl Into<String>, exit_status: i32) -> Self {
        Self::CommandFailed {
            phase: phase.into(),
            stage: stage.into(),
            exit_status,
            status_text: StatusCode::from_code(exit_status).text().to_string(),
        }
    }
}

/// A stage finished with a status other than `Ok`.
///
/// The complete execution result is kept so callers can still render it.
#[derive(Debug, Error)]
#[error("Stage '{stage}' failed with {status}: {source}")]
pub struct StageError {
    /// Name of the failed stage.
    pub stage: String,
    /// Terminal status of the stage.
    pub status: StatusCode,
    /// What went wrong.
    #[source]
    pub source: DockflowError,
    /// Execution result of the stage.
    pub result: Box<StageExecutionResult>,
}

impl StageError {
    /// Returns the execution result of the failed stage.
    #[must_use]
    pub fn into_result(self) -> StageExecutionResult {
        *self.result
    }
}

/// Diagnostic details attached to a validation error.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ValidationErrorInfo {
    /// Error code (e.g., "PIPELINE-EMPTY").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ValidationErrorInfo {
    /// Creates new error info, picking up the default fix hint for the code.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        let code = code.into();
        let fix_hint = ValidationSuggestions::get(&code).map(String::from);
        Self {
            code,
            summary: summary.into(),
            fix_hint,
            context: HashMap::new(),
        }
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when pipeline validation fails.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional diagnostic info.
    pub error_info: Option<ValidationErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the diagnostic info.
    #[must_use]
    pub fn with_error_info(mut self, info: ValidationErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the diagnostic code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Errors reported by the container runtime adapter.
///
/// `Spawn` means the command could not even be started; a command that ran
/// and exited non-zero is reported through its `CmdResult` instead, or as
/// `NonZeroExit` by operations that return no result.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The command could not be started.
    #[error("Command was not executed correctly: `{cmd}`: {source}")]
    Spawn {
        /// The command line.
        cmd: String,
        /// Directory the command was started in.
        dir: String,
        /// The underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// The command ran and returned a non-zero status.
    #[error("`{cmd}` exited with status {exit_status}: {stderr}")]
    NonZeroExit {
        /// The command line.
        cmd: String,
        /// Exit status.
        exit_status: i32,
        /// Captured standard error.
        stderr: String,
    },

    /// Local filesystem failure around a runtime operation.
    #[error("Error preparing {path}: {source}")]
    Filesystem {
        /// The path involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl RuntimeError {
    /// Returns true if the command never started.
    #[must_use]
    pub const fn is_spawn(&self) -> bool {
        matches!(self, Self::Spawn { .. })
    }
}

/// Errors reported by the source fetcher adapter.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The repository reference could not be understood.
    #[error("Invalid repository reference '{repo}': {reason}")]
    InvalidReference {
        /// The reference as given.
        repo: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The remote could not be reached.
    #[error("Network error fetching '{repo}': {message}")]
    Network {
        /// The repository.
        repo: String,
        /// Fetcher output.
        message: String,
    },

    /// The remote rejected the credentials.
    #[error("Authentication failed fetching '{repo}': {message}")]
    Auth {
        /// The repository.
        repo: String,
        /// Fetcher output.
        message: String,
    },

    /// Local directory handling failed.
    #[error("Filesystem error at {path}: {source}")]
    Filesystem {
        /// The path involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The fetch command failed for another reason.
    #[error("Error fetching '{repo}': {message}")]
    Command {
        /// The repository.
        repo: String,
        /// Fetcher output.
        message: String,
    },
}

impl FetchError {
    /// Returns true for failures caused by the remote side.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Auth { .. })
    }
}

/// Errors raised while producing an execution report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while loading configuration or pipeline descriptors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration value could not be parsed.
    #[error("Invalid value '{value}' for {key}")]
    InvalidValue {
        /// The setting name.
        key: String,
        /// The rejected value.
        value: String,
    },

    /// A descriptor could not be read.
    #[error("Error reading {path}: {source}")]
    Read {
        /// The file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A descriptor could not be parsed.
    #[error("Error parsing pipeline descriptor: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Default fix hints for validation error codes.
pub struct ValidationSuggestions;

impl ValidationSuggestions {
    /// Gets a suggestion for a given error code.
    #[must_use]
    pub fn get(code: &str) -> Option<&'static str> {
        match code {
            "PIPELINE-EMPTY" => Some("Add at least one stage to the pipeline."),
            "PIPELINE-NAME" => Some("Give the pipeline a non-empty name."),
            "STAGE-NAME" => Some("Every stage needs a non-empty name."),
            "STAGE-DUPLICATE" => Some(
                "Two stages resolve to the same container id. \
                 Rename one of them or set an explicit container-id.",
            ),
            "STAGE-REPO-BASE-DIR" => Some(
                "A stage with a repo builds from the fetched checkout. \
                 Remove base-dir or repo.",
            ),
            "STAGE-REPO-VERSION" => Some(
                "repo-version-env-var only applies to stages with a repo.",
            ),
            "VOLUME-INCOMPLETE" => Some("Set both volume-name and volume-dir, or neither."),
            _ => None,
        }
    }
}
