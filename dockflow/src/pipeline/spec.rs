//! Pipeline definitions.

use crate::errors::{ConfigError, PipelineValidationError, ValidationErrorInfo};
use crate::stages::Stage;
use crate::utils::EnvMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The stage run when another stage fails.
///
/// Descriptors express "no handler" by omitting the field or by leaving it
/// as an empty object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<Stage>", into = "Option<Stage>")]
pub enum ErrorHandler {
    /// Failures are reported to the operator output.
    #[default]
    NoHandler,
    /// Failures are piped into this stage.
    Handler(Box<Stage>),
}

impl ErrorHandler {
    /// Returns the handler stage, if one is configured.
    #[must_use]
    pub fn stage(&self) -> Option<&Stage> {
        match self {
            Self::NoHandler => None,
            Self::Handler(stage) => Some(stage),
        }
    }

    /// Returns true if a handler stage is configured.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        matches!(self, Self::Handler(_))
    }
}

impl From<Option<Stage>> for ErrorHandler {
    fn from(stage: Option<Stage>) -> Self {
        match stage {
            Some(stage) if !stage.is_unset() => Self::Handler(Box::new(stage)),
            _ => Self::NoHandler,
        }
    }
}

impl From<ErrorHandler> for Option<Stage> {
    fn from(handler: ErrorHandler) -> Self {
        match handler {
            ErrorHandler::NoHandler => None,
            ErrorHandler::Handler(stage) => Some(*stage),
        }
    }
}

/// A named, ordered sequence of stages with shared defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Pipeline {
    /// Pipeline name.
    pub name: String,
    /// Stages, run in order.
    pub stages: Vec<Stage>,
    /// Base directory for stages that set none.
    pub default_base_dir: PathBuf,
    /// Build variables every stage starts from.
    #[serde(skip_serializing_if = "EnvMap::is_empty")]
    pub default_build_env: EnvMap,
    /// Run variables every stage starts from.
    #[serde(skip_serializing_if = "EnvMap::is_empty")]
    pub default_run_env: EnvMap,
    /// Stage run when another stage fails.
    #[serde(skip_serializing_if = "is_no_handler")]
    pub error_handler: ErrorHandler,
    /// Shared volume name. The created volume gets a per-run suffix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_name: Option<String>,
    /// Host directory backing the shared volume; also its mount point.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_dir: Option<String>,
    /// Keep the volume directory when the pipeline tears down.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub skip_volume_dir_cleanup: bool,
}

fn is_no_handler(handler: &ErrorHandler) -> bool {
    !handler.is_configured()
}

impl Pipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Parses a JSON descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor is not valid JSON for a pipeline.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON descriptor file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Appends a stage.
    #[must_use]
    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Sets the default base directory.
    #[must_use]
    pub fn with_default_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.default_base_dir = dir.into();
        self
    }

    /// Adds a default build variable.
    #[must_use]
    pub fn with_default_build_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_build_env.insert(key.into(), value.into());
        self
    }

    /// Adds a default run variable.
    #[must_use]
    pub fn with_default_run_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_run_env.insert(key.into(), value.into());
        self
    }

    /// Sets the error handler stage.
    #[must_use]
    pub fn with_error_handler(mut self, stage: Stage) -> Self {
        self.error_handler = ErrorHandler::Handler(Box::new(stage));
        self
    }

    /// Sets the shared volume.
    #[must_use]
    pub fn with_volume(mut self, name: impl Into<String>, dir: impl Into<String>) -> Self {
        self.volume_name = Some(name.into());
        self.volume_dir = Some(dir.into());
        self
    }

    /// Keeps the volume directory on teardown.
    #[must_use]
    pub fn with_skip_volume_dir_cleanup(mut self, skip: bool) -> Self {
        self.skip_volume_dir_cleanup = skip;
        self
    }

    /// Returns the configured shared volume as `(name, dir)`.
    #[must_use]
    pub fn volume(&self) -> Option<(&str, &str)> {
        match (&self.volume_name, &self.volume_dir) {
            (Some(name), Some(dir)) => Some((name.as_str(), dir.as_str())),
            _ => None,
        }
    }

    /// Validates the pipeline and every stage, including the error handler.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(pipeline_error(
                "PIPELINE-NAME",
                "Pipeline name cannot be empty".to_string(),
                Vec::new(),
            ));
        }
        if self.stages.is_empty() {
            return Err(pipeline_error(
                "PIPELINE-EMPTY",
                format!("Pipeline '{}' has no stages", self.name),
                Vec::new(),
            ));
        }
        if self.volume_name.is_some() != self.volume_dir.is_some() {
            return Err(pipeline_error(
                "VOLUME-INCOMPLETE",
                format!(
                    "Pipeline '{}' must set volume-name and volume-dir together",
                    self.name
                ),
                Vec::new(),
            ));
        }

        let mut seen: HashMap<String, &str> = HashMap::new();
        for stage in &self.stages {
            stage.validate()?;
            let id = stage.effective_container_id();
            if let Some(previous) = seen.insert(id.clone(), &stage.name) {
                return Err(pipeline_error(
                    "STAGE-DUPLICATE",
                    format!(
                        "Stages '{previous}' and '{}' share container id '{id}'",
                        stage.name
                    ),
                    vec![previous.to_string(), stage.name.clone()],
                ));
            }
        }

        if let Some(handler) = self.error_handler.stage() {
            handler.validate()?;
        }
        Ok(())
    }
}

fn pipeline_error(code: &str, message: String, stages: Vec<String>) -> PipelineValidationError {
    PipelineValidationError::new(message.clone())
        .with_stages(stages)
        .with_error_info(ValidationErrorInfo::new(code, message))
}
