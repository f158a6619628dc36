//! Stage definitions as they appear in a pipeline descriptor.

use crate::errors::{PipelineValidationError, ValidationErrorInfo};
use crate::utils::EnvMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One phase of a pipeline: a directory that is built into an image and run.
///
/// A `Stage` is configuration. Values resolved while it runs (container id,
/// base directory, merged environment, volume) are recorded on a copy that is
/// embedded in the stage's execution result; the definition itself is never
/// modified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Stage {
    /// Stage name.
    pub name: String,
    /// Directory joined to the base directory; the image is built from it.
    pub dir: String,
    /// Repository to fetch the stage sources from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    /// Base directory for this stage, overriding the pipeline default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,
    /// Build variables, merged over the pipeline defaults.
    #[serde(skip_serializing_if = "EnvMap::is_empty")]
    pub build_env: EnvMap,
    /// Run variables, merged over the pipeline defaults.
    #[serde(skip_serializing_if = "EnvMap::is_empty")]
    pub run_env: EnvMap,
    /// Variable that receives the fetched commit id at build and run time.
    #[serde(alias = "repo_version_env_var", skip_serializing_if = "Option::is_none")]
    pub repo_version_env_var: Option<String>,
    /// Image tag; derived from the name when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    /// Shared volume mounted into the container.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_name: Option<String>,
    /// Mount point of the shared volume.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_dir: Option<String>,
}

impl Stage {
    /// Creates a stage built from `dir`.
    #[must_use]
    pub fn new(name: impl Into<String>, dir: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
            ..Self::default()
        }
    }

    /// Sets the repository to fetch.
    #[must_use]
    pub fn with_repo(mut self, repo: impl Into<String>) -> Self {
        self.repo = Some(repo.into());
        self
    }

    /// Sets the base directory.
    #[must_use]
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Adds a build variable.
    #[must_use]
    pub fn with_build_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.build_env.insert(key.into(), value.into());
        self
    }

    /// Adds a run variable.
    #[must_use]
    pub fn with_run_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.run_env.insert(key.into(), value.into());
        self
    }

    /// Sets the variable that receives the fetched commit id.
    #[must_use]
    pub fn with_repo_version_env_var(mut self, var: impl Into<String>) -> Self {
        self.repo_version_env_var = Some(var.into());
        self
    }

    /// Sets an explicit container id.
    #[must_use]
    pub fn with_container_id(mut self, id: impl Into<String>) -> Self {
        self.container_id = Some(id.into());
        self
    }

    /// Sets a stage-specific shared volume.
    #[must_use]
    pub fn with_volume(mut self, name: impl Into<String>, dir: impl Into<String>) -> Self {
        self.volume_name = Some(name.into());
        self.volume_dir = Some(dir.into());
        self
    }

    /// The container id this stage builds and runs.
    #[must_use]
    pub fn effective_container_id(&self) -> String {
        self.container_id
            .clone()
            .unwrap_or_else(|| derive_container_id(&self.name))
    }

    /// Validates the static configuration of the stage.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or fields conflict.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(invalid(
                self,
                "STAGE-NAME",
                "Stage name cannot be empty or whitespace-only".to_string(),
            ));
        }
        if self.repo.is_some() && self.base_dir.is_some() {
            return Err(invalid(
                self,
                "STAGE-REPO-BASE-DIR",
                format!("Stage '{}' sets both repo and base-dir", self.name),
            ));
        }
        if self.repo_version_env_var.is_some() && self.repo.is_none() {
            return Err(invalid(
                self,
                "STAGE-REPO-VERSION",
                format!(
                    "Stage '{}' sets repo-version-env-var without a repo",
                    self.name
                ),
            ));
        }
        if self.volume_name.is_some() != self.volume_dir.is_some() {
            return Err(invalid(
                self,
                "VOLUME-INCOMPLETE",
                format!(
                    "Stage '{}' must set volume-name and volume-dir together",
                    self.name
                ),
            ));
        }
        Ok(())
    }

    /// Returns true if every field has its default value.
    #[must_use]
    pub fn is_unset(&self) -> bool {
        self == &Self::default()
    }
}

fn invalid(stage: &Stage, code: &str, message: String) -> PipelineValidationError {
    let info = ValidationErrorInfo::new(code, message.clone()).with_context_entry("stage", &stage.name);
    PipelineValidationError::new(message)
        .with_stages(vec![stage.name.clone()])
        .with_error_info(info)
}

/// Derives a container id from a stage name: lower-cased, spaces as hyphens.
#[must_use]
pub fn derive_container_id(name: &str) -> String {
    name.to_lowercase().replace(' ', "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_container_id() {
        assert_eq!(derive_container_id("Get data from API"), "get-data-from-api");
        assert_eq!(derive_container_id("coleta"), "coleta");
    }

    #[test]
    fn test_explicit_container_id_wins() {
        let stage = Stage::new("Coleta TRT13", "trt13").with_container_id("trt13-collector");
        assert_eq!(stage.effective_container_id(), "trt13-collector");
        assert_eq!(
            Stage::new("Coleta TRT13", "trt13").effective_container_id(),
            "coleta-trt13"
        );
    }

    #[test]
    fn test_validate_ok() {
        let stage = Stage::new("collect", "trt13")
            .with_repo("github.com/dadosjusbr/coletores")
            .with_repo_version_env_var("GIT_COMMIT");
        assert!(stage.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_name() {
        let err = Stage::new("  ", "dir").validate().unwrap_err();
        assert_eq!(err.code(), Some("STAGE-NAME"));
    }

    #[test]
    fn test_validate_conflicts() {
        let both = Stage::new("a", "dir")
            .with_repo("github.com/a/b")
            .with_base_dir("/src");
        assert_eq!(both.validate().unwrap_err().code(), Some("STAGE-REPO-BASE-DIR"));

        let version_only = Stage::new("a", "dir").with_repo_version_env_var("GIT_COMMIT");
        assert_eq!(
            version_only.validate().unwrap_err().code(),
            Some("STAGE-REPO-VERSION")
        );

        let mut half_volume = Stage::new("a", "dir");
        half_volume.volume_name = Some("shared".to_string());
        assert_eq!(
            half_volume.validate().unwrap_err().code(),
            Some("VOLUME-INCOMPLETE")
        );
    }

    #[test]
    fn test_descriptor_field_names() {
        let json = r#"{
            "name": "Coleta",
            "dir": "trt13",
            "repo": "github.com/dadosjusbr/coletores",
            "build-env": {"GIT_COMMIT": "x"},
            "run-env": {"--mes": "04"},
            "repo_version_env_var": "GIT_COMMIT"
        }"#;
        let stage: Stage = serde_json::from_str(json).unwrap();

        assert_eq!(stage.name, "Coleta");
        assert_eq!(stage.build_env.get("GIT_COMMIT"), Some(&"x".to_string()));
        assert_eq!(stage.run_env.get("--mes"), Some(&"04".to_string()));
        assert_eq!(stage.repo_version_env_var.as_deref(), Some("GIT_COMMIT"));
    }

    #[test]
    fn test_empty_object_is_unset() {
        let stage: Stage = serde_json::from_str("{}").unwrap();
        assert!(stage.is_unset());
        assert!(!Stage::new("a", "b").is_unset());
    }
}
