//! Executor configuration.
//!
//! Values come from defaults, then `DOCKFLOW_*` environment variables, then
//! explicit builder calls (the CLI maps its flags onto these).

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable overriding [`ExecutorConfig::container_bin`].
pub const ENV_CONTAINER_BIN: &str = "DOCKFLOW_CONTAINER_BIN";
/// Environment variable overriding [`ExecutorConfig::git_bin`].
pub const ENV_GIT_BIN: &str = "DOCKFLOW_GIT_BIN";
/// Environment variable overriding [`ExecutorConfig::workspace_root`].
pub const ENV_WORKSPACE: &str = "DOCKFLOW_WORKSPACE";
/// Environment variable overriding [`ExecutorConfig::capture_env`].
pub const ENV_CAPTURE_ENV: &str = "DOCKFLOW_CAPTURE_ENV";

/// Settings for the concrete adapters and per-run resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Container CLI binary.
    #[serde(default = "default_container_bin")]
    pub container_bin: String,
    /// Git binary.
    #[serde(default = "default_git_bin")]
    pub git_bin: String,
    /// Directory under which each run keeps its fetched sources.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
    /// Record the process environment in every command result.
    #[serde(default = "default_capture_env")]
    pub capture_env: bool,
}

fn default_container_bin() -> String {
    "docker".to_string()
}

fn default_git_bin() -> String {
    "git".to_string()
}

fn default_workspace_root() -> PathBuf {
    std::env::temp_dir()
}

const fn default_capture_env() -> bool {
    true
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            container_bin: default_container_bin(),
            git_bin: default_git_bin(),
            workspace_root: default_workspace_root(),
            capture_env: default_capture_env(),
        }
    }
}

impl ExecutorConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with the `DOCKFLOW_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable holds an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(bin) = lookup(ENV_CONTAINER_BIN).filter(|v| !v.is_empty()) {
            config.container_bin = bin;
        }
        if let Some(bin) = lookup(ENV_GIT_BIN).filter(|v| !v.is_empty()) {
            config.git_bin = bin;
        }
        if let Some(dir) = lookup(ENV_WORKSPACE).filter(|v| !v.is_empty()) {
            config.workspace_root = PathBuf::from(dir);
        }
        if let Some(value) = lookup(ENV_CAPTURE_ENV) {
            config.capture_env = parse_bool(ENV_CAPTURE_ENV, &value)?;
        }
        Ok(config)
    }

    /// Sets the container CLI binary.
    #[must_use]
    pub fn with_container_bin(mut self, bin: impl Into<String>) -> Self {
        self.container_bin = bin.into();
        self
    }

    /// Sets the git binary.
    #[must_use]
    pub fn with_git_bin(mut self, bin: impl Into<String>) -> Self {
        self.git_bin = bin.into();
        self
    }

    /// Sets the workspace root.
    #[must_use]
    pub fn with_workspace_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workspace_root = dir.into();
        self
    }

    /// Sets whether command results record the process environment.
    #[must_use]
    pub fn with_capture_env(mut self, capture: bool) -> Self {
        self.capture_env = capture;
        self
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ExecutorConfig::default();
        assert_eq!(config.container_bin, "docker");
        assert_eq!(config.git_bin, "git");
        assert!(config.capture_env);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ExecutorConfig::from_lookup(lookup(&[
            (ENV_CONTAINER_BIN, "podman"),
            (ENV_WORKSPACE, "/var/dockflow"),
            (ENV_CAPTURE_ENV, "false"),
        ]))
        .unwrap();

        assert_eq!(config.container_bin, "podman");
        assert_eq!(config.git_bin, "git");
        assert_eq!(config.workspace_root, PathBuf::from("/var/dockflow"));
        assert!(!config.capture_env);
    }

    #[test]
    fn test_from_lookup_rejects_bad_bool() {
        let err = ExecutorConfig::from_lookup(lookup(&[(ENV_CAPTURE_ENV, "maybe")])).unwrap_err();
        assert!(err.to_string().contains(ENV_CAPTURE_ENV));
    }

    #[test]
    fn test_serde_defaults() {
        let config: ExecutorConfig = serde_json::from_str(r#"{"container_bin": "podman"}"#).unwrap();
        assert_eq!(config.container_bin, "podman");
        assert_eq!(config.git_bin, "git");
        assert!(config.capture_env);
    }

    #[test]
    fn test_builders() {
        let config = ExecutorConfig::new()
            .with_container_bin("podman")
            .with_git_bin("/usr/bin/git")
            .with_workspace_root("/work")
            .with_capture_env(false);
        assert_eq!(config.git_bin, "/usr/bin/git");
        assert_eq!(config.workspace_root, PathBuf::from("/work"));
        assert!(!config.capture_env);
    }
}
