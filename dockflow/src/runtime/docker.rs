//! Container runtime backed by the docker CLI (or a compatible one).

use super::process::{run_process, ProcessSpec};
use crate::config::ExecutorConfig;
use crate::core::CmdResult;
use crate::errors::RuntimeError;
use crate::stages::{ContainerRuntime, VolumeMount};
use crate::utils::EnvMap;
use async_trait::async_trait;
use std::path::Path;
use tracing::info;

/// Builds and runs images by spawning the container CLI.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    bin: String,
    capture_env: bool,
}

impl Default for DockerRuntime {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerRuntime {
    /// Uses `bin` as the container CLI.
    #[must_use]
    pub fn new(bin: impl Into<String>) -> Self {
        Self {
            bin: bin.into(),
            capture_env: true,
        }
    }

    /// Creates a runtime from the executor configuration.
    #[must_use]
    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self::new(config.container_bin.clone()).with_capture_env(config.capture_env)
    }

    /// Sets whether results record the process environment.
    #[must_use]
    pub fn with_capture_env(mut self, capture: bool) -> Self {
        self.capture_env = capture;
        self
    }

    /// The container CLI binary.
    #[must_use]
    pub fn bin(&self) -> &str {
        &self.bin
    }

    /// Arguments for building image `id` from the current directory.
    #[must_use]
    pub fn build_args(id: &str, env: &EnvMap) -> Vec<String> {
        let mut args = vec!["build".to_string()];
        for (key, value) in env {
            args.push("--build-arg".to_string());
            args.push(format!("{key}={value}"));
        }
        args.extend(["-t".to_string(), id.to_string(), ".".to_string()]);
        args
    }

    /// Arguments for running image `id` interactively and removing it after.
    #[must_use]
    pub fn run_args(id: &str, volume: Option<&VolumeMount>, env: &EnvMap) -> Vec<String> {
        let mut args = vec!["run".to_string(), "-i".to_string()];
        if let Some(v) = volume {
            args.push("-v".to_string());
            args.push(format!("{}:{}", v.name, v.dir));
        }
        args.push("--rm".to_string());
        for (key, value) in env {
            args.push("--env".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(id.to_string());
        args
    }

    /// Arguments for creating a volume bound to host directory `dir`.
    #[must_use]
    pub fn create_volume_args(dir: &Path, name: &str) -> Vec<String> {
        vec![
            "volume".to_string(),
            "create".to_string(),
            "--driver".to_string(),
            "local".to_string(),
            "--opt".to_string(),
            "type=none".to_string(),
            "--opt".to_string(),
            format!("device={}", dir.display()),
            "--opt".to_string(),
            "o=bind".to_string(),
            format!("--name={name}"),
        ]
    }

    /// Arguments for force-removing a volume.
    #[must_use]
    pub fn remove_volume_args(name: &str) -> Vec<String> {
        vec![
            "volume".to_string(),
            "rm".to_string(),
            "-f".to_string(),
            name.to_string(),
        ]
    }

    async fn run_checked(&self, args: Vec<String>) -> Result<CmdResult, RuntimeError> {
        let result = run_process(ProcessSpec::new(&self.bin, args)).await?;
        if result.succeeded() {
            Ok(result)
        } else {
            Err(RuntimeError::NonZeroExit {
                cmd: result.cmd,
                exit_status: result.exit_status,
                stderr: result.stderr.trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn build_image(
        &self,
        id: &str,
        work_dir: &Path,
        env: &EnvMap,
    ) -> Result<CmdResult, RuntimeError> {
        let spec = ProcessSpec::new(&self.bin, Self::build_args(id, env))
            .in_dir(work_dir)
            .capturing_env(self.capture_env);
        info!(image = %id, "$ {}", spec.command_line());
        run_process(spec).await
    }

    async fn run_image(
        &self,
        id: &str,
        work_dir: &Path,
        volume: Option<&VolumeMount>,
        stdin: &str,
        env: &EnvMap,
    ) -> Result<CmdResult, RuntimeError> {
        let spec = ProcessSpec::new(&self.bin, Self::run_args(id, volume, env))
            .in_dir(work_dir)
            .with_stdin(stdin)
            .capturing_env(self.capture_env);
        info!(image = %id, "$ {}", spec.command_line());
        run_process(spec).await
    }

    async fn create_volume(&self, dir: &Path, name: &str) -> Result<(), RuntimeError> {
        info!(volume = %name, dir = %dir.display(), "Creating volume");
        self.run_checked(Self::create_volume_args(dir, name)).await?;
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<(), RuntimeError> {
        info!(volume = %name, "Removing volume");
        self.run_checked(Self::remove_volume_args(name)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn env(pairs: &[(&str, &str)]) -> EnvMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_build_args_are_sorted() {
        let args = DockerRuntime::build_args("collect", &env(&[("YEAR", "2020"), ("MONTH", "04")]));
        assert_eq!(
            args,
            vec!["build", "--build-arg", "MONTH=04", "--build-arg", "YEAR=2020", "-t", "collect", "."]
        );
    }

    #[test]
    fn test_run_args_with_volume() {
        let volume = VolumeMount::new("shared-1a2b3c4d", "/output");
        let args = DockerRuntime::run_args("collect", Some(&volume), &env(&[("OUTPUT_FOLDER", "/output")]));
        assert_eq!(
            args,
            vec![
                "run",
                "-i",
                "-v",
                "shared-1a2b3c4d:/output",
                "--rm",
                "--env",
                "OUTPUT_FOLDER=/output",
                "collect"
            ]
        );
        assert_eq!(DockerRuntime::run_args("x", None, &EnvMap::new()), vec!["run", "-i", "--rm", "x"]);
    }

    #[test]
    fn test_volume_args() {
        let args = DockerRuntime::create_volume_args(Path::new("/tmp/out"), "shared");
        assert_eq!(
            format_args(&args),
            "volume create --driver local --opt type=none --opt device=/tmp/out --opt o=bind --name=shared"
        );
        assert_eq!(format_args(&DockerRuntime::remove_volume_args("shared")), "volume rm -f shared");
    }

    fn format_args(args: &[String]) -> String {
        args.join(" ")
    }

    #[tokio::test]
    async fn test_build_with_stand_in_binary() {
        let tmp = tempfile::tempdir().unwrap();
        let runtime = DockerRuntime::new("echo").with_capture_env(false);

        let result = runtime
            .build_image("collect", tmp.path(), &env(&[("A", "1")]))
            .await
            .unwrap();

        assert!(result.succeeded());
        assert_eq!(result.stdout.trim(), "build --build-arg A=1 -t collect .");
        assert_eq!(result.cmd, "echo build --build-arg A=1 -t collect .");
    }

    #[tokio::test]
    async fn test_volume_failure_is_non_zero_exit() {
        let runtime = DockerRuntime::new("false");
        let err = runtime.remove_volume("shared").await.unwrap_err();
        assert!(matches!(err, RuntimeError::NonZeroExit { exit_status: 1, .. }));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let tmp = tempfile::tempdir().unwrap();
        let runtime = DockerRuntime::new("dockflow-no-such-binary");
        let err = runtime
            .run_image("collect", tmp.path(), None, "", &EnvMap::new())
            .await
            .unwrap_err();
        assert!(err.is_spawn());
    }
}
