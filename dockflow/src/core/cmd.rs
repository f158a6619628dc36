//! Captured outcome of one external command.

use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};

/// Information about one execution of an external command.
///
/// Produced once by an adapter and never modified afterwards. Phases that do
/// not spawn a process (setup, teardown) still produce a `CmdResult` so every
/// phase of a stage reports in the same shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmdResult {
    /// Standard input handed to the process.
    #[serde(default)]
    pub stdin: String,
    /// Captured standard output.
    #[serde(default)]
    pub stdout: String,
    /// Captured standard error.
    #[serde(default)]
    pub stderr: String,
    /// The literal command line that was executed.
    #[serde(default)]
    pub cmd: String,
    /// Directory the command ran in.
    #[serde(default, rename = "cmdDir")]
    pub cmd_dir: String,
    /// Exit status of the process.
    #[serde(default, rename = "status")]
    pub exit_status: i32,
    /// Snapshot of the process environment in `KEY=value` form.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    /// When the command started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<Timestamp>,
    /// When the command finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_time: Option<Timestamp>,
}

impl CmdResult {
    /// A result for a phase that completed without running a process.
    #[must_use]
    pub fn ok() -> Self {
        Self::default()
    }

    /// A result for a phase that failed without running a process.
    #[must_use]
    pub fn failed(exit_status: i32, stderr: impl Into<String>) -> Self {
        Self {
            stderr: stderr.into(),
            exit_status,
            ..Self::default()
        }
    }

    /// Sets the command line.
    #[must_use]
    pub fn with_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.cmd = cmd.into();
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn with_dir(mut self, dir: impl Into<String>) -> Self {
        self.cmd_dir = dir.into();
        self
    }

    /// Sets the stdin payload.
    #[must_use]
    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = stdin.into();
        self
    }

    /// Sets the captured stdout.
    #[must_use]
    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    /// Sets the captured stderr.
    #[must_use]
    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    /// Sets the exit status.
    #[must_use]
    pub fn with_exit_status(mut self, exit_status: i32) -> Self {
        self.exit_status = exit_status;
        self
    }

    /// Sets the start and finish timestamps.
    #[must_use]
    pub fn with_times(mut self, start: Timestamp, finish: Timestamp) -> Self {
        self.start_time = Some(start);
        self.finish_time = Some(finish);
        self
    }

    /// Returns true if the command exited with status zero.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.exit_status == 0
    }

    /// Returns true if nothing was recorded in this slot.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_empty() {
        assert!(CmdResult::default().is_empty());
        assert!(CmdResult::ok().succeeded());
    }

    #[test]
    fn test_failed() {
        let result = CmdResult::failed(2, "permission denied");
        assert!(!result.succeeded());
        assert!(!result.is_empty());
        assert_eq!(result.stderr, "permission denied");
    }

    #[test]
    fn test_field_names_on_the_wire() {
        let result = CmdResult::ok()
            .with_cmd("docker build -t a .")
            .with_dir("/tmp/a")
            .with_exit_status(1);
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["cmd"], "docker build -t a .");
        assert_eq!(value["cmdDir"], "/tmp/a");
        assert_eq!(value["status"], 1);
        assert!(value.get("env").is_none());
    }
}
