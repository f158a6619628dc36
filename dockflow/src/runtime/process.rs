//! Spawning external commands and capturing their output.

use crate::core::CmdResult;
use crate::errors::RuntimeError;
use crate::utils::now_utc;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// A command line to spawn.
#[derive(Debug, Clone)]
pub(crate) struct ProcessSpec<'a> {
    pub program: &'a str,
    pub args: Vec<String>,
    pub dir: Option<&'a Path>,
    pub stdin: Option<&'a str>,
    pub capture_env: bool,
}

impl<'a> ProcessSpec<'a> {
    pub(crate) fn new(program: &'a str, args: Vec<String>) -> Self {
        Self {
            program,
            args,
            dir: None,
            stdin: None,
            capture_env: false,
        }
    }

    pub(crate) fn in_dir(mut self, dir: &'a Path) -> Self {
        self.dir = Some(dir);
        self
    }

    pub(crate) fn with_stdin(mut self, stdin: &'a str) -> Self {
        self.stdin = Some(stdin);
        self
    }

    pub(crate) fn capturing_env(mut self, capture: bool) -> Self {
        self.capture_env = capture;
        self
    }

    pub(crate) fn command_line(&self) -> String {
        format_command(self.program, &self.args)
    }
}

/// Renders a program and its arguments as a shell-like command line.
///
/// Arguments holding whitespace or quotes are double quoted.
#[must_use]
pub fn format_command(program: &str, args: &[String]) -> String {
    std::iter::once(program.to_string())
        .chain(args.iter().map(|arg| quote(arg)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote(arg: &str) -> String {
    if arg.is_empty() {
        return "\"\"".to_string();
    }
    if arg.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'') {
        format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        arg.to_string()
    }
}

/// Runs the command to completion.
///
/// A command that starts always yields `Ok`, whatever its exit status.
pub(crate) async fn run_process(spec: ProcessSpec<'_>) -> Result<CmdResult, RuntimeError> {
    let cmd_line = spec.command_line();
    let dir = spec.dir.map(|d| d.display().to_string()).unwrap_or_default();
    debug!(dir = %dir, "$ {}", cmd_line);

    let mut command = Command::new(spec.program);
    command
        .args(&spec.args)
        .stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(d) = spec.dir {
        command.current_dir(d);
    }

    let start = now_utc();
    let mut child = command.spawn().map_err(|source| RuntimeError::Spawn {
        cmd: cmd_line.clone(),
        dir: dir.clone(),
        source,
    })?;

    let writer = match (spec.stdin, child.stdin.take()) {
        (Some(input), Some(mut pipe)) => {
            let input = input.to_string();
            Some(tokio::spawn(async move {
                let written = pipe.write_all(input.as_bytes()).await;
                drop(pipe);
                written
            }))
        }
        _ => None,
    };

    let output = child
        .wait_with_output()
        .await
        .map_err(|source| RuntimeError::Spawn {
            cmd: cmd_line.clone(),
            dir: dir.clone(),
            source,
        })?;

    if let Some(handle) = writer {
        match handle.await {
            Ok(Ok(())) => {}
            // The process may exit without reading its input.
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => warn!(error = %e, cmd = %cmd_line, "Failed writing stdin"),
            Err(e) => warn!(error = %e, cmd = %cmd_line, "Stdin writer task failed"),
        }
    }
    let finish = now_utc();

    let exit_status = output.status.code().unwrap_or(-1);
    let mut result = CmdResult::default()
        .with_cmd(cmd_line)
        .with_dir(dir)
        .with_stdin(spec.stdin.unwrap_or_default())
        .with_stdout(String::from_utf8_lossy(&output.stdout))
        .with_stderr(String::from_utf8_lossy(&output.stderr))
        .with_exit_status(exit_status)
        .with_times(start, finish);
    if spec.capture_env {
        result.env = environment_snapshot();
    }
    Ok(result)
}

fn environment_snapshot() -> Vec<String> {
    let mut vars: Vec<String> = std::env::vars().map(|(k, v)| format!("{k}={v}")).collect();
    vars.sort();
    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_format_command_quotes_when_needed() {
        let line = format_command(
            "docker",
            &args(&["build", "--build-arg", "NAME=Tribunal Regional", "-t", "a", "."]),
        );
        assert_eq!(
            line,
            r#"docker build --build-arg "NAME=Tribunal Regional" -t a ."#
        );
        assert_eq!(format_command("echo", &args(&["", "say \"hi\""])), r#"echo "" "say \"hi\"""#);
    }

    #[tokio::test]
    async fn test_run_process_pipes_stdin() {
        let tmp = tempfile::tempdir().unwrap();
        let spec = ProcessSpec::new("cat", Vec::new())
            .in_dir(tmp.path())
            .with_stdin("line one\nline two");

        let result = run_process(spec).await.unwrap();

        assert_eq!(result.exit_status, 0);
        assert_eq!(result.stdout, "line one\nline two");
        assert_eq!(result.stdin, "line one\nline two");
        assert_eq!(result.cmd, "cat");
        assert_eq!(result.cmd_dir, tmp.path().display().to_string());
        assert!(result.env.is_empty());
        assert!(result.start_time.is_some());
    }

    #[tokio::test]
    async fn test_run_process_reports_exit_status() {
        let spec = ProcessSpec::new("sh", args(&["-c", "echo oops >&2; exit 4"])).capturing_env(true);

        let result = run_process(spec).await.unwrap();

        assert_eq!(result.exit_status, 4);
        assert_eq!(result.stderr.trim(), "oops");
        assert!(!result.env.is_empty());
    }

    #[tokio::test]
    async fn test_run_process_spawn_failure() {
        let spec = ProcessSpec::new("dockflow-no-such-binary", args(&["build"]));

        let err = run_process(spec).await.unwrap_err();

        assert!(err.is_spawn());
        assert!(err.to_string().contains("dockflow-no-such-binary build"));
    }
}
