//! `run_command`, `run_git_command`, `run_tests` (§4.2).
//!
//! Timeout and output handling follow the same shape the exec tool call
//! uses elsewhere in this codebase: spawn under a shell, race the child's
//! exit against a timeout, and hard-kill on expiry rather than leaving a
//! runaway process behind.

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tokio::process::Command;

use crate::error::CoreError;
use crate::error::Result;

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub return_code: i32,
    pub command: String,
}

/// Runs `command` through a shell, enforcing `timeout` (default 300s). A
/// timeout is a hard tool error (§7 Timeout), not a `return_code`.
pub async fn run_command(command: &str, cwd: &Path, timeout: Option<Duration>) -> Result<CommandOutput> {
    let timeout = timeout.unwrap_or(DEFAULT_COMMAND_TIMEOUT);

    let mut cmd = shell_command(command, cwd);
    let child = cmd
        .spawn()
        .map_err(|e| CoreError::ToolFailure(format!("failed to start command: {e}")))?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(CoreError::ToolFailure(format!("command failed: {e}"))),
        Err(_) => {
            tracing::warn!(command, ?timeout, "command timed out");
            return Err(CoreError::Timeout(timeout));
        }
    };

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        return_code: output.status.code().unwrap_or(-1),
        command: command.to_string(),
    })
}

/// Thin `git` wrapper. A non-zero exit is a tool error carrying stderr.
pub async fn run_git_command(git_command: &str, cwd: &Path) -> Result<String> {
    let full = format!("git {git_command}");
    let output = run_command(&full, cwd, None).await?;
    if output.return_code != 0 {
        return Err(CoreError::ToolFailure(output.stderr));
    }
    Ok(output.stdout)
}

/// Wraps `run_command("pytest …")` with a 300s timeout.
pub async fn run_tests(test_path: Option<&str>, cwd: &Path, verbose: bool) -> Result<CommandOutput> {
    let test_path = test_path.unwrap_or("tests/");
    let verbosity = if verbose { " -v" } else { "" };
    let command = format!("pytest {test_path}{verbosity}");
    run_command(&command, cwd, Some(DEFAULT_COMMAND_TIMEOUT)).await
}

fn shell_command(command: &str, cwd: &Path) -> Command {
    let mut cmd = shell_program();
    cmd.arg(shell_flag()).arg(command);
    cmd.current_dir(cwd_or_default(cwd));
    cmd.kill_on_drop(true);
    cmd.stdin(std::process::Stdio::null());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd
}

fn cwd_or_default(cwd: &Path) -> PathBuf {
    if cwd.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        cwd.to_path_buf()
    }
}

#[cfg(unix)]
fn shell_program() -> Command {
    Command::new("/bin/sh")
}

#[cfg(unix)]
fn shell_flag() -> &'static str {
    "-c"
}

#[cfg(windows)]
fn shell_program() -> Command {
    Command::new("cmd")
}

#[cfg(windows)]
fn shell_flag() -> &'static str {
    "/C"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_command_captures_stdout_and_exit_code() {
        let tmp = tempfile::tempdir().unwrap();
        let out = run_command("echo hi", tmp.path(), None).await.unwrap();
        assert_eq!(out.stdout.trim(), "hi");
        assert_eq!(out.return_code, 0);
    }

    #[tokio::test]
    async fn run_command_reports_nonzero_exit_code_not_as_error() {
        let tmp = tempfile::tempdir().unwrap();
        let out = run_command("exit 3", tmp.path(), None).await.unwrap();
        assert_eq!(out.return_code, 3);
    }

    #[tokio::test]
    async fn run_command_times_out_and_kills_child() {
        let tmp = tempfile::tempdir().unwrap();
        let err = run_command("sleep 5", tmp.path(), Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Timeout(_)));
    }

    #[tokio::test]
    async fn run_git_command_surfaces_stderr_on_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let err = run_git_command("not-a-real-subcommand", tmp.path()).await.unwrap_err();
        assert!(matches!(err, CoreError::ToolFailure(_)));
    }
}
