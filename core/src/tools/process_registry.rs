//! `start_background_process`, `stop_background_process`,
//! `list_background_processes` (§4.2).
//!
//! The registry is process-wide and shared across connections (§5),
//! protected by a single async mutex — never expose the raw child handle
//! outside this module (design note §9).

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use tokio::process::Child;
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::error::CoreError;
use crate::error::Result;

const LIVENESS_PROBE_DELAY: Duration = Duration::from_secs(2);
const TERMINATE_GRACE: Duration = Duration::from_secs(5);
const HARD_KILL_GRACE: Duration = Duration::from_secs(5);

const TRANSIENT_MARKERS: &[&str] = &[
    "eaddrinuse",
    "port already in use",
    "resource temporarily unavailable",
    "connection refused",
];

struct Entry {
    child: Child,
    command: String,
}

/// Process-wide table of live background processes keyed by the
/// client-chosen `process_id`.
#[derive(Default)]
pub struct ProcessRegistry {
    entries: Mutex<HashMap<String, Entry>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launches a detached child with `stdin=/dev/null`, `CI=true`, and
    /// `FORCE_COLOR=0`. Waits ~2s, then checks liveness. An already-exited
    /// child whose output matches a transient marker surfaces a retryable
    /// error; otherwise the failure is fatal with captured output.
    pub async fn start(&self, command: &str, process_id: &str, cwd: &Path) -> Result<(u32, String)> {
        {
            let entries = self.entries.lock().await;
            if entries.contains_key(process_id) {
                return Err(CoreError::ToolFailure(format!(
                    "process_id '{process_id}' is already in use"
                )));
            }
        }

        let mut cmd = shell_command(command, cwd);
        let mut child = cmd
            .spawn()
            .map_err(|e| CoreError::ToolFailure(format!("failed to start background process: {e}")))?;

        tokio::time::sleep(LIVENESS_PROBE_DELAY).await;

        match child.try_wait() {
            Ok(None) => {
                let pid = child.id().unwrap_or(0);
                let mut entries = self.entries.lock().await;
                entries.insert(
                    process_id.to_string(),
                    Entry { child, command: command.to_string() },
                );
                Ok((pid, command.to_string()))
            }
            Ok(Some(_status)) => {
                let output = drain_output(&mut child).await;
                let lower = output.to_lowercase();
                if TRANSIENT_MARKERS.iter().any(|m| lower.contains(m)) {
                    tracing::warn!(process_id, "background process exit looks transient, asking the agent to retry");
                    Err(CoreError::RetryableTransient(format!(
                        "background process exited immediately, likely a transient condition: {output}"
                    )))
                } else {
                    Err(CoreError::ToolFailure(format!(
                        "background process exited immediately: {output}"
                    )))
                }
            }
            Err(e) => Err(CoreError::ToolFailure(format!("could not check process status: {e}"))),
        }
    }

    /// Sends termination; hard-kills after 5s if still alive; surfaces a
    /// retryable error if the child survives another 5s past that.
    pub async fn stop(&self, process_id: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get_mut(process_id) else {
            return Ok(());
        };

        if let Ok(Some(_)) = entry.child.try_wait() {
            entries.remove(process_id);
            return Ok(());
        }

        #[cfg(unix)]
        terminate_unix(&entry.child);
        #[cfg(not(unix))]
        let _ = entry.child.start_kill();

        if tokio::time::timeout(TERMINATE_GRACE, entry.child.wait()).await.is_ok() {
            entries.remove(process_id);
            return Ok(());
        }

        let _ = entry.child.start_kill();
        if tokio::time::timeout(HARD_KILL_GRACE, entry.child.wait()).await.is_ok() {
            entries.remove(process_id);
            return Ok(());
        }

        tracing::warn!(process_id, "process survived hard kill, asking the agent to retry");
        Err(CoreError::RetryableTransient(format!(
            "process '{process_id}' did not exit after hard kill"
        )))
    }

    /// Human-readable `(process_id, status, pid)` listing.
    pub async fn list(&self) -> Vec<(String, String, u32)> {
        let mut entries = self.entries.lock().await;
        let mut out = Vec::with_capacity(entries.len());
        for (id, entry) in entries.iter_mut() {
            let status = match entry.child.try_wait() {
                Ok(None) => "running".to_string(),
                Ok(Some(status)) => format!("exited (code: {})", status.code().unwrap_or(-1)),
                Err(_) => "unknown".to_string(),
            };
            out.push((id.clone(), status, entry.child.id().unwrap_or(0)));
        }
        out
    }

    pub fn describe_command(&self) -> &'static str {
        "background process"
    }
}

async fn drain_output(child: &mut Child) -> String {
    use tokio::io::AsyncReadExt;

    let mut combined = String::new();
    if let Some(mut stdout) = child.stdout.take() {
        let _ = stdout.read_to_string(&mut combined).await;
    }
    if let Some(mut stderr) = child.stderr.take() {
        let mut buf = String::new();
        let _ = stderr.read_to_string(&mut buf).await;
        combined.push_str(&buf);
    }
    combined
}

#[cfg(unix)]
fn terminate_unix(child: &Child) {
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
    }
}

fn shell_command(command: &str, cwd: &Path) -> Command {
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C");
        c
    } else {
        let mut c = Command::new("/bin/sh");
        c.arg("-c");
        c
    };
    cmd.arg(command);
    cmd.current_dir(cwd);
    cmd.env("CI", "true");
    cmd.env("FORCE_COLOR", "0");
    cmd.stdin(std::process::Stdio::null());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd
}
