//! Shell adapter -- run rendered intent commands through `sh -c`.
//!
//! Every shell action from the intent catalog ends up here.  The command runs
//! with a timeout and is killed if the timeout fires.  Stdout and stderr are
//! captured and each is truncated to [`MAX_OUTPUT_BYTES`] (100 KB).

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::{AdapterError, Result};
use crate::filesystem::expand_path;
use crate::traits::{Adapter, AdapterType, HealthStatus, ToolDefinition};

/// Default command timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Maximum output size in bytes (100 KB).  Stdout and stderr are each
/// independently truncated to this limit.
pub const MAX_OUTPUT_BYTES: usize = 100 * 1024;

/// Captured result of one finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status, or `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Whether either stream hit the size cap.
    pub truncated: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout followed by stderr, trimmed.
    pub fn combined(&self) -> String {
        let out = self.stdout.trim_end();
        let err = self.stderr.trim_end();
        match (out.is_empty(), err.is_empty()) {
            (_, true) => out.to_owned(),
            (true, false) => err.to_owned(),
            (false, false) => format!("{out}\n{err}"),
        }
    }
}

/// Run `command` through `sh -c` and wait for it, up to `timeout_secs`.
///
/// `tool_name` only labels errors.  On timeout the child is dropped, which
/// kills it.
pub async fn run_command(
    command: &str,
    working_dir: Option<&Path>,
    timeout_secs: u64,
    tool_name: &str,
) -> Result<CommandOutput> {
    debug!(
        command = command,
        working_dir = ?working_dir,
        timeout_secs = timeout_secs,
        "executing shell command"
    );

    let mut cmd = tokio::process::Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }

    let child = cmd.spawn().map_err(|e| AdapterError::ExecutionFailed {
        tool_name: tool_name.into(),
        reason: format!("failed to spawn process: {e}"),
    })?;

    // `wait_with_output` takes ownership, so on timeout the child is dropped
    // and killed via `kill_on_drop(true)`.
    let result =
        tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output()).await;

    match result {
        Ok(Ok(output)) => {
            let exit_code = output.status.code().unwrap_or(-1);
            let (stdout, stdout_truncated) = truncate_output(&output.stdout);
            let (stderr, stderr_truncated) = truncate_output(&output.stderr);
            let truncated = stdout_truncated || stderr_truncated;

            debug!(exit_code = exit_code, truncated = truncated, "command completed");

            Ok(CommandOutput {
                exit_code,
                stdout,
                stderr,
                truncated,
            })
        }
        Ok(Err(e)) => Err(AdapterError::ExecutionFailed {
            tool_name: tool_name.into(),
            reason: format!("process error: {e}"),
        }),
        Err(_) => {
            warn!(command = command, timeout_secs = timeout_secs, "command timed out");
            Err(AdapterError::Timeout {
                seconds: timeout_secs,
                reason: format!("shell command `{command}` exceeded time limit"),
            })
        }
    }
}

/// Truncate raw command output to [`MAX_OUTPUT_BYTES`], converting to a
/// lossy UTF-8 string.  Returns `(output_string, was_truncated)`.
fn truncate_output(raw: &[u8]) -> (String, bool) {
    if raw.len() <= MAX_OUTPUT_BYTES {
        (String::from_utf8_lossy(raw).into_owned(), false)
    } else {
        let mut s = String::from_utf8_lossy(&raw[..MAX_OUTPUT_BYTES]).into_owned();
        s.push_str("\n... [output truncated at 100 KB]");
        (s, true)
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Shell service adapter.
pub struct ShellAdapter {
    id: String,
    /// Working directory for commands; the process's own when unset.
    working_dir: Option<PathBuf>,
    default_timeout_secs: u64,
    connected: bool,
}

impl ShellAdapter {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            working_dir: None,
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            connected: false,
        }
    }

    /// Run commands in `dir` unless a call overrides it.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the default timeout for command execution.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.default_timeout_secs = timeout_secs;
        self
    }

    async fn tool_shell_execute(&self, params: Value) -> Result<Value> {
        let command = params
            .get("command")
            .and_then(|v| v.as_str())
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AdapterError::InvalidParams {
                tool_name: "shell_execute".into(),
                reason: "missing required string field `command`".into(),
            })?;

        let working_dir = params
            .get("working_dir")
            .and_then(|v| v.as_str())
            .map(expand_path)
            .or_else(|| self.working_dir.clone());

        let timeout_secs = params
            .get("timeout_secs")
            .and_then(|v| v.as_u64())
            .unwrap_or(self.default_timeout_secs);

        let out = run_command(command, working_dir.as_deref(), timeout_secs, "shell_execute").await?;

        Ok(json!({
            "command": command,
            "exit_code": out.exit_code,
            "stdout": out.stdout,
            "stderr": out.stderr,
            "output": out.combined(),
            "truncated": out.truncated,
            "success": out.success(),
        }))
    }
}

#[async_trait]
impl Adapter for ShellAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::System
    }

    async fn connect(&mut self) -> Result<()> {
        info!(id = %self.id, timeout_secs = self.default_timeout_secs, "shell adapter connected");
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        info!(id = %self.id, "shell adapter disconnected");
        self.connected = false;
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        if !self.connected {
            return Ok(HealthStatus::Unhealthy);
        }
        match tokio::process::Command::new("sh")
            .arg("-c")
            .arg("true")
            .output()
            .await
        {
            Ok(output) if output.status.success() => Ok(HealthStatus::Healthy),
            _ => Ok(HealthStatus::Degraded),
        }
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: "shell_execute".into(),
            description: "Execute a shell command and return stdout, stderr, and exit code".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The shell command to execute"
                    },
                    "working_dir": {
                        "type": "string",
                        "description": "Working directory for the command (optional)"
                    },
                    "timeout_secs": {
                        "type": "integer",
                        "description": "Timeout in seconds"
                    }
                },
                "required": ["command"]
            }),
        }]
    }

    async fn execute_tool(&self, name: &str, params: Value) -> Result<Value> {
        if !self.connected {
            return Err(AdapterError::ExecutionFailed {
                tool_name: name.to_string(),
                reason: format!("adapter `{}` is not connected", self.id),
            });
        }
        match name {
            "shell_execute" => self.tool_shell_execute(params).await,
            _ => Err(AdapterError::ToolNotFound {
                adapter_id: self.id.clone(),
                tool_name: name.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    async fn connected() -> ShellAdapter {
        let mut adapter = ShellAdapter::new("shell").with_timeout(5);
        adapter.connect().await.unwrap();
        adapter
    }

    #[tokio::test]
    async fn shell_adapter_rejects_when_not_connected() {
        let adapter = ShellAdapter::new("shell");
        let result = adapter
            .execute_tool("shell_execute", json!({"command": "echo hello"}))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn echo_is_captured() {
        let adapter = connected().await;
        let out = adapter
            .execute_tool("shell_execute", json!({"command": "echo hello; echo oops >&2"}))
            .await
            .unwrap();
        assert_eq!(out["success"], true);
        assert_eq!(out["exit_code"], 0);
        assert_eq!(out["stdout"], "hello\n");
        assert_eq!(out["output"], "hello\noops");
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_not_raised() {
        let adapter = connected().await;
        let out = adapter
            .execute_tool("shell_execute", json!({"command": "exit 3"}))
            .await
            .unwrap();
        assert_eq!(out["success"], false);
        assert_eq!(out["exit_code"], 3);
    }

    #[tokio::test]
    async fn timeout_kills_command() {
        let adapter = connected().await;
        let err = adapter
            .execute_tool(
                "shell_execute",
                json!({"command": "sleep 5", "timeout_secs": 1}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Timeout { seconds: 1, .. }));
    }

    #[tokio::test]
    async fn working_dir_is_honoured() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = connected().await;
        let out = adapter
            .execute_tool(
                "shell_execute",
                json!({"command": "pwd", "working_dir": dir.path().to_str().unwrap()}),
            )
            .await
            .unwrap();
        let pwd = out["stdout"].as_str().unwrap().trim().to_owned();
        assert_eq!(
            std::fs::canonicalize(pwd).unwrap(),
            std::fs::canonicalize(dir.path()).unwrap()
        );
    }

    #[tokio::test]
    async fn empty_command_is_invalid() {
        let adapter = connected().await;
        let err = adapter
            .execute_tool("shell_execute", json!({"command": "  "}))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::InvalidParams { .. }));
    }

    #[test]
    fn truncate_output_short_input_not_truncated() {
        let (s, truncated) = truncate_output(b"hello world");
        assert_eq!(s, "hello world");
        assert!(!truncated);
    }

    #[test]
    fn truncate_output_large_input_is_truncated() {
        let data = vec![b'x'; MAX_OUTPUT_BYTES + 1000];
        let (s, truncated) = truncate_output(&data);
        assert!(truncated);
        assert!(s.contains("[output truncated at 100 KB]"));
        assert!(s.len() <= MAX_OUTPUT_BYTES + 50);
    }

    #[test]
    fn combined_output_joins_streams() {
        let out = CommandOutput {
            exit_code: 1,
            stdout: String::new(),
            stderr: "boom\n".into(),
            truncated: false,
        };
        assert_eq!(out.combined(), "boom");
        assert!(!out.success());
    }
}
