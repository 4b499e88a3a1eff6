//! Shell tool: execute system commands.
//!
//! Supports command allowlisting, a default working directory and output
//! truncation. Privileged commands never block on a password prompt.

use async_trait::async_trait;
use sentient_core::error::ToolError;
use sentient_core::tool::{Tool, ToolOutput};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Why a command that ran did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    CommandNotInstalled,
    PasswordRequired,
    ExecutionFailed,
}

impl FailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CommandNotInstalled => "CommandNotInstalled",
            Self::PasswordRequired => "PasswordRequired",
            Self::ExecutionFailed => "ExecutionFailed",
        }
    }

    fn classify(exit_code: Option<i32>, stderr: &str, privileged: bool) -> Self {
        let lower = stderr.to_lowercase();
        if privileged
            && (lower.contains("a password is required") || lower.contains("a terminal is required"))
        {
            return Self::PasswordRequired;
        }
        if exit_code == Some(127)
            || lower.contains("command not found")
            || lower.contains("not recognized as")
        {
            return Self::CommandNotInstalled;
        }
        Self::ExecutionFailed
    }
}

/// Execute shell commands with safety constraints.
pub struct ShellTool {
    /// If non-empty, only these commands are allowed.
    allowed_commands: Vec<String>,
    working_dir: Option<PathBuf>,
    output_limit_bytes: usize,
}

impl ShellTool {
    pub fn new(allowed_commands: Vec<String>) -> Self {
        Self {
            allowed_commands,
            working_dir: None,
            output_limit_bytes: 16 * 1024,
        }
    }

    pub fn with_working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    pub fn with_output_limit(mut self, bytes: usize) -> Self {
        self.output_limit_bytes = bytes;
        self
    }

    fn is_command_allowed(&self, command: &str) -> bool {
        if self.allowed_commands.is_empty() {
            return true;
        }

        // `sudo foo` is judged by `foo`, and `sudo` itself must be listed too.
        let mut words = command.split_whitespace();
        let base_cmd = words.next().unwrap_or("");
        if base_cmd == "sudo" {
            let target = words.find(|w| !w.starts_with('-')).unwrap_or("");
            return self.is_listed("sudo") && self.is_listed(target);
        }
        self.is_listed(base_cmd)
    }

    fn is_listed(&self, program: &str) -> bool {
        self.allowed_commands.iter().any(|a| a == program)
    }

    fn spawn(&self, command: &str, dir: Option<&Path>) -> Command {
        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// Rewrite a leading `sudo` so it fails instead of prompting.
fn non_interactive(command: &str) -> (String, bool) {
    let trimmed = command.trim_start();
    match trimmed.strip_prefix("sudo") {
        Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => {
            let already = rest.split_whitespace().next() == Some("-n");
            if already {
                (trimmed.to_string(), true)
            } else {
                (format!("sudo -n{rest}"), true)
            }
        }
        _ => (command.to_string(), false),
    }
}

/// Cut `text` to at most `limit` bytes without splitting a character.
fn truncate_utf8(text: &str, limit: usize) -> (&str, bool) {
    if text.len() <= limit {
        return (text, false);
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    (&text[..end], true)
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its exit code, stdout and stderr. \
         Commands run non-interactively: sudo never prompts for a password."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "working_dir": {
                    "type": "string",
                    "description": "Directory to run the command in"
                }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let command = arguments["command"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'command' argument".into()))?;
        if command.trim().is_empty() {
            return Err(ToolError::InvalidArguments("'command' is empty".into()));
        }

        if !self.is_command_allowed(command) {
            return Err(ToolError::PermissionDenied {
                tool_name: "shell".into(),
                reason: format!(
                    "Command '{}' not in allowlist",
                    command.split_whitespace().next().unwrap_or("")
                ),
            });
        }

        let dir = arguments["working_dir"]
            .as_str()
            .map(PathBuf::from)
            .or_else(|| self.working_dir.clone());
        let (to_run, privileged) = non_interactive(command);

        debug!(command = %to_run, dir = ?dir, "Executing shell command");

        let output = self
            .spawn(&to_run, dir.as_deref())
            .output()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "shell".into(),
                reason: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let (stdout_cut, stdout_truncated) = truncate_utf8(stdout.trim_end(), self.output_limit_bytes);
        let (stderr_cut, stderr_truncated) = truncate_utf8(stderr.trim_end(), self.output_limit_bytes);
        let exit_code = output.status.code();

        let mut payload = json!({
            "exit_code": exit_code,
            "stdout": stdout_cut,
            "stderr": stderr_cut,
            "truncated": stdout_truncated || stderr_truncated,
        });

        if output.status.success() {
            return Ok(ToolOutput::ok(payload));
        }

        let reason = FailureReason::classify(exit_code, &stderr, privileged);
        warn!(command = %to_run, exit_code = ?exit_code, reason = reason.as_str(), "Command failed");
        payload["reason"] = json!(reason.as_str());
        Ok(ToolOutput::failed(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowlist_check() {
        let tool = ShellTool::new(vec!["ls".into(), "cat".into(), "git".into()]);
        assert!(tool.is_command_allowed("ls -la"));
        assert!(tool.is_command_allowed("cat file.txt"));
        assert!(tool.is_command_allowed("git status"));
        assert!(!tool.is_command_allowed("rm -rf /"));
        assert!(!tool.is_command_allowed("sudo ls"));

        let tool = ShellTool::new(vec!["sudo".into(), "apt-get".into()]);
        assert!(tool.is_command_allowed("sudo -E apt-get install jq"));
        assert!(!tool.is_command_allowed("sudo rm -rf /"));
    }

    #[test]
    fn empty_allowlist_allows_all() {
        let tool = ShellTool::new(vec![]);
        assert!(tool.is_command_allowed("anything goes"));
    }

    #[test]
    fn sudo_is_made_non_interactive() {
        assert_eq!(non_interactive("sudo apt-get update"), ("sudo -n apt-get update".into(), true));
        assert_eq!(non_interactive("  sudo -n whoami"), ("sudo -n whoami".into(), true));
        assert_eq!(non_interactive("sudoku --solve"), ("sudoku --solve".into(), false));
        assert_eq!(non_interactive("echo sudo"), ("echo sudo".into(), false));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_utf8("hello", 10), ("hello", false));
        assert_eq!(truncate_utf8("hello", 3), ("hel", true));
        // 'é' is two bytes; cutting at 2 would split it.
        assert_eq!(truncate_utf8("aé", 2), ("a", true));
    }

    #[test]
    fn failure_reasons() {
        assert_eq!(
            FailureReason::classify(Some(127), "sh: 1: nope: not found", false),
            FailureReason::CommandNotInstalled
        );
        assert_eq!(
            FailureReason::classify(Some(1), "bash: foo: command not found", false),
            FailureReason::CommandNotInstalled
        );
        assert_eq!(
            FailureReason::classify(Some(1), "sudo: a password is required", true),
            FailureReason::PasswordRequired
        );
        assert_eq!(
            FailureReason::classify(Some(2), "ls: cannot access 'x'", false),
            FailureReason::ExecutionFailed
        );
    }

    #[tokio::test]
    async fn execute_echo() {
        let tool = ShellTool::new(vec![]);
        let result = tool
            .execute(json!({"command": "echo hello"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.payload["exit_code"], 0);
        assert_eq!(result.payload["stdout"], "hello");
        assert_eq!(result.payload["truncated"], false);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_a_failed_output() {
        let tool = ShellTool::new(vec![]);
        let result = tool
            .execute(json!({"command": "echo oops >&2; exit 3"}))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.payload["exit_code"], 3);
        assert_eq!(result.payload["stderr"], "oops");
        assert_eq!(result.payload["reason"], "ExecutionFailed");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_program_is_not_installed() {
        let tool = ShellTool::new(vec![]);
        let result = tool
            .execute(json!({"command": "definitely-not-a-real-program-xyz"}))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.payload["reason"], "CommandNotInstalled");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn output_is_truncated() {
        let tool = ShellTool::new(vec![]).with_output_limit(4);
        let result = tool
            .execute(json!({"command": "echo abcdefgh"}))
            .await
            .unwrap();
        assert_eq!(result.payload["stdout"], "abcd");
        assert_eq!(result.payload["truncated"], true);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();

        let tool = ShellTool::new(vec![]);
        let result = tool
            .execute(json!({"command": "ls", "working_dir": dir.path().to_str().unwrap()}))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.payload["stdout"].as_str().unwrap().contains("marker.txt"));

        let tool = ShellTool::new(vec![]).with_working_dir(Some(dir.path().to_path_buf()));
        let result = tool.execute(json!({"command": "ls"})).await.unwrap();
        assert!(result.payload["stdout"].as_str().unwrap().contains("marker.txt"));
    }

    #[tokio::test]
    async fn blocked_command() {
        let tool = ShellTool::new(vec!["ls".into()]);
        let result = tool.execute(json!({"command": "rm -rf /"})).await;
        assert!(matches!(result, Err(ToolError::PermissionDenied { .. })));
    }

    #[tokio::test]
    async fn missing_working_dir_is_an_execution_error() {
        let tool = ShellTool::new(vec![]);
        let result = tool
            .execute(json!({"command": "ls", "working_dir": "/no/such/dir/anywhere"}))
            .await;
        assert!(matches!(result, Err(ToolError::ExecutionFailed { .. })));
    }
}
