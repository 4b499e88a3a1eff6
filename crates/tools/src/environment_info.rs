//! Environment info tool: what OS and package manager the agent is on.
//!
//! Discovery runs once per tool instance; later calls answer from the
//! cached snapshot and say so in `source`.

use async_trait::async_trait;
use sentient_core::error::ToolError;
use sentient_core::tool::{Tool, ToolOutput};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::OnceCell;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvironmentSnapshot {
    pub os: String,
    pub family: String,
    pub arch: String,
    pub package_manager: Option<String>,
    pub shell: Option<String>,
}

impl EnvironmentSnapshot {
    fn discover() -> Self {
        let os = std::env::consts::OS;
        Self {
            os: os.to_string(),
            family: std::env::consts::FAMILY.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            package_manager: detect_package_manager(os, on_path).map(str::to_string),
            shell: std::env::var("SHELL")
                .or_else(|_| std::env::var("COMSPEC"))
                .ok(),
        }
    }
}

/// First package manager found for `os`, in preference order.
fn detect_package_manager(os: &str, exists: impl Fn(&str) -> bool) -> Option<&'static str> {
    let candidates: &[(&str, &'static str)] = match os {
        "linux" => &[("apt-get", "apt"), ("yum", "yum"), ("dnf", "dnf")],
        "macos" => &[("brew", "brew")],
        "windows" => &[("choco", "choco"), ("winget", "winget")],
        _ => &[],
    };
    candidates
        .iter()
        .find(|(binary, _)| exists(binary))
        .map(|(_, name)| *name)
}

fn on_path(program: &str) -> bool {
    let Some(path) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path).any(|dir| {
        let candidate: PathBuf = dir.join(program);
        candidate.is_file() || (cfg!(windows) && candidate.with_extension("exe").is_file())
    })
}

#[derive(Default)]
pub struct EnvironmentInfoTool {
    snapshot: OnceCell<EnvironmentSnapshot>,
}

impl EnvironmentInfoTool {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Tool for EnvironmentInfoTool {
    fn name(&self) -> &str {
        "environment_info"
    }

    fn description(&self) -> &str {
        "Report the operating system, CPU architecture, default shell and package manager. \
         Call this before installing anything."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        })
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let discovered = AtomicBool::new(false);
        let snapshot = self
            .snapshot
            .get_or_init(|| {
                let flag = &discovered;
                async move {
                    flag.store(true, Ordering::Relaxed);
                    EnvironmentSnapshot::discover()
                }
            })
            .await;
        let source = if discovered.load(Ordering::Relaxed) {
            "discovery"
        } else {
            "cache"
        };
        debug!(source, os = %snapshot.os, "Environment info requested");

        let mut payload = serde_json::to_value(snapshot).map_err(|e| ToolError::ExecutionFailed {
            tool_name: "environment_info".into(),
            reason: e.to_string(),
        })?;
        payload["source"] = json!(source);
        Ok(ToolOutput::ok(payload))
    }
}
