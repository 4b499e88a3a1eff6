//! Built-in tools for Sentient.
//!
//! The agent acts on the machine through exactly two tools: `shell` runs a
//! command, `environment_info` reports the OS and package manager.

pub mod environment_info;
pub mod shell;

use sentient_config::ToolsConfig;
use sentient_core::tool::ToolRegistry;

pub use environment_info::EnvironmentInfoTool;
pub use shell::ShellTool;

/// Build the registry the agent runs with.
pub fn default_registry(config: &ToolsConfig) -> ToolRegistry {
    let shell = ShellTool::new(config.allowed_commands.clone())
        .with_working_dir(config.working_dir.clone())
        .with_output_limit(config.output_limit_bytes);

    ToolRegistry::builder()
        .register(shell)
        .register(EnvironmentInfoTool::new())
        .build()
}
