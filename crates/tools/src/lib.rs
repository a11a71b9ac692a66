//! Built-in tool implementations for Wela.
//!
//! Tools give the agent the ability to act: end the conversation, tell the
//! time, write files, and run terminal commands.

pub mod current_time;
pub mod quit;
pub mod terminal;
pub mod write_file;

pub use current_time::CurrentTimeTool;
pub use quit::QuitTool;
pub use terminal::TerminalTool;
pub use write_file::WriteFileTool;

use tracing::warn;
use wela_config::ToolsConfig;
use wela_core::tool::{Tool, ToolRegistry};

/// Create a registry with every built-in tool.
pub fn default_registry() -> ToolRegistry {
    from_config(&ToolsConfig::default())
}

/// Create a registry with the tools named in `config.enabled`.
/// Unknown names are logged and skipped.
pub fn from_config(config: &ToolsConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for name in &config.enabled {
        let tool: Box<dyn Tool> = match name.as_str() {
            "quit" => Box::new(QuitTool),
            "current_time" => Box::new(CurrentTimeTool),
            "write_file" => Box::new(WriteFileTool::new()),
            "terminal" => Box::new(TerminalTool::new(config.allowed_commands.clone())),
            other => {
                warn!(tool = %other, "Unknown tool in config, skipping");
                continue;
            }
        };
        registry.register(tool);
    }
    registry
}
