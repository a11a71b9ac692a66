//! The reserved `quit` tool.
//!
//! Offering it lets the model end the conversation; the agent loop turns a
//! call to it into a quit outcome instead of another round-trip.

use async_trait::async_trait;
use wela_core::error::ToolError;
use wela_core::tool::{QUIT_TOOL_NAME, Tool};

pub struct QuitTool;

#[async_trait]
impl Tool for QuitTool {
    fn name(&self) -> &str {
        QUIT_TOOL_NAME
    }

    fn description(&self) -> &str {
        "End the conversation. Call this when the user says goodbye or asks to stop."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "farewell": {
                    "type": "string",
                    "description": "Optional parting words for the user"
                }
            }
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        Ok(arguments["farewell"]
            .as_str()
            .filter(|s| !s.is_empty())
            .unwrap_or("Goodbye.")
            .to_string())
    }
}
