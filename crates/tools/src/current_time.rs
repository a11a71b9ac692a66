//! Current local date and time.

use async_trait::async_trait;
use wela_core::error::ToolError;
use wela_core::tool::Tool;

/// Format used by both this tool and the prompt's time hint.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current local date, time and weekday."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<String, ToolError> {
        let now = chrono::Local::now();
        Ok(format!("{} ({})", now.format(TIME_FORMAT), now.format("%A")))
    }
}
