//! Tool invocation with failure containment.
//!
//! Whatever goes wrong with a tool call (unknown name, malformed arguments,
//! the tool failing or timing out) comes back as a tool message whose text
//! starts with `Error:`, so the model can read it and recover.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use wela_core::error::ToolError;
use wela_core::event::{ToolEvent, ToolObserver};
use wela_core::message::{Message, ToolCall};
use wela_core::provider::ToolDefinition;
use wela_core::tool::ToolRegistry;

/// Resolves tool calls against a registry and runs them.
#[derive(Clone)]
pub struct ToolInvoker {
    registry: Arc<ToolRegistry>,
    observers: Vec<Arc<dyn ToolObserver>>,
    timeout: Option<Duration>,
}

impl ToolInvoker {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            observers: Vec::new(),
            timeout: None,
        }
    }

    /// Swap the registry, keeping observers and timeout.
    pub fn with_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ToolObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Bound every call; a call that overruns becomes an error result.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn has_tools(&self) -> bool {
        !self.registry.is_empty()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    /// Run one tool call and return the tool message that answers it.
    pub async fn invoke(&self, call: &ToolCall) -> Message {
        let name = call.name();
        let text = match self.run(call).await {
            Ok(output) => output,
            Err(e) => {
                warn!(tool = %name, call_id = %call.id, error = %e, "Tool call failed");
                format!("Error: {e}")
            }
        };
        Message::tool_result(&call.id, text).with_name(name)
    }

    async fn run(&self, call: &ToolCall) -> Result<String, ToolError> {
        let name = call.name();
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        let arguments = parse_arguments(name, &call.function.arguments)?;

        let mut event = ToolEvent {
            tool_name: name.to_string(),
            arguments,
            result: None,
        };
        for observer in &self.observers {
            observer.before_tool_call(&event);
        }

        debug!(tool = %name, call_id = %call.id, "Invoking tool");
        let execution = tool.execute(event.arguments.clone());
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, execution).await {
                Ok(result) => result,
                Err(_) => Err(ToolError::Timeout {
                    tool_name: name.to_string(),
                    timeout_secs: limit.as_secs(),
                }),
            },
            None => execution.await,
        };

        event.result = Some(match &result {
            Ok(output) => output.clone(),
            Err(e) => format!("Error: {e}"),
        });
        for observer in &self.observers {
            observer.after_tool_call(&event);
        }

        result
    }
}

/// An empty argument string means "no arguments".
fn parse_arguments(tool_name: &str, raw: &str) -> Result<serde_json::Value, ToolError> {
    if raw.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(raw).map_err(|e| ToolError::invalid(tool_name, e.to_string()))
}
