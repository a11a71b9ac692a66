//! Agent-level streaming events.
//!
//! `AgentStreamEvent` is what [`AgentLoop::predict_stream`](crate::AgentLoop::predict_stream)
//! hands to its consumer: content as it arrives, tool activity once each
//! call is complete, and a terminal event.

use serde::{Deserialize, Serialize};
use wela_core::message::Message;

/// Events emitted by the agent during streaming execution.
///
/// - `chunk`       — partial answer text
/// - `tool_call`   — the agent is invoking a tool
/// - `tool_result` — tool execution completed
/// - `done`        — the turn is complete
/// - `quit`        — the model asked to end the conversation
/// - `error`       — the turn failed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    /// Partial text from the model.
    Chunk { content: String },

    /// The agent is calling a tool.
    ToolCall {
        id: String,
        name: String,
        arguments: String,
    },

    /// Tool execution completed. Failures arrive as `Error: ...` output.
    ToolResult {
        id: String,
        name: String,
        output: String,
    },

    /// The final answer; same message `predict` would have returned.
    Done {
        message: Message,
        iterations: usize,
        tool_calls_made: usize,
    },

    /// The turn ended through the `quit` tool.
    Quit { message: Message, farewell: String },

    /// The turn failed and produced no answer.
    Error { message: String },
}

impl AgentStreamEvent {
    /// Event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Done { .. } => "done",
            Self::Quit { .. } => "quit",
            Self::Error { .. } => "error",
        }
    }

    /// Whether no further events follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Quit { .. } | Self::Error { .. })
    }
}
