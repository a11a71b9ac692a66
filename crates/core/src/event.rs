//! Tool-call observation and domain events.
//!
//! Observers see a `before_tool_call` / `after_tool_call` pair around every
//! tool invocation. They are fire-and-forget: nothing they do can change the
//! result of a turn. The broadcast [`EventBus`] is one such observer, for
//! components that prefer to subscribe rather than be called.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// What an observer is told about a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolEvent {
    pub tool_name: String,
    pub arguments: serde_json::Value,
    /// Raw tool output; only set for `after_tool_call`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// Callback interface for tool-call observation (UI, logging, audit).
pub trait ToolObserver: Send + Sync {
    fn before_tool_call(&self, _event: &ToolEvent) {}

    fn after_tool_call(&self, _event: &ToolEvent) {}
}

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A tool is about to run
    ToolCallStarted {
        tool_name: String,
        arguments: serde_json::Value,
    },

    /// A tool finished (successfully or with an error result)
    ToolCallFinished {
        tool_name: String,
        arguments: serde_json::Value,
        result: String,
    },

    /// The model answered one round-trip
    ResponseGenerated {
        model: String,
        iteration: usize,
        tokens_used: Option<u32>,
    },

    /// Memory was read or written
    MemoryAccessed {
        operation: String, // "add", "get"
        count: usize,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ToolObserver for EventBus {
    fn before_tool_call(&self, event: &ToolEvent) {
        self.publish(DomainEvent::ToolCallStarted {
            tool_name: event.tool_name.clone(),
            arguments: event.arguments.clone(),
        });
    }

    fn after_tool_call(&self, event: &ToolEvent) {
        self.publish(DomainEvent::ToolCallFinished {
            tool_name: event.tool_name.clone(),
            arguments: event.arguments.clone(),
            result: event.result.clone().unwrap_or_default(),
        });
    }
}
