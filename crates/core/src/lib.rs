//! # Wela Core
//!
//! Domain types, traits, and error definitions for the Wela conversational agent.
//! This crate has **no framework dependencies** — it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here: the chat model, the tools, the
//! embedder, the vector store and the conversation memory. Implementations live
//! in their respective crates, so the agent loop can be tested against scripted
//! stand-ins and wired to real backends by configuration.

pub mod error;
pub mod event;
pub mod memory;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus, ToolEvent, ToolObserver};
pub use memory::{Embedder, Memory, Point, PointPayload, ScoredPoint, VectorStore};
pub use message::{Content, ContentPart, FunctionCall, Message, Role, ToolCall};
pub use provider::{ChatModel, ChatRequest, ChatResponse, Delta, StreamChunk, ToolDefinition};
pub use tool::{QUIT_TOOL_NAME, Tool, ToolRegistry};
