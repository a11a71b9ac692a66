//! ChatModel trait — the abstraction over LLM backends.
//!
//! A chat model knows how to send a transcript to an LLM and get the answer
//! back, either as a complete message or as a stream of index-addressed
//! deltas. The agent loop only ever talks to this trait; it never inspects
//! which concrete provider sits behind it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::message::{Message, Role};

/// A chat-completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The model to use (e.g., "gpt-4o-mini")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Sampling temperature; provider default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Tools the model may call. Empty = tools are not advertised at all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,

    /// Stop sequences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            tools: Vec::new(),
            stream: false,
            stop: Vec::new(),
        }
    }
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema (`type: object`) describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A complete (non-streaming) response from a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The generated message
    pub message: Message,

    /// Token usage statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Which model actually responded
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A partial update to one in-progress message, addressed by choice index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    /// Which choice slot this delta belongs to
    #[serde(default)]
    pub index: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    /// Content fragment to append
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Partial tool calls, each addressed by its index within the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDelta>>,

    /// Set on the terminal delta of a choice ("stop", "tool_calls", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

impl Delta {
    /// A content-only delta.
    pub fn text(index: u32, content: impl Into<String>) -> Self {
        Self {
            index,
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// A terminal delta.
    pub fn finish(index: u32, reason: impl Into<String>) -> Self {
        Self {
            index,
            finish_reason: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn is_finish(&self) -> bool {
        self.finish_reason.is_some()
    }
}

/// A fragment of one tool call inside a [`Delta`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionDelta>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// One item of a streaming response: the deltas of every choice that moved,
/// plus usage on the last chunk when the provider reports it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub choices: Vec<Delta>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl From<Delta> for StreamChunk {
    fn from(delta: Delta) -> Self {
        Self {
            choices: vec![delta],
            usage: None,
        }
    }
}

/// Break a complete message into the delta sequence a streaming provider
/// would have produced for it: role and content first, then one delta per
/// tool call, then the terminal delta.
pub fn deltas_from_message(message: &Message, index: u32) -> Vec<Delta> {
    let mut deltas = vec![Delta {
        index,
        role: Some(message.role),
        content: Some(message.text()),
        ..Default::default()
    }];

    for (i, call) in message.tool_calls.iter().enumerate() {
        deltas.push(Delta {
            index,
            tool_calls: Some(vec![ToolCallDelta {
                index: i as u32,
                id: Some(call.id.clone()),
                r#type: Some(call.r#type.clone()),
                function: Some(FunctionDelta {
                    name: Some(call.function.name.clone()),
                    arguments: Some(call.function.arguments.clone()),
                }),
            }]),
            ..Default::default()
        });
    }

    let reason = if message.has_tool_calls() { "tool_calls" } else { "stop" };
    deltas.push(Delta::finish(index, reason));
    deltas
}

/// An embedding request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// The model to use for embeddings (e.g., "text-embedding-3-small").
    pub model: String,

    /// The texts to embed.
    pub inputs: Vec<String>,
}

/// An embedding response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    /// The embedding vectors, one per input text.
    pub embeddings: Vec<Vec<f32>>,

    /// Which model was used.
    pub model: String,
}

/// The receiving half of a streaming response.
pub type ChunkReceiver = mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>;

/// The core ChatModel trait.
///
/// Every LLM backend implements this trait. `streaming()` reports how the
/// backend prefers to answer; the agent loop picks blocking or streaming
/// prediction from it without knowing the concrete type.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// A human-readable name for this backend (e.g., "openai").
    fn name(&self) -> &str;

    /// Whether this model answers incrementally.
    fn streaming(&self) -> bool {
        false
    }

    /// Send a request and get a complete response.
    async fn complete(&self, request: ChatRequest) -> std::result::Result<ChatResponse, ProviderError>;

    /// Send a request and get a stream of delta chunks.
    ///
    /// Default implementation calls `complete()` and decomposes the message
    /// with [`deltas_from_message`].
    async fn stream(&self, request: ChatRequest) -> std::result::Result<ChunkReceiver, ProviderError> {
        let response = self.complete(request).await?;
        let deltas = deltas_from_message(&response.message, 0);
        let (tx, rx) = mpsc::channel(deltas.len() + 1);
        for delta in deltas {
            let _ = tx.send(Ok(delta.into())).await;
        }
        if response.usage.is_some() {
            let _ = tx
                .send(Ok(StreamChunk {
                    choices: Vec::new(),
                    usage: response.usage,
                }))
                .await;
        }
        Ok(rx)
    }

    /// Generate embeddings for the given texts.
    ///
    /// Default implementation returns an error indicating embeddings aren't supported.
    async fn embed(
        &self,
        _request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, ProviderError> {
        Err(ProviderError::NotConfigured(format!(
            "Model '{}' does not support embeddings",
            self.name()
        )))
    }
}
