//! Memory traits — conversation recall backed by an embedder and a vector store.
//!
//! A [`Memory`] answers two questions for the agent loop: which earlier
//! messages should the model see for this input, and how should a new turn be
//! stored. Vector-backed memories are built from an [`Embedder`] and a
//! [`VectorStore`]; both are external collaborators specified here only at
//! their interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;
use crate::message::Message;

/// What a stored point carries besides its vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointPayload {
    /// Identity of the logical message; shared by every point it spawned
    pub uuid: String,

    /// The message to hand back on recall
    pub message: Message,

    /// The text segment(s) that were embedded for this point
    #[serde(default)]
    pub source_text: Vec<String>,
}

/// One embedded, persisted unit of memory.
///
/// `id` is monotonic and the only ordering key on retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: u64,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

/// A search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: u64,
    pub score: f32,
    pub payload: PointPayload,
}

/// Text → fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Length of every vector this embedder produces.
    fn dimensions(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in order.
    async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, MemoryError>;
}

/// The vector database contract.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// The backend name (e.g., "qdrant", "in_memory").
    fn name(&self) -> &str;

    /// Create a collection. Must tolerate "already exists".
    async fn create_collection(&self, collection: &str, vector_size: usize) -> std::result::Result<(), MemoryError>;

    /// Insert or replace points by id.
    async fn upsert(&self, collection: &str, points: Vec<Point>) -> std::result::Result<(), MemoryError>;

    /// Similarity search, best first. Hits scoring below `score_threshold`
    /// are dropped by the store.
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> std::result::Result<Vec<ScoredPoint>, MemoryError>;

    /// Number of points in the collection.
    async fn count(&self, collection: &str) -> std::result::Result<u64, MemoryError>;
}

/// Conversation memory as seen by the agent loop.
///
/// Implementations: hybrid window + vector recall, plain buffer, sliding
/// window buffer, none (no-op).
#[async_trait]
pub trait Memory: Send + Sync {
    /// The key this memory is bound to (collection name / prompt slot).
    fn memory_key(&self) -> &str;

    /// Store one message.
    async fn add_message(&self, message: &Message) -> std::result::Result<(), MemoryError>;

    /// Prior context relevant to the incoming messages, oldest first.
    async fn get_messages(&self, incoming: &[Message]) -> std::result::Result<Vec<Message>, MemoryError>;
}
