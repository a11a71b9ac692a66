//! Conversation memory implementations for Wela.

pub mod buffer;
pub mod embedder;
pub mod hybrid;
pub mod in_memory;
pub mod noop;
pub mod qdrant;
pub mod vector;

pub use buffer::{BufferMemory, WindowBufferMemory};
pub use embedder::ProviderEmbedder;
pub use hybrid::HybridMemory;
pub use in_memory::InMemoryVectorStore;
pub use noop::NoopMemory;
pub use qdrant::QdrantStore;
pub use vector::cosine_similarity;

use std::sync::Arc;
use wela_config::{MemoryBackendKind, MemoryConfig, VectorStoreKind};
use wela_core::memory::{Memory, VectorStore};
use wela_core::provider::ChatModel;

/// Build the configured memory. `model` supplies embeddings for the hybrid
/// backend.
pub async fn build_from_config(
    config: &MemoryConfig,
    model: Arc<dyn ChatModel>,
) -> wela_core::Result<Arc<dyn Memory>> {
    let memory: Arc<dyn Memory> = match config.backend {
        MemoryBackendKind::None => Arc::new(NoopMemory),
        MemoryBackendKind::Buffer => Arc::new(BufferMemory::new(&config.memory_key)),
        MemoryBackendKind::Window => Arc::new(WindowBufferMemory::new(
            &config.memory_key,
            config.window_size,
        )),
        MemoryBackendKind::Hybrid => {
            let store: Arc<dyn VectorStore> = match config.vector_store {
                VectorStoreKind::InMemory => Arc::new(InMemoryVectorStore::new()),
                VectorStoreKind::Qdrant => Arc::new(QdrantStore::new(
                    &config.qdrant_url,
                    config.qdrant_api_key.clone(),
                )?),
            };
            let embedder = Arc::new(ProviderEmbedder::new(
                model,
                &config.embedding_model,
                config.vector_size,
            ));
            Arc::new(
                HybridMemory::new(
                    &config.memory_key,
                    store,
                    embedder,
                    config.window_size,
                    config.limit,
                    config.score_threshold,
                )
                .await?,
            )
        }
    };

    tracing::info!(backend = ?config.backend, key = %config.memory_key, "Memory initialized");
    Ok(memory)
}
