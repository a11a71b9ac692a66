//! Embeddings through a chat model's `/embeddings` endpoint.

use async_trait::async_trait;
use std::sync::Arc;
use wela_core::error::MemoryError;
use wela_core::memory::Embedder;
use wela_core::provider::{ChatModel, EmbeddingRequest};

/// Adapts [`ChatModel::embed`] to the [`Embedder`] contract.
pub struct ProviderEmbedder {
    model: Arc<dyn ChatModel>,
    embedding_model: String,
    dimensions: usize,
}

impl ProviderEmbedder {
    pub fn new(model: Arc<dyn ChatModel>, embedding_model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            model,
            embedding_model: embedding_model.into(),
            dimensions,
        }
    }
}

#[async_trait]
impl Embedder for ProviderEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MemoryError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .model
            .embed(EmbeddingRequest {
                model: self.embedding_model.clone(),
                inputs: texts.to_vec(),
            })
            .await
            .map_err(|e| MemoryError::EmbeddingFailed(e.to_string()))?;

        if response.embeddings.len() != texts.len() {
            return Err(MemoryError::EmbeddingFailed(format!(
                "asked for {} embeddings, got {}",
                texts.len(),
                response.embeddings.len()
            )));
        }
        if let Some(bad) = response.embeddings.iter().find(|v| v.len() != self.dimensions) {
            return Err(MemoryError::EmbeddingFailed(format!(
                "{} returned {} dimensions, expected {}",
                self.embedding_model,
                bad.len(),
                self.dimensions
            )));
        }

        Ok(response.embeddings)
    }
}
