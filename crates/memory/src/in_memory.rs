//! In-process vector store — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use wela_core::error::MemoryError;
use wela_core::memory::{Point, ScoredPoint, VectorStore};

use crate::vector::{by_score_desc, cosine_similarity};

struct Collection {
    vector_size: usize,
    points: BTreeMap<u64, Point>,
}

/// A vector store that keeps every collection in a map and scores by
/// cosine similarity. Nothing survives the process.
#[derive(Clone, Default)]
pub struct InMemoryVectorStore {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn create_collection(&self, collection: &str, vector_size: usize) -> Result<(), MemoryError> {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_insert_with(|| Collection {
                vector_size,
                points: BTreeMap::new(),
            });
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<(), MemoryError> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| MemoryError::CollectionUnavailable(collection.to_string()))?;

        if let Some(bad) = points.iter().find(|p| p.vector.len() != target.vector_size) {
            return Err(MemoryError::Storage(format!(
                "point {} has {} dimensions, collection '{}' expects {}",
                bad.id,
                bad.vector.len(),
                collection,
                target.vector_size
            )));
        }

        for point in points {
            target.points.insert(point.id, point);
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPoint>, MemoryError> {
        let collections = self.collections.read().await;
        let target = collections
            .get(collection)
            .ok_or_else(|| MemoryError::CollectionUnavailable(collection.to_string()))?;

        let mut hits: Vec<ScoredPoint> = target
            .points
            .values()
            .map(|p| ScoredPoint {
                id: p.id,
                score: cosine_similarity(&p.vector, vector),
                payload: p.payload.clone(),
            })
            .filter(|hit| score_threshold.is_none_or(|t| hit.score >= t))
            .collect();

        hits.sort_by(|a, b| by_score_desc(a.score, b.score));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn count(&self, collection: &str) -> Result<u64, MemoryError> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .map(|c| c.points.len() as u64)
            .unwrap_or(0))
    }
}
