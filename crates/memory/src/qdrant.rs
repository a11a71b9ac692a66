//! Qdrant-backed vector store.
//!
//! Collections use cosine distance. Point ids are the caller's monotonic
//! `u64`s; the [`PointPayload`] is stored as the Qdrant payload, field for
//! field.

use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::{
    CountPointsBuilder, CreateCollectionBuilder, Distance, PointId, PointStruct,
    QueryPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use tracing::{debug, warn};
use wela_core::error::MemoryError;
use wela_core::memory::{Point, PointPayload, ScoredPoint, VectorStore};

pub struct QdrantStore {
    client: Qdrant,
}

impl QdrantStore {
    /// Connect to the gRPC endpoint at `url`. `api_key` authenticates
    /// against Qdrant Cloud.
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self, MemoryError> {
        let mut builder = Qdrant::from_url(url);
        if let Some(api_key) = api_key {
            builder = builder.api_key(api_key);
        }
        let client = builder
            .build()
            .map_err(|e| MemoryError::Storage(format!("qdrant connection failed: {e}")))?;
        Ok(Self { client })
    }

    async fn exists(&self, collection: &str) -> Result<bool, MemoryError> {
        self.client
            .collection_exists(collection)
            .await
            .map_err(|e| MemoryError::Storage(format!("qdrant collection check failed: {e}")))
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    fn name(&self) -> &str {
        "qdrant"
    }

    async fn create_collection(&self, collection: &str, vector_size: usize) -> Result<(), MemoryError> {
        if self.exists(collection).await? {
            debug!(collection, "Qdrant collection already exists");
            return Ok(());
        }

        let request = CreateCollectionBuilder::new(collection)
            .vectors_config(VectorParamsBuilder::new(vector_size as u64, Distance::Cosine));
        if let Err(e) = self.client.create_collection(request).await {
            // A concurrent creator may have won the race
            if !self.exists(collection).await.unwrap_or(false) {
                return Err(MemoryError::CollectionUnavailable(format!("{collection}: {e}")));
            }
            debug!(collection, error = %e, "Qdrant collection created concurrently");
            return Ok(());
        }

        debug!(collection, vector_size, "Qdrant collection ready");
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<(), MemoryError> {
        if points.is_empty() {
            return Ok(());
        }
        let points = points
            .into_iter()
            .map(to_point_struct)
            .collect::<Result<Vec<_>, _>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(|e| MemoryError::Storage(format!("qdrant upsert into '{collection}' failed: {e}")))?;
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPoint>, MemoryError> {
        let mut request = QueryPointsBuilder::new(collection)
            .query(vector.to_vec())
            .limit(limit as u64)
            .with_payload(true);
        if let Some(threshold) = score_threshold {
            request = request.score_threshold(threshold);
        }

        let response = self
            .client
            .query(request)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("qdrant search in '{collection}' failed: {e}")))?;
        Ok(response.result.into_iter().filter_map(from_scored_point).collect())
    }

    async fn count(&self, collection: &str) -> Result<u64, MemoryError> {
        let response = self
            .client
            .count(CountPointsBuilder::new(collection).exact(true))
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("qdrant count of '{collection}' failed: {e}")))?;
        Ok(response.result.map(|c| c.count).unwrap_or(0))
    }
}

fn to_point_struct(point: Point) -> Result<PointStruct, MemoryError> {
    let json = serde_json::to_value(&point.payload)
        .map_err(|e| MemoryError::Storage(format!("point {} payload: {e}", point.id)))?;
    let payload = Payload::try_from(json)
        .map_err(|e| MemoryError::Storage(format!("point {} payload: {e}", point.id)))?;
    Ok(PointStruct::new(point.id, point.vector, payload))
}

fn numeric_id(id: Option<PointId>) -> Option<u64> {
    match id?.point_id_options? {
        PointIdOptions::Num(n) => Some(n),
        PointIdOptions::Uuid(_) => None,
    }
}

/// Hits that are not one of ours (uuid ids, foreign payloads) are skipped.
fn from_scored_point(hit: qdrant_client::qdrant::ScoredPoint) -> Option<ScoredPoint> {
    let Some(id) = numeric_id(hit.id) else {
        warn!("Skipping qdrant point without a numeric id");
        return None;
    };

    let json: serde_json::Map<String, serde_json::Value> = hit
        .payload
        .into_iter()
        .map(|(key, value)| (key, value.into_json()))
        .collect();

    match serde_json::from_value::<PointPayload>(serde_json::Value::Object(json)) {
        Ok(payload) => Some(ScoredPoint {
            id,
            score: hit.score,
            payload,
        }),
        Err(e) => {
            warn!(id, error = %e, "Skipping qdrant point with foreign payload");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use wela_core::message::Message;

    fn stored(id: u64, text: &str) -> Point {
        Point {
            id,
            vector: vec![1.0, 0.0],
            payload: PointPayload {
                uuid: format!("u-{id}"),
                message: Message::user(text),
                source_text: vec![text.into()],
            },
        }
    }

    #[tokio::test]
    async fn client_builds_without_connecting() {
        let store = QdrantStore::new("http://localhost:6334", Some("key".into())).unwrap();
        assert_eq!(store.name(), "qdrant");
    }

    #[test]
    fn point_keeps_numeric_id_and_payload_fields() {
        let point = to_point_struct(stored(7, "remember the milk")).unwrap();
        assert_eq!(numeric_id(point.id.clone()), Some(7));
        assert!(point.payload.contains_key("uuid"));
        assert!(point.payload.contains_key("message"));
        assert!(point.payload.contains_key("source_text"));
    }

    #[test]
    fn stored_payload_reads_back_as_scored_point() {
        let point = to_point_struct(stored(3, "rust")).unwrap();
        let hit = qdrant_client::qdrant::ScoredPoint {
            id: point.id,
            payload: point.payload,
            score: 0.91,
            ..Default::default()
        };

        let scored = from_scored_point(hit).unwrap();
        assert_eq!(scored.id, 3);
        assert_eq!(scored.score, 0.91);
        assert_eq!(scored.payload.uuid, "u-3");
        assert_eq!(scored.payload.message, Message::user("rust"));
    }

    #[test]
    fn foreign_payload_is_skipped() {
        let hit = qdrant_client::qdrant::ScoredPoint {
            id: Some(PointId::from(4u64)),
            payload: HashMap::from([(
                "title".to_string(),
                qdrant_client::qdrant::Value::from("not ours".to_string()),
            )]),
            score: 0.8,
            ..Default::default()
        };
        assert!(from_scored_point(hit).is_none());
    }

    #[test]
    fn uuid_point_is_skipped() {
        let point = to_point_struct(stored(1, "rust")).unwrap();
        let hit = qdrant_client::qdrant::ScoredPoint {
            id: Some(PointId::from("5c56c793-69f3-4fbf-87e6-c4bf54c28c26".to_string())),
            payload: point.payload,
            score: 0.5,
            ..Default::default()
        };
        assert!(from_scored_point(hit).is_none());
    }
}
