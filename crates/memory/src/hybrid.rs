//! Hybrid memory: a recency window plus similarity recall.
//!
//! Every stored message is embedded (one point per text segment) and
//! upserted into a vector collection. The last `window_size` messages are
//! also kept locally and always come back on recall; the rest of the
//! `limit` budget is filled by the best long-term hits. The result is
//! deduplicated by message `uuid` and returned in chronological (`id`)
//! order.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;
use wela_core::error::{Error, MemoryError};
use wela_core::memory::{Embedder, Memory, Point, PointPayload, ScoredPoint, VectorStore};
use wela_core::message::Message;

use crate::vector::by_score_desc;

/// Synthetic score of window entries; no similarity hit can beat it, so
/// the window survives both the threshold and the top-`limit` cut.
const WINDOW_SCORE: f32 = f32::MAX;

struct WindowState {
    points: VecDeque<Point>,
    next_id: u64,
}

pub struct HybridMemory {
    memory_key: String,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    window_size: usize,
    limit: usize,
    score_threshold: Option<f32>,
    state: Mutex<WindowState>,
}

impl HybridMemory {
    /// Bind to `collection`, creating it if needed. Point ids continue from
    /// the collection's current size.
    pub async fn new(
        collection: impl Into<String>,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        window_size: usize,
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Self, Error> {
        if limit < window_size {
            return Err(Error::Config {
                message: format!("memory limit ({limit}) must be >= window_size ({window_size})"),
            });
        }

        let memory_key = collection.into();
        store.create_collection(&memory_key, embedder.dimensions()).await?;
        let next_id = store.count(&memory_key).await? + 1;

        debug!(
            collection = %memory_key,
            store = store.name(),
            next_id,
            window_size,
            limit,
            "Hybrid memory ready"
        );

        Ok(Self {
            memory_key,
            store,
            embedder,
            window_size,
            limit,
            score_threshold,
            state: Mutex::new(WindowState {
                points: VecDeque::with_capacity(window_size + 1),
                next_id,
            }),
        })
    }

    /// Ids currently held in the recency window, oldest first.
    pub async fn window_ids(&self) -> Vec<u64> {
        self.state.lock().await.points.iter().map(|p| p.id).collect()
    }

    async fn recall(&self, incoming: &[Message]) -> Vec<ScoredPoint> {
        let candidates = self.limit - self.window_size;
        if candidates == 0 {
            return Vec::new();
        }

        let segments: Vec<String> = incoming
            .iter()
            .flat_map(|m| m.content.text_segments())
            .collect();
        if segments.is_empty() {
            return Vec::new();
        }

        let vectors = match self.embedder.embed(&segments).await {
            Ok(v) => v,
            Err(e) => {
                warn!(collection = %self.memory_key, error = %e, "Recall embedding failed, using window only");
                return Vec::new();
            }
        };

        let mut hits = Vec::new();
        for vector in &vectors {
            match self
                .store
                .search(&self.memory_key, vector, candidates, self.score_threshold)
                .await
            {
                Ok(found) => hits.extend(found),
                Err(e) => {
                    warn!(collection = %self.memory_key, error = %e, "Recall search failed for one segment");
                }
            }
        }
        hits
    }
}

/// Dedup by uuid (best score wins), keep the top `limit` by score, then
/// restore chronological order.
fn merge(hits: Vec<ScoredPoint>, limit: usize) -> Vec<ScoredPoint> {
    let mut best: HashMap<String, ScoredPoint> = HashMap::new();
    for hit in hits {
        match best.get(&hit.payload.uuid) {
            Some(existing) if existing.score >= hit.score => {}
            _ => {
                best.insert(hit.payload.uuid.clone(), hit);
            }
        }
    }

    let mut merged: Vec<ScoredPoint> = best.into_values().collect();
    merged.sort_by(|a, b| by_score_desc(a.score, b.score).then(a.id.cmp(&b.id)));
    merged.truncate(limit);
    merged.sort_by_key(|p| p.id);
    merged
}

#[async_trait]
impl Memory for HybridMemory {
    fn memory_key(&self) -> &str {
        &self.memory_key
    }

    async fn add_message(&self, message: &Message) -> Result<(), MemoryError> {
        let segments = message.content.text_segments();
        if segments.is_empty() {
            debug!(collection = %self.memory_key, "Nothing to embed, message not stored");
            return Ok(());
        }

        let vectors = self.embedder.embed(&segments).await?;
        let uuid = Uuid::new_v4().to_string();

        // Held across the upsert so ids reach the store in window order
        let mut state = self.state.lock().await;
        let first_id = state.next_id;
        let points: Vec<Point> = segments
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (text, vector))| Point {
                id: first_id + i as u64,
                vector,
                payload: PointPayload {
                    uuid: uuid.clone(),
                    message: message.clone(),
                    source_text: vec![text],
                },
            })
            .collect();
        let Some(last) = points.last().cloned() else {
            return Ok(());
        };
        let count = points.len();

        // Ids and the window advance only once the store holds the points
        self.store.upsert(&self.memory_key, points).await?;
        state.next_id = first_id + count as u64;

        state.points.push_back(last);
        while state.points.len() > self.window_size {
            state.points.pop_front();
        }

        debug!(collection = %self.memory_key, points = count, %uuid, "Stored message");
        Ok(())
    }

    async fn get_messages(&self, incoming: &[Message]) -> Result<Vec<Message>, MemoryError> {
        let mut hits = self.recall(incoming).await;
        let recalled = hits.len();

        {
            let state = self.state.lock().await;
            hits.extend(state.points.iter().map(|p| ScoredPoint {
                id: p.id,
                score: WINDOW_SCORE,
                payload: p.payload.clone(),
            }));
        }

        let merged = merge(hits, self.limit);
        debug!(
            collection = %self.memory_key,
            recalled,
            returned = merged.len(),
            "Retrieved memory"
        );
        Ok(merged.into_iter().map(|p| p.payload.message).collect())
    }
}
