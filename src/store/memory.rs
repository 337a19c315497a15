//! In-memory [`VectorStore`] for tests and local development
//!
//! Vector search is brute-force cosine similarity over all stored points.
//! Scrolling walks points in insertion order and hands out numeric offsets.

use super::{MessageFilter, MessagePayload, PageOffset, ScoredMessage, ScrollPage, VectorStore};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::RwLock;

struct StoredPoint {
    id: u64,
    vector: Vec<f32>,
    raw: Map<String, Value>,
}

/// In-memory store
pub struct InMemoryStore {
    collection: String,
    points: RwLock<Vec<StoredPoint>>,
}

impl InMemoryStore {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            points: RwLock::new(Vec::new()),
        }
    }

    /// Add a point; ids are assigned sequentially from 0
    pub fn insert(&self, vector: Vec<f32>, payload: Value) -> Result<u64> {
        let raw = match payload {
            Value::Object(map) => map,
            other => {
                return Err(Error::InvalidRequest(format!(
                    "payload must be a JSON object, got {other}"
                )))
            }
        };

        let mut points = self
            .points
            .write()
            .map_err(|_| Error::Other("in-memory store lock poisoned".to_string()))?;
        let id = points.len() as u64;
        points.push(StoredPoint { id, vector, raw });
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.points.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<StoredPoint>>> {
        self.points
            .read()
            .map_err(|_| Error::Other("in-memory store lock poisoned".to_string()))
    }
}

fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn search(
        &self,
        vector: Vec<f32>,
        filter: &MessageFilter,
        limit: usize,
    ) -> Result<Vec<ScoredMessage>> {
        let points = self.read()?;
        let mut scored: Vec<(f32, &StoredPoint)> = points
            .iter()
            .filter(|p| filter.matches(&p.raw))
            .map(|p| (cosine_sim(&vector, &p.vector), p))
            .collect();

        // Stable: equal scores keep insertion order
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(score, p)| ScoredMessage {
                id: p.id.to_string(),
                score,
                payload: MessagePayload::from(p.raw.clone()),
            })
            .collect())
    }

    async fn scroll(
        &self,
        filter: &MessageFilter,
        page_size: usize,
        offset: Option<PageOffset>,
    ) -> Result<ScrollPage> {
        let start = match offset {
            None => 0,
            Some(PageOffset::Num(n)) => n,
            Some(PageOffset::Uuid(id)) => {
                return Err(Error::VectorStoreUnavailable(format!(
                    "in-memory store uses numeric offsets, got {id}"
                )))
            }
        };

        let points = self.read()?;
        let mut matching = points
            .iter()
            .filter(|p| p.id >= start && filter.matches(&p.raw));

        let page: Vec<&StoredPoint> = matching.by_ref().take(page_size).collect();
        let next_offset = matching.next().map(|p| PageOffset::Num(p.id));

        Ok(ScrollPage {
            points: page
                .into_iter()
                .map(|p| MessagePayload::from(p.raw.clone()))
                .collect(),
            next_offset,
        })
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.read()?.len() as u64)
    }

    async fn collection_exists(&self) -> Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_with(n: usize) -> InMemoryStore {
        let store = InMemoryStore::new("test");
        for i in 0..n {
            store
                .insert(
                    vec![1.0, i as f32],
                    json!({"source_file": if i % 2 == 0 { "even" } else { "odd" }, "message_index": i}),
                )
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_search_orders_by_cosine() {
        let store = InMemoryStore::new("test");
        store.insert(vec![0.0, 1.0], json!({"text": "orthogonal"})).unwrap();
        store.insert(vec![1.0, 0.0], json!({"text": "aligned"})).unwrap();

        let hits = store
            .search(vec![1.0, 0.0], &MessageFilter::new(), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].payload.text.as_deref(), Some("aligned"));
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_scroll_pages_until_exhausted() {
        let store = store_with(7);
        let filter = MessageFilter::new().with_match("source_file", "even");

        let first = store.scroll(&filter, 2, None).await.unwrap();
        assert_eq!(first.points.len(), 2);
        assert_eq!(first.next_offset, Some(PageOffset::Num(4)));

        let second = store.scroll(&filter, 2, first.next_offset).await.unwrap();
        assert_eq!(second.points.len(), 2);
        assert_eq!(second.points[1].message_index, Some(6));
        assert_eq!(second.next_offset, None);
    }

    #[tokio::test]
    async fn test_insert_rejects_non_object_payload() {
        let store = InMemoryStore::new("test");
        assert!(store.insert(vec![1.0], json!([1, 2])).is_err());
        assert!(store.is_empty());
    }
}
