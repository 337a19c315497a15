//! Vector store access
//!
//! This module defines the read-only operations the query path needs from
//! the vector store and provides:
//! - A Qdrant-backed implementation
//! - An in-memory implementation for tests and local development
//! - The paged scan used to rebuild context windows and thread previews

mod memory;
mod payload;
mod qdrant;
mod scan;

pub use memory::*;
pub use payload::*;
pub use qdrant::*;
pub use scan::*;

use crate::error::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// A single predicate on a payload field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldCondition {
    /// Exact keyword match
    Match { key: String, value: String },
    /// Inclusive numeric range; absent bounds are open
    Range {
        key: String,
        gte: Option<f64>,
        lte: Option<f64>,
    },
}

impl FieldCondition {
    fn matches(&self, payload: &Map<String, Value>) -> bool {
        match self {
            FieldCondition::Match { key, value } => {
                payload_str(payload, key).is_some_and(|v| v == *value)
            }
            FieldCondition::Range { key, gte, lte } => {
                let Some(n) = payload.get(key).and_then(Value::as_f64) else {
                    return false;
                };
                gte.map_or(true, |lo| n >= lo) && lte.map_or(true, |hi| n <= hi)
            }
        }
    }
}

/// Conjunction of field conditions; empty means "everything"
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageFilter {
    pub conditions: Vec<FieldCondition>,
}

impl MessageFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_match(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.push(FieldCondition::Match {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_range(mut self, key: impl Into<String>, gte: Option<f64>, lte: Option<f64>) -> Self {
        if gte.is_some() || lte.is_some() {
            self.conditions.push(FieldCondition::Range {
                key: key.into(),
                gte,
                lte,
            });
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate the filter against a raw payload
    pub fn matches(&self, payload: &Map<String, Value>) -> bool {
        self.conditions.iter().all(|c| c.matches(payload))
    }
}

/// Opaque cursor for the next scroll page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOffset {
    Num(u64),
    Uuid(String),
}

/// A similarity search hit
#[derive(Debug, Clone)]
pub struct ScoredMessage {
    pub id: String,
    pub score: f32,
    pub payload: MessagePayload,
}

/// One page of a filtered scroll
#[derive(Debug, Clone, Default)]
pub struct ScrollPage {
    pub points: Vec<MessagePayload>,
    /// `None` once the store has no further pages
    pub next_offset: Option<PageOffset>,
}

/// Read-only vector store operations used by the query path
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Name of the collection being served
    fn collection(&self) -> &str;

    /// Nearest neighbours of `vector` among points matching `filter`,
    /// best first
    async fn search(
        &self,
        vector: Vec<f32>,
        filter: &MessageFilter,
        limit: usize,
    ) -> Result<Vec<ScoredMessage>>;

    /// Next page of points matching `filter`, starting at `offset`
    async fn scroll(
        &self,
        filter: &MessageFilter,
        page_size: usize,
        offset: Option<PageOffset>,
    ) -> Result<ScrollPage>;

    /// Exact number of points in the collection
    async fn count(&self) -> Result<u64>;

    async fn collection_exists(&self) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(MessageFilter::new().matches(&Map::new()));
    }

    #[test]
    fn test_match_and_range_conjunction() {
        let filter = MessageFilter::new()
            .with_match("channel_lower", "deploys")
            .with_range("ts_float", Some(100.0), Some(200.0));

        assert!(filter.matches(&map(json!({"channel_lower": "deploys", "ts_float": 100.0}))));
        assert!(filter.matches(&map(json!({"channel_lower": "deploys", "ts_float": 200.0}))));
        assert!(!filter.matches(&map(json!({"channel_lower": "deploys", "ts_float": 99.5}))));
        assert!(!filter.matches(&map(json!({"channel_lower": "general", "ts_float": 150.0}))));
        assert!(!filter.matches(&map(json!({"channel_lower": "deploys"}))));
    }

    #[test]
    fn test_open_range_is_not_added() {
        let filter = MessageFilter::new().with_range("ts_float", None, None);
        assert!(filter.is_empty());
    }
}
