//! Qdrant-backed vector store

use super::{
    json_from_qdrant_value, FieldCondition, MessageFilter, MessagePayload, PageOffset,
    ScoredMessage, ScrollPage, VectorStore,
};
use crate::config::Config;
use crate::error::{Error, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, Filter, PointId, Range, ScrollPointsBuilder,
    SearchPointsBuilder, Value as QdrantValue,
};
use qdrant_client::Qdrant;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

/// Qdrant store handle
///
/// The underlying client is a long-lived channel shared by every request.
pub struct QdrantStore {
    client: Qdrant,
    collection: String,
}

impl QdrantStore {
    /// Connect to Qdrant using config
    pub fn connect(config: &Config) -> Result<Self> {
        Self::new(&config.qdrant.url, &config.qdrant.collection)
    }

    /// Create a new store handle directly with URL and collection name
    pub fn new(url: &str, collection: &str) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", url);

        let client = Qdrant::from_url(url)
            .skip_compatibility_check()
            .build()
            .map_err(|e| Error::VectorStoreUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            collection: collection.to_string(),
        })
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn search(
        &self,
        vector: Vec<f32>,
        filter: &MessageFilter,
        limit: usize,
    ) -> Result<Vec<ScoredMessage>> {
        debug!(
            "Searching collection {} with limit {}",
            self.collection, limit
        );

        let mut search_builder =
            SearchPointsBuilder::new(&self.collection, vector, limit as u64).with_payload(true);

        if let Some(qdrant_filter) = to_qdrant_filter(filter) {
            search_builder = search_builder.filter(qdrant_filter);
        }

        let response = self.client.search_points(search_builder).await?;

        Ok(response
            .result
            .into_iter()
            .map(|p| ScoredMessage {
                id: point_id_to_string(p.id),
                score: p.score,
                payload: payload_from_qdrant(p.payload),
            })
            .collect())
    }

    async fn scroll(
        &self,
        filter: &MessageFilter,
        page_size: usize,
        offset: Option<PageOffset>,
    ) -> Result<ScrollPage> {
        let mut scroll_builder = ScrollPointsBuilder::new(&self.collection)
            .limit(page_size as u32)
            .with_payload(true)
            .with_vectors(false);

        if let Some(qdrant_filter) = to_qdrant_filter(filter) {
            scroll_builder = scroll_builder.filter(qdrant_filter);
        }

        if let Some(offset) = offset {
            scroll_builder = scroll_builder.offset(page_offset_to_point_id(offset));
        }

        let response = self.client.scroll(scroll_builder).await?;
        debug!(
            "Scrolled {} points from collection {}",
            response.result.len(),
            self.collection
        );

        Ok(ScrollPage {
            points: response
                .result
                .into_iter()
                .map(|p| payload_from_qdrant(p.payload))
                .collect(),
            next_offset: response.next_page_offset.and_then(point_id_to_page_offset),
        })
    }

    async fn count(&self) -> Result<u64> {
        let response = self
            .client
            .count(CountPointsBuilder::new(&self.collection).exact(true))
            .await?;
        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }

    async fn collection_exists(&self) -> Result<bool> {
        let exists = self.client.collection_exists(&self.collection).await?;
        Ok(exists)
    }
}

fn to_qdrant_filter(filter: &MessageFilter) -> Option<Filter> {
    if filter.is_empty() {
        return None;
    }

    let must_conditions: Vec<Condition> = filter
        .conditions
        .iter()
        .map(|condition| match condition {
            FieldCondition::Match { key, value } => Condition::matches(key.as_str(), value.clone()),
            FieldCondition::Range { key, gte, lte } => Condition::range(
                key.as_str(),
                Range {
                    gte: *gte,
                    lte: *lte,
                    ..Default::default()
                },
            ),
        })
        .collect();

    Some(Filter::must(must_conditions))
}

fn payload_from_qdrant(payload: HashMap<String, QdrantValue>) -> MessagePayload {
    payload
        .into_iter()
        .map(|(k, v)| (k, json_from_qdrant_value(v)))
        .collect::<Map<String, Value>>()
        .into()
}

/// Convert PointId to string
fn point_id_to_string(id: Option<PointId>) -> String {
    match id {
        Some(PointId {
            point_id_options: Some(PointIdOptions::Uuid(uuid)),
        }) => uuid,
        Some(PointId {
            point_id_options: Some(PointIdOptions::Num(num)),
        }) => num.to_string(),
        _ => String::new(),
    }
}

fn point_id_to_page_offset(id: PointId) -> Option<PageOffset> {
    match id.point_id_options? {
        PointIdOptions::Num(num) => Some(PageOffset::Num(num)),
        PointIdOptions::Uuid(uuid) => Some(PageOffset::Uuid(uuid)),
    }
}

fn page_offset_to_point_id(offset: PageOffset) -> PointId {
    match offset {
        PageOffset::Num(num) => PointId::from(num),
        PageOffset::Uuid(uuid) => PointId::from(uuid),
    }
}
