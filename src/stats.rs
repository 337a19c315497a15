//! Index statistics
//!
//! Ingestion totals come from the relational metadata; the point count is a
//! diagnostic read from the vector store and degrades to zero when the store
//! is unreachable.

use crate::deadline::bounded;
use crate::error::Result;
use crate::meta::MetaDb;
use crate::store::VectorStore;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Aggregate view of the loaded index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub db_root: String,
    pub collection: String,
    pub embedding_model: String,
    pub indexed_files: u64,
    pub indexed_messages: u64,
    pub indexed_channels: u64,
    pub last_indexed: Option<String>,
    pub qdrant_points: u64,
    pub artifact_version: Option<String>,
}

/// Builds [`IndexStats`] from the metadata database and the vector store
pub struct StatsAggregator {
    meta: MetaDb,
    store: Arc<dyn VectorStore>,
    db_root: PathBuf,
    embedding_model: String,
    call_timeout: Duration,
}

impl StatsAggregator {
    pub fn new(
        meta: MetaDb,
        store: Arc<dyn VectorStore>,
        db_root: PathBuf,
        embedding_model: impl Into<String>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            meta,
            store,
            db_root,
            embedding_model: embedding_model.into(),
            call_timeout,
        }
    }

    pub async fn collect(&self, artifact_version: Option<&str>) -> Result<IndexStats> {
        let files = self.meta.get_file_stats().await?;

        let qdrant_points = match bounded(self.call_timeout, "point count", self.store.count()).await
        {
            Ok(n) => n,
            Err(e) => {
                warn!("Vector store count failed, reporting 0 points: {}", e);
                0
            }
        };

        Ok(IndexStats {
            db_root: self.db_root.display().to_string(),
            collection: self.store.collection().to_string(),
            embedding_model: self.embedding_model.clone(),
            indexed_files: files.indexed_files,
            indexed_messages: files.indexed_messages,
            indexed_channels: files.indexed_channels,
            last_indexed: files.last_indexed,
            qdrant_points,
            artifact_version: artifact_version.map(str::to_string),
        })
    }
}
