//! Relational metadata access
//!
//! Read-only aggregate queries over the `indexed_files` table that ships
//! with the index artifact.

mod schema;

pub use schema::*;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::path::Path;
use tracing::debug;

/// Index-wide ingestion rollup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileStats {
    pub indexed_files: u64,
    pub indexed_messages: u64,
    pub indexed_channels: u64,
    pub last_indexed: Option<String>,
}

/// Per-channel ingestion rollup
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub channel: String,
    pub file_count: i64,
    pub message_count: i64,
    pub last_indexed: Option<String>,
}

/// Metadata database handle
#[derive(Clone)]
pub struct MetaDb {
    pool: SqlitePool,
}

impl MetaDb {
    /// Open the metadata database read-only
    pub async fn open(db_path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .read_only(true)
            .create_if_missing(false);

        debug!("Opening SQLite metadata at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Totals across every indexed file
    pub async fn get_file_stats(&self) -> Result<FileStats> {
        let (files, messages, channels, last_indexed): (i64, i64, i64, Option<String>) =
            sqlx::query_as(
                r#"
                SELECT
                    COUNT(*),
                    COALESCE(SUM(message_count), 0),
                    COUNT(DISTINCT channel),
                    CAST(MAX(indexed_at) AS TEXT)
                FROM indexed_files
                "#,
            )
            .fetch_one(&self.pool)
            .await?;

        Ok(FileStats {
            indexed_files: files.max(0) as u64,
            indexed_messages: messages.max(0) as u64,
            indexed_channels: channels.max(0) as u64,
            last_indexed,
        })
    }

    /// Channels ordered by message volume, optionally filtered by a
    /// case-insensitive substring of the channel name
    pub async fn list_channels(
        &self,
        limit: usize,
        name_contains: Option<&str>,
    ) -> Result<Vec<ChannelSummary>> {
        let pattern = name_contains
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s.to_lowercase()));

        let channels = sqlx::query_as::<_, ChannelSummary>(
            r#"
            SELECT
                channel,
                COUNT(*) AS file_count,
                COALESCE(SUM(message_count), 0) AS message_count,
                CAST(MAX(indexed_at) AS TEXT) AS last_indexed
            FROM indexed_files
            WHERE ?1 IS NULL OR LOWER(channel) LIKE ?1
            GROUP BY channel
            ORDER BY message_count DESC
            LIMIT ?2
            "#,
        )
        .bind(pattern)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(channels)
    }
}
