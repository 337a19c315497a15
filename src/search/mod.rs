//! Hybrid query engine
//!
//! Ranks candidates from a vector over-fetch by vector similarity plus
//! lexical overlap and recency, then enriches the survivors with their
//! neighbouring messages and a thread preview rebuilt from paged scans.

mod filter;
mod score;

pub use filter::*;
pub use score::*;

use crate::deadline::bounded;
use crate::embed::Embedder;
use crate::error::Result;
use crate::store::{scan_all, MessageFilter, MessagePayload, ScanOptions, VectorStore};
use chrono::{NaiveDate, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Minimum number of vector candidates fetched for rescoring
pub const MIN_CANDIDATES: usize = 40;

/// Candidates fetched per requested result
pub const OVERFETCH_FACTOR: usize = 8;

/// Upper bound on results per search
pub const MAX_LIMIT: usize = 100;

/// Messages shown before the hit in its context window
pub const CONTEXT_BEFORE: usize = 1;

/// Messages shown after the hit in its context window
pub const CONTEXT_AFTER: usize = 2;

/// Maximum messages in a thread preview
pub const THREAD_PREVIEW_CAP: usize = 12;

const SOURCE_PAGE_SIZE: usize = 500;
const THREAD_PAGE_SIZE: usize = 300;

/// A search over the message index
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    /// Clamped into `1..=MAX_LIMIT`
    pub limit: usize,
    pub filter: QueryFilter,
    pub include_thread_context: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, limit: usize) -> Self {
        Self {
            query: query.into(),
            limit,
            filter: QueryFilter::default(),
            include_thread_context: true,
        }
    }
}

/// Lightweight snapshot of a neighbouring message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub channel: Option<String>,
    pub date: Option<String>,
    pub ts: Option<String>,
    pub user_name: Option<String>,
    pub text: Option<String>,
}

impl From<MessagePayload> for ContextMessage {
    fn from(p: MessagePayload) -> Self {
        Self {
            channel: p.channel,
            date: p.date,
            ts: p.ts,
            user_name: p.user_name,
            text: p.text,
        }
    }
}

/// A rescored hit with its enrichment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    /// Combined ranking score
    pub score: f64,
    /// Raw similarity from the vector store
    pub vector_score: f64,
    pub channel: Option<String>,
    pub date: Option<String>,
    pub ts: Option<String>,
    pub thread_ts: Option<String>,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub text: Option<String>,
    pub source_file: Option<String>,
    pub message_index: Option<i64>,
    pub permalink: Option<String>,
    #[serde(default)]
    pub context: Vec<ContextMessage>,
    #[serde(default)]
    pub thread_preview: Vec<MessagePayload>,
}

impl RankedResult {
    fn new(score: f64, vector_score: f64, p: MessagePayload) -> Self {
        Self {
            score,
            vector_score,
            channel: p.channel,
            date: p.date,
            ts: p.ts,
            thread_ts: p.thread_ts,
            user_id: p.user_id,
            user_name: p.user_name,
            text: p.text,
            source_file: p.source_file,
            message_index: p.message_index,
            permalink: p.permalink,
            context: Vec::new(),
            thread_preview: Vec::new(),
        }
    }
}

/// Number of vector candidates requested for a result limit
pub fn candidate_count(limit: usize) -> usize {
    MIN_CANDIDATES.max(limit.saturating_mul(OVERFETCH_FACTOR))
}

/// Query engine over an embedder and a vector store
pub struct HybridSearcher {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    call_timeout: Duration,
    today: Option<NaiveDate>,
}

impl HybridSearcher {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            store,
            call_timeout,
            today: None,
        }
    }

    /// Pin the date recency is measured from
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }

    /// Run a search and return enriched results, best first
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<RankedResult>> {
        let limit = request.limit.clamp(1, MAX_LIMIT);
        let filter = request.filter.to_message_filter();

        info!("Searching: {}", request.query);

        let vector = bounded(
            self.call_timeout,
            "query embedding",
            self.embedder.embed(&request.query),
        )
        .await?;

        let fetch = candidate_count(limit);
        let candidates = bounded(
            self.call_timeout,
            "vector search",
            self.store.search(vector, &filter, fetch),
        )
        .await?;
        debug!("Got {} candidates (requested {})", candidates.len(), fetch);

        let query_terms = tokenize(&request.query);
        let today = self.today();
        let mut ranked: Vec<RankedResult> = candidates
            .into_iter()
            .map(|hit| {
                let vector_score = f64::from(hit.score);
                let lexical = lexical_overlap(&query_terms, hit.payload.text_or_empty());
                let recency = recency_boost(hit.payload.date_or_empty(), today);
                let score = combined_score(vector_score, lexical, recency);
                RankedResult::new(score, vector_score, hit.payload)
            })
            .collect();

        // sort_by is stable, so equal scores keep vector-search order
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(limit);

        let enriched = try_join_all(
            ranked
                .into_iter()
                .map(|result| self.enrich(result, request.include_thread_context)),
        )
        .await?;

        info!("Returning {} results", enriched.len());
        Ok(enriched)
    }

    async fn enrich(
        &self,
        mut result: RankedResult,
        include_thread_context: bool,
    ) -> Result<RankedResult> {
        let context = async {
            match (result.source_file.as_deref(), result.message_index) {
                (Some(source_file), Some(index)) => self.context_window(source_file, index).await,
                _ => {
                    warn!("Result missing source_file or message_index, skipping context window");
                    Ok(Vec::new())
                }
            }
        };

        let thread = async {
            if !include_thread_context {
                return Ok(Vec::new());
            }
            match (result.channel.as_deref(), result.thread_ts.as_deref()) {
                (Some(channel), Some(thread_ts)) => self.thread_preview(channel, thread_ts).await,
                _ => Ok(Vec::new()),
            }
        };

        let (context, thread_preview) = tokio::try_join!(context, thread)?;
        result.context = context;
        result.thread_preview = thread_preview;
        Ok(result)
    }

    /// Messages around `message_index` in `source_file`: one before and two
    /// after the target, target included, clipped to the file's bounds.
    /// Empty when the target is absent from the scan.
    pub async fn context_window(
        &self,
        source_file: &str,
        message_index: i64,
    ) -> Result<Vec<ContextMessage>> {
        let filter = MessageFilter::new().with_match("source_file", source_file);
        let mut messages = scan_all(
            self.store.as_ref(),
            &filter,
            ScanOptions {
                page_size: SOURCE_PAGE_SIZE,
                cap: None,
                page_timeout: self.call_timeout,
            },
        )
        .await?;

        if messages.is_empty() {
            return Ok(Vec::new());
        }

        messages.sort_by_key(|m| m.message_index.unwrap_or(0));

        let Some(pos) = messages
            .iter()
            .position(|m| m.message_index == Some(message_index))
        else {
            warn!(
                "Message {} not found in its source file {}, context window left empty",
                message_index, source_file
            );
            return Ok(Vec::new());
        };

        let start = pos.saturating_sub(CONTEXT_BEFORE);
        let end = (pos + CONTEXT_AFTER + 1).min(messages.len());

        Ok(messages
            .drain(start..end)
            .map(ContextMessage::from)
            .collect())
    }

    /// Up to [`THREAD_PREVIEW_CAP`] messages of a thread, oldest first.
    /// The cap applies in scan order before sorting.
    pub async fn thread_preview(
        &self,
        channel: &str,
        thread_ts: &str,
    ) -> Result<Vec<MessagePayload>> {
        let filter = MessageFilter::new()
            .with_match("channel_lower", channel.to_lowercase())
            .with_match("thread_ts", thread_ts);

        let mut messages = scan_all(
            self.store.as_ref(),
            &filter,
            ScanOptions {
                page_size: THREAD_PAGE_SIZE,
                cap: Some(THREAD_PREVIEW_CAP),
                page_timeout: self.call_timeout,
            },
        )
        .await?;

        messages.sort_by(|a, b| {
            a.ts_float
                .unwrap_or(0.0)
                .total_cmp(&b.ts_float.unwrap_or(0.0))
        });
        Ok(messages)
    }
}
