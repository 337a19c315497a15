//! Paged scan over filtered points
//!
//! Pulls every page matching a filter into memory. This is only meant for
//! inherently small result sets (one source file, one thread); callers that
//! could match more must pass a cap.

use super::{MessageFilter, MessagePayload, VectorStore};
use crate::deadline::bounded;
use crate::error::Result;
use std::time::Duration;
use tracing::debug;

/// Paging parameters for [`scan_all`]
#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    /// Points requested per page
    pub page_size: usize,
    /// Stop once this many points are accumulated
    pub cap: Option<usize>,
    /// Timeout for each page request
    pub page_timeout: Duration,
}

/// Fetch all points matching `filter`, page by page, until the store runs
/// dry or `cap` is reached. Zero matches yield an empty vector.
pub async fn scan_all(
    store: &dyn VectorStore,
    filter: &MessageFilter,
    options: ScanOptions,
) -> Result<Vec<MessagePayload>> {
    let mut points: Vec<MessagePayload> = Vec::new();
    let mut offset = None;
    let page_size = options.page_size.max(1);

    loop {
        let request = match options.cap {
            Some(cap) if points.len() >= cap => break,
            Some(cap) => page_size.min(cap - points.len()),
            None => page_size,
        };

        let page = bounded(
            options.page_timeout,
            "vector store scroll",
            store.scroll(filter, request, offset.take()),
        )
        .await?;

        if page.points.is_empty() {
            break;
        }
        points.extend(page.points);

        match page.next_offset {
            Some(next) => offset = Some(next),
            None => break,
        }
    }

    if let Some(cap) = options.cap {
        points.truncate(cap);
    }

    debug!("Paged scan collected {} points", points.len());
    Ok(points)
}
