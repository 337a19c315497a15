//! Query command implementation

use crate::error::{Error, Result};
use crate::search::{parse_date, HybridSearcher, QueryFilter, RankedResult, SearchRequest};
use serde::Serialize;
use tracing::info;

/// Query options
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Number of results to return
    pub limit: usize,
    /// Filter by channel name
    pub channel: Option<String>,
    /// Filter by user name
    pub user: Option<String>,
    /// Earliest message date, `YYYY-MM-DD`
    pub start_date: Option<String>,
    /// Latest message date, `YYYY-MM-DD`
    pub end_date: Option<String>,
    /// Attach thread previews
    pub include_thread_context: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            channel: None,
            user: None,
            start_date: None,
            end_date: None,
            include_thread_context: true,
        }
    }
}

/// Query result for CLI display
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub query: String,
    pub count: usize,
    pub results: Vec<RankedResult>,
}

/// Execute a query
pub async fn cmd_query(
    searcher: &HybridSearcher,
    query: &str,
    options: QueryOptions,
) -> Result<QueryResult> {
    if query.is_empty() {
        return Err(Error::InvalidRequest("query must not be empty".to_string()));
    }

    let request = SearchRequest {
        query: query.to_string(),
        limit: options.limit,
        filter: QueryFilter {
            channel: options.channel,
            user: options.user,
            start_date: options
                .start_date
                .as_deref()
                .map(|d| parse_date("start_date", d))
                .transpose()?,
            end_date: options
                .end_date
                .as_deref()
                .map(|d| parse_date("end_date", d))
                .transpose()?,
        },
        include_thread_context: options.include_thread_context,
    };

    let results = searcher.search(&request).await?;
    info!("Returning {} results", results.len());

    Ok(QueryResult {
        query: request.query,
        count: results.len(),
        results,
    })
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.trim().replace('\n', " ");
    match flat.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}

/// Print query results to console
pub fn print_query_results(result: &QueryResult) {
    println!("\n🔍 Query: {}\n", result.query);
    println!("Found {} results:\n", result.count);

    for (i, r) in result.results.iter().enumerate() {
        println!(
            "{}. [score: {:.3}, vector: {:.3}] #{} {} {}",
            i + 1,
            r.score,
            r.vector_score,
            r.channel.as_deref().unwrap_or("?"),
            r.date.as_deref().unwrap_or(""),
            r.user_name.as_deref().unwrap_or("unknown"),
        );
        println!("   {}", preview(r.text.as_deref().unwrap_or(""), 200));

        if let Some(permalink) = &r.permalink {
            println!("   {}", permalink);
        }

        if !r.context.is_empty() {
            println!("   Context:");
            for m in &r.context {
                println!(
                    "     {}: {}",
                    m.user_name.as_deref().unwrap_or("unknown"),
                    preview(m.text.as_deref().unwrap_or(""), 120)
                );
            }
        }

        if !r.thread_preview.is_empty() {
            println!("   Thread ({} messages)", r.thread_preview.len());
        }
        println!();
    }
}
