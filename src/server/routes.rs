use super::{AppState, Services};
use crate::deadline::bounded;
use crate::error::Error;
use crate::meta::ChannelSummary;
use crate::search::{parse_date, QueryFilter, RankedResult, SearchRequest};
use crate::stats::IndexStats;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default page size for the channel listing
pub const DEFAULT_CHANNEL_LIMIT: i64 = 100;

/// Largest channel listing a request may ask for
pub const MAX_CHANNEL_LIMIT: i64 = 1000;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/query", post(query))
        .route("/stats", get(stats))
        .route("/channels", get(channels))
        .with_state(state)
}

fn default_true() -> bool {
    true
}

/// `POST /query` body
#[derive(Debug, Deserialize)]
pub struct QueryBody {
    pub query: String,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default = "default_true")]
    pub include_thread_context: bool,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub ok: bool,
    pub results: Vec<RankedResult>,
    pub count: usize,
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub stats: IndexStats,
}

/// `GET /channels` query string
#[derive(Debug, Deserialize)]
pub struct ChannelsParams {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub name_contains: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChannelsResponse {
    pub ok: bool,
    pub channels: Vec<ChannelSummary>,
    pub count: usize,
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<AppState>) -> (StatusCode, &'static str) {
    let Some(services) = state.services() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "not ready");
    };

    let check = bounded(
        state.query.call_timeout(),
        "collection check",
        services.store.collection_exists(),
    )
    .await;

    match check {
        Ok(true) => (StatusCode::OK, "ready"),
        Ok(false) => (StatusCode::SERVICE_UNAVAILABLE, "collection not found"),
        Err(e) => {
            warn!("Readiness probe could not reach the vector store: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "qdrant unavailable")
        }
    }
}

async fn query(
    State(state): State<AppState>,
    payload: Result<Json<QueryBody>, JsonRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let services = ready(&state)?;
    let Json(body) = payload.map_err(|e| ApiError::from(Error::InvalidRequest(e.body_text())))?;
    let request = validate_query(&state, body)?;

    let results = services.searcher.search(&request).await?;
    Ok(Json(QueryResponse {
        ok: true,
        count: results.len(),
        results,
        query: request.query,
    }))
}

async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let services = ready(&state)?;
    let stats = services
        .stats
        .collect(state.readiness.artifact_version())
        .await?;
    Ok(Json(StatsResponse { ok: true, stats }))
}

async fn channels(
    State(state): State<AppState>,
    params: Result<Query<ChannelsParams>, QueryRejection>,
) -> Result<Json<ChannelsResponse>, ApiError> {
    let services = ready(&state)?;
    let Query(params) =
        params.map_err(|e| ApiError::from(Error::InvalidRequest(e.body_text())))?;

    let limit = params.limit.unwrap_or(DEFAULT_CHANNEL_LIMIT);
    if !(1..=MAX_CHANNEL_LIMIT).contains(&limit) {
        return Err(Error::InvalidRequest(format!(
            "limit must be between 1 and {}",
            MAX_CHANNEL_LIMIT
        ))
        .into());
    }

    let channels = services
        .meta
        .list_channels(limit as usize, params.name_contains.as_deref())
        .await?;
    Ok(Json(ChannelsResponse {
        ok: true,
        count: channels.len(),
        channels,
    }))
}

fn ready(state: &AppState) -> Result<&Services, ApiError> {
    state.services().ok_or_else(|| Error::NotReady.into())
}

/// Apply the request schema: query length, limit range and date format
fn validate_query(state: &AppState, body: QueryBody) -> Result<SearchRequest, Error> {
    let max_chars = state.query.max_query_chars;
    let chars = body.query.chars().count();
    if chars == 0 || chars > max_chars {
        return Err(Error::InvalidRequest(format!(
            "query must be between 1 and {} characters",
            max_chars
        )));
    }

    let max_results = state.query.max_results;
    let limit = body.limit.unwrap_or(state.query.default_limit as i64);
    if limit < 1 || limit > max_results as i64 {
        return Err(Error::InvalidRequest(format!(
            "limit must be between 1 and {}",
            max_results
        )));
    }

    let start_date = body
        .start_date
        .as_deref()
        .map(|d| parse_date("start_date", d))
        .transpose()?;
    let end_date = body
        .end_date
        .as_deref()
        .map(|d| parse_date("end_date", d))
        .transpose()?;

    Ok(SearchRequest {
        query: body.query,
        limit: limit as usize,
        filter: QueryFilter {
            channel: body.channel,
            user: body.user,
            start_date,
            end_date,
        },
        include_thread_context: body.include_thread_context,
    })
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    ok: bool,
    error: ErrorDetail,
}

/// Structured failure response
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            Error::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::EmbeddingUnavailable(_) | Error::VectorStoreUnavailable(_) => {
                StatusCode::BAD_GATEWAY
            }
            Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            warn!("Request failed: {}", err);
        }
        Self {
            status,
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            ok: false,
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryConfig;
    use crate::error::Result;
    use crate::meta::tests::seed_db;
    use crate::meta::MetaDb;
    use crate::search::tests::{DownEmbedder, FixedEmbedder};
    use crate::search::HybridSearcher;
    use crate::stats::StatsAggregator;
    use crate::store::{
        InMemoryStore, MessageFilter, PageOffset, ScoredMessage, ScrollPage, VectorStore,
    };
    use crate::embed::Embedder;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    /// Reports the collection as absent, or the store as down
    struct ProbeStore {
        reachable: bool,
    }

    #[async_trait]
    impl VectorStore for ProbeStore {
        fn collection(&self) -> &str {
            "slack_messages"
        }

        async fn search(
            &self,
            _vector: Vec<f32>,
            _filter: &MessageFilter,
            _limit: usize,
        ) -> Result<Vec<ScoredMessage>> {
            Ok(Vec::new())
        }

        async fn scroll(
            &self,
            _filter: &MessageFilter,
            _page_size: usize,
            _offset: Option<PageOffset>,
        ) -> Result<ScrollPage> {
            Ok(ScrollPage::default())
        }

        async fn count(&self) -> Result<u64> {
            Ok(0)
        }

        async fn collection_exists(&self) -> Result<bool> {
            if self.reachable {
                Ok(false)
            } else {
                Err(Error::VectorStoreUnavailable("connection refused".to_string()))
            }
        }
    }

    fn message_store() -> InMemoryStore {
        let store = InMemoryStore::new("slack_messages");
        for i in 0..4 {
            store
                .insert(
                    vec![1.0, 0.0],
                    json!({
                        "channel": "deploys",
                        "channel_lower": "deploys",
                        "date": "2024-05-01",
                        "ts_float": 1_714_521_600.0 + i as f64,
                        "text": format!("deploy failed {i}"),
                        "source_file": "deploys/2024-05-01.json",
                        "message_index": i,
                    }),
                )
                .unwrap();
        }
        store
    }

    async fn ready_state(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
    ) -> (TempDir, AppState) {
        let (tmp, path) = seed_db(&[
            ("deploys/2024-05-01.json", "deploys", 4, "2024-05-02T00:00:00"),
            ("general/2024-05-01.json", "general", 9, "2024-05-02T01:00:00"),
        ])
        .await;
        let meta = MetaDb::open(&path).await.unwrap();
        let timeout = Duration::from_secs(5);

        let services = Services {
            searcher: HybridSearcher::new(embedder, Arc::clone(&store), timeout),
            stats: StatsAggregator::new(
                meta.clone(),
                Arc::clone(&store),
                tmp.path().to_path_buf(),
                "qwen3-embedding",
                timeout,
            ),
            meta,
            store,
        };

        let state = AppState::new(QueryConfig::default());
        state.readiness.mark_ready("7");
        assert!(state.install(services));
        (tmp, state)
    }

    async fn default_ready_state() -> (TempDir, AppState) {
        ready_state(
            Arc::new(message_store()),
            Arc::new(FixedEmbedder {
                vector: vec![1.0, 0.0],
            }),
        )
        .await
    }

    async fn call(state: AppState, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_query(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/query")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn json_body(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn test_healthz_answers_before_ready() {
        let state = AppState::new(QueryConfig::default());
        let (status, body) = call(state, get_req("/healthz")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ok");
    }

    #[tokio::test]
    async fn test_not_ready_endpoints() {
        let state = AppState::new(QueryConfig::default());

        let (status, body) = call(state.clone(), get_req("/readyz")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, b"not ready");

        let (status, body) = call(state.clone(), post_query(json!({"query": "deploy"}))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(&body);
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"]["code"], "not_ready");

        let (status, body) = call(state, get_req("/stats")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(&body)["ok"], false);
    }

    #[tokio::test]
    async fn test_readyz_when_ready() {
        let (_tmp, state) = default_ready_state().await;
        let (status, body) = call(state, get_req("/readyz")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ready");
    }

    #[tokio::test]
    async fn test_readyz_reports_collection_problems() {
        let embedder = Arc::new(FixedEmbedder {
            vector: vec![1.0, 0.0],
        });

        let (_tmp, state) =
            ready_state(Arc::new(ProbeStore { reachable: true }), embedder.clone()).await;
        let (status, body) = call(state, get_req("/readyz")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, b"collection not found");

        let (_tmp, state) = ready_state(Arc::new(ProbeStore { reachable: false }), embedder).await;
        let (status, body) = call(state, get_req("/readyz")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, b"qdrant unavailable");
    }

    #[tokio::test]
    async fn test_query_returns_enriched_results() {
        let (_tmp, state) = default_ready_state().await;
        let (status, body) = call(
            state,
            post_query(json!({"query": "deploy failed", "limit": 2, "channel": "Deploys"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let body = json_body(&body);
        assert_eq!(body["ok"], true);
        assert_eq!(body["count"], 2);
        assert_eq!(body["query"], "deploy failed");
        let first = &body["results"][0];
        assert!(first["score"].as_f64().unwrap() >= body["results"][1]["score"].as_f64().unwrap());
        assert!(!first["context"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_validation_errors() {
        let (_tmp, state) = default_ready_state().await;

        let bad_bodies = [
            json!({"query": ""}),
            json!({"query": "x".repeat(2001)}),
            json!({"query": "deploy", "limit": 0}),
            json!({"query": "deploy", "limit": 26}),
            json!({"query": "deploy", "start_date": "2024/01/01"}),
            json!({"limit": 3}),
        ];
        for bad in bad_bodies {
            let (status, body) = call(state.clone(), post_query(bad.clone())).await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "body {bad}");
            assert_eq!(json_body(&body)["error"]["code"], "invalid_request");
        }
    }

    #[tokio::test]
    async fn test_whitespace_query_is_accepted() {
        let (_tmp, state) = default_ready_state().await;
        let (status, body) = call(state, post_query(json!({"query": "   ", "limit": 1}))).await;

        assert_eq!(status, StatusCode::OK);
        let body = json_body(&body);
        assert_eq!(body["ok"], true);
        assert_eq!(body["query"], "   ");
        assert_eq!(body["count"], 1);
    }

    #[tokio::test]
    async fn test_query_embedding_outage_is_bad_gateway() {
        let (_tmp, state) = ready_state(Arc::new(message_store()), Arc::new(DownEmbedder)).await;
        let (status, body) = call(state, post_query(json!({"query": "deploy"}))).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let body = json_body(&body);
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"]["code"], "embedding_unavailable");
    }

    #[tokio::test]
    async fn test_stats_reports_index_totals() {
        let (_tmp, state) = default_ready_state().await;
        let (status, body) = call(state, get_req("/stats")).await;

        assert_eq!(status, StatusCode::OK);
        let body = json_body(&body);
        assert_eq!(body["ok"], true);
        assert_eq!(body["collection"], "slack_messages");
        assert_eq!(body["indexed_files"], 2);
        assert_eq!(body["indexed_messages"], 13);
        assert_eq!(body["qdrant_points"], 4);
        assert_eq!(body["artifact_version"], "7");
    }

    #[tokio::test]
    async fn test_channels_listing() {
        let (_tmp, state) = default_ready_state().await;

        let (status, body) = call(state.clone(), get_req("/channels?name_contains=DEP")).await;
        assert_eq!(status, StatusCode::OK);
        let body = json_body(&body);
        assert_eq!(body["count"], 1);
        assert_eq!(body["channels"][0]["channel"], "deploys");

        let (status, _) = call(state, get_req("/channels?limit=0")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
