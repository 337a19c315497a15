//! Default values for configuration
//!
//! Most defaults read an environment variable first so the service can be
//! configured by environment alone in container deployments.

use std::path::PathBuf;

fn env_or(name: &str, fallback: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| fallback.to_string())
}

fn env_parse_or<T: std::str::FromStr>(name: &str, fallback: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(fallback)
}

/// Sentinel artifact version resolved through the latest manifest
pub const LATEST_VERSION: &str = "latest";

/// Default local index directory
pub fn default_index_dir() -> PathBuf {
    PathBuf::from(env_or("RAG_INDEX_DIR", "/data/rag-index"))
}

/// Default Qdrant gRPC URL (port 6334, not 6333 REST)
pub fn default_qdrant_url() -> String {
    env_or("QDRANT_URL", "http://127.0.0.1:6334")
}

/// Default collection name
pub fn default_collection_name() -> String {
    env_or("RAG_COLLECTION", "slack_messages")
}

/// Default Ollama host serving the embedding model
pub fn default_embedding_host() -> String {
    env_or("OLLAMA_HOST", "http://localhost:11434")
}

/// Default embedding model
pub fn default_embedding_model() -> String {
    env_or("SLACK_LIBRARIAN_EMBED_MODEL", "qwen3-embedding")
}

/// Default embedding dimension (qwen3-embedding)
pub fn default_embedding_dimension() -> usize {
    env_parse_or("SLACK_LIBRARIAN_EMBED_DIM", 4096)
}

/// Maximum characters sent to the embedding model
pub fn default_max_embed_chars() -> usize {
    env_parse_or("SLACK_LIBRARIAN_MAX_EMBED_CHARS", 16000)
}

/// Retries for transport failures against the embedding service
pub fn default_embedding_retries() -> usize {
    1
}

/// Default object storage endpoint
pub fn default_storage_endpoint() -> String {
    env_or("DO_SPACES_ENDPOINT", "https://tor1.digitaloceanspaces.com")
}

/// Default artifact bucket
pub fn default_storage_bucket() -> String {
    env_or("DO_SPACES_BUCKET", "esbmcp-rag-artifacts")
}

/// Default object storage region
pub fn default_storage_region() -> String {
    env_or("DO_SPACES_REGION", "tor1")
}

/// Object storage access key
pub fn default_storage_access_key() -> String {
    env_or("DO_SPACES_ACCESS_KEY", "")
}

/// Object storage secret key
pub fn default_storage_secret_key() -> String {
    env_or("DO_SPACES_SECRET_KEY", "")
}

/// Artifact version selector
pub fn default_artifact_version() -> String {
    env_or("RAG_ARTIFACT_VERSION", LATEST_VERSION)
}

/// Artifact decryption passphrase
pub fn default_artifact_passphrase() -> String {
    env_or("RAG_ARTIFACT_ENCRYPTION_KEY", "")
}

/// Default HTTP port
pub fn default_server_port() -> u16 {
    env_parse_or("PORT", 8082)
}

/// Default bind host
pub fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

/// Default log level
pub fn default_log_level() -> String {
    env_or("LOG_LEVEL", "info")
}

/// Timeout applied to each external call on the query path
pub fn default_call_timeout_secs() -> u64 {
    env_parse_or("RAG_QUERY_CALL_TIMEOUT_SECS", 30)
}

/// Default number of results per query
pub fn default_query_limit() -> usize {
    10
}

/// Maximum results a single HTTP request may ask for
pub fn default_query_max_results() -> usize {
    25
}

/// Maximum query length accepted at the HTTP edge
pub fn default_query_max_chars() -> usize {
    2000
}
