//! Custom error types for rag-query

use crate::provision::Stage;
use thiserror::Error;

/// Main error type for rag-query operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provisioning failed at stage {stage}: {source}")]
    Provisioning {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Object storage error: {0}")]
    ObjectStore(String),

    #[error("Decryption failed: {0}")]
    Decrypt(String),

    #[error("Extraction failed: {0}")]
    Extract(String),

    #[error("Embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Vector store unavailable: {0}")]
    VectorStoreUnavailable(String),

    #[error("Timed out after {secs}s waiting for {operation}")]
    Timeout { operation: String, secs: u64 },

    #[error("Service not ready")]
    NotReady,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap an error as the abort cause of a provisioning stage
    pub fn at_stage(self, stage: Stage) -> Self {
        match self {
            already @ Error::Provisioning { .. } => already,
            other => Error::Provisioning {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Stable machine-readable code used in HTTP error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotReady => "not_ready",
            Error::InvalidRequest(_) => "invalid_request",
            Error::EmbeddingUnavailable(_) => "embedding_unavailable",
            Error::VectorStoreUnavailable(_) => "vector_store_unavailable",
            Error::Timeout { .. } => "timeout",
            Error::Config(_) => "config",
            Error::Provisioning { .. } | Error::ChecksumMismatch { .. } => "provisioning",
            _ => "internal",
        }
    }
}

/// Result type alias for rag-query
pub type Result<T> = std::result::Result<T, Error>;

/// Convert qdrant errors
impl From<qdrant_client::QdrantError> for Error {
    fn from(err: qdrant_client::QdrantError) -> Self {
        Error::VectorStoreUnavailable(err.to_string())
    }
}
