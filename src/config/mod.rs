//! Configuration management for rag-query
//!
//! Every field has an environment-backed default; an optional TOML file can
//! override any of them.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// A credential that must never reach logs or serialized output
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("Secret(<empty>)")
        } else {
            f.write_str("Secret(<redacted>)")
        }
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(Secret)
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub qdrant: QdrantConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub artifact: ArtifactConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub query: QueryConfig,
}

/// Local index location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Directory the artifact is extracted into
    #[serde(default = "default_index_dir")]
    pub dir: PathBuf,
}

impl IndexConfig {
    /// Vector index directory inside the extracted artifact
    pub fn qdrant_path(&self) -> PathBuf {
        self.dir.join("qdrant")
    }

    /// Relational metadata file inside the extracted artifact
    pub fn state_db_path(&self) -> PathBuf {
        self.dir.join("state.db")
    }
}

/// Vector store connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantConfig {
    #[serde(default = "default_qdrant_url")]
    pub url: String,

    #[serde(default = "default_collection_name")]
    pub collection: String,
}

/// Embedding service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Base URL of the Ollama server
    #[serde(default = "default_embedding_host")]
    pub host: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (must match the indexed collection)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Query text beyond this many characters is dropped before embedding
    #[serde(default = "default_max_embed_chars")]
    pub max_chars: usize,

    #[serde(default = "default_embedding_retries")]
    pub retries: usize,
}

/// Object storage holding published artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_storage_bucket")]
    pub bucket: String,

    #[serde(default = "default_storage_region")]
    pub region: String,

    #[serde(default = "default_storage_access_key")]
    pub access_key: String,

    #[serde(default = "default_storage_secret_secret", skip_serializing)]
    pub secret_key: Secret,
}

/// Artifact selection and decryption
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Version to load, or "latest"
    #[serde(default = "default_artifact_version")]
    pub version: String,

    #[serde(default = "default_artifact_passphrase_secret", skip_serializing)]
    pub passphrase: Secret,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Query path configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_query_limit")]
    pub default_limit: usize,

    /// Largest `limit` accepted from HTTP clients
    #[serde(default = "default_query_max_results")]
    pub max_results: usize,

    #[serde(default = "default_query_max_chars")]
    pub max_query_chars: usize,

    /// Timeout for each embedding, search, and scan page call
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

impl QueryConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

fn default_storage_secret_secret() -> Secret {
    Secret::new(default_storage_secret_key())
}

fn default_artifact_passphrase_secret() -> Secret {
    Secret::new(default_artifact_passphrase())
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: default_index_dir(),
        }
    }
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
            collection: default_collection_name(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            host: default_embedding_host(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            max_chars: default_max_embed_chars(),
            retries: default_embedding_retries(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: default_storage_endpoint(),
            bucket: default_storage_bucket(),
            region: default_storage_region(),
            access_key: default_storage_access_key(),
            secret_key: default_storage_secret_secret(),
        }
    }
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            version: default_artifact_version(),
            passphrase: default_artifact_passphrase_secret(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            log_level: default_log_level(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: default_query_limit(),
            max_results: default_query_max_results(),
            max_query_chars: default_query_max_chars(),
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

impl Config {
    /// Build configuration from the environment alone
    pub fn from_env() -> Result<Self> {
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file; missing keys fall back to environment defaults
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", path);
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load from `path` when given, else from the environment
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Self::from_env(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.qdrant.collection.trim().is_empty() {
            return Err(Error::Config(
                "qdrant.collection must not be empty".to_string(),
            ));
        }

        if self.embedding.dimension == 0 {
            return Err(Error::Config(
                "embedding.dimension must be greater than 0".to_string(),
            ));
        }

        if self.embedding.max_chars == 0 {
            return Err(Error::Config(
                "embedding.max_chars must be greater than 0".to_string(),
            ));
        }

        if self.query.call_timeout_secs == 0 {
            return Err(Error::Config(
                "query.call_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.query.max_results == 0 || self.query.default_limit == 0 {
            return Err(Error::Config(
                "query.default_limit and query.max_results must be greater than 0".to_string(),
            ));
        }

        if self.query.default_limit > self.query.max_results {
            return Err(Error::Config(format!(
                "query.default_limit ({}) must not exceed query.max_results ({})",
                self.query.default_limit, self.query.max_results
            )));
        }

        Ok(())
    }
}
