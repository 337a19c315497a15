use super::{truncate_chars, Embedder};
use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Embedder backed by an Ollama server's `/api/embeddings` endpoint
pub struct OllamaEmbedder {
    client: Client,
    base_url: Url,
    model_id: String,
    dimension: usize,
    max_chars: usize,
    retries: usize,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig, timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(&config.host)
            .map_err(|e| Error::Config(format!("Invalid embedding host URL: {}", e)))?;
        // Relative joins keep a proxy prefix only when the base ends in '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            model_id: config.model.clone(),
            dimension: config.dimension,
            max_chars: config.max_chars,
            retries: config.retries,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("Invalid embedding host URL: {}", e)))
    }

    fn validate_dimension(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimension {
            return Err(Error::EmbeddingUnavailable(format!(
                "Embedding dimension mismatch for model '{}': expected {}, got {}",
                self.model_id,
                self.dimension,
                embedding.len()
            )));
        }
        Ok(())
    }

    async fn send_with_retry(&self, request: reqwest::RequestBuilder) -> Result<EmbeddingResponse> {
        let mut last_err: Option<Error> = None;
        for attempt in 0..=self.retries {
            let req = request.try_clone().ok_or_else(|| {
                Error::EmbeddingUnavailable("Failed to clone embedding request".to_string())
            })?;
            match req.send().await {
                Ok(response) => match response.error_for_status() {
                    Ok(ok) => {
                        return ok
                            .json::<EmbeddingResponse>()
                            .await
                            .map_err(|e| Error::EmbeddingUnavailable(e.to_string()))
                    }
                    // The server answered; a retry will not change its mind
                    Err(e) => return Err(Error::EmbeddingUnavailable(e.to_string())),
                },
                Err(e) => last_err = Some(Error::EmbeddingUnavailable(e.to_string())),
            }

            if attempt < self.retries {
                tokio::time::sleep(Duration::from_millis(200 * (attempt + 1) as u64)).await;
            }
        }

        Err(last_err.unwrap_or_else(|| {
            Error::EmbeddingUnavailable("Embedding request failed".to_string())
        }))
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let prompt = truncate_chars(text, self.max_chars);
        debug!(
            "Embedding {} chars with model {}",
            prompt.chars().count(),
            self.model_id
        );

        let url = self.endpoint("api/embeddings")?;
        let request = EmbeddingRequest {
            model: &self.model_id,
            prompt,
        };
        let parsed = self
            .send_with_retry(self.client.post(url).json(&request))
            .await?;

        self.validate_dimension(&parsed.embedding)?;
        Ok(parsed.embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}
