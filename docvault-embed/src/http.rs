//! Remote embeddings over an OpenAI-compatible HTTP API.
//!
//! Supports both the plain OpenAI route and Azure OpenAI deployments (see
//! [`HttpFlavor`]). Texts are sent in batches of `batch_size`; a batch that
//! fails to send, returns a non-success status, or returns the wrong number
//! of vectors fails the whole call, so callers never see a partial result.

use crate::config::{HttpConfig, HttpFlavor};
use crate::error::{EmbedError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

/// Embedding provider backed by a remote embeddings endpoint
#[derive(Debug, Clone)]
pub struct HttpEmbedProvider {
    client: Client,
    config: HttpConfig,
    url: String,
    api_key: Option<String>,
}

impl HttpEmbedProvider {
    /// Build a provider; the API key is resolved once, here.
    pub fn new(config: HttpConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbedError::invalid_config(format!("failed to build HTTP client: {e}")))?;
        let api_key = config.resolve_api_key();
        if api_key.is_none() {
            tracing::warn!(
                "No API key configured for {}; requests will be sent unauthenticated",
                config.endpoint
            );
        }
        let url = config.embeddings_url();
        Ok(Self {
            client,
            config,
            url,
            api_key,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = match self.config.flavor {
            HttpFlavor::OpenAi => Some(self.config.model.as_str()),
            // Azure selects the model via the deployment in the URL
            HttpFlavor::Azure => None,
        };
        let request = EmbeddingRequest {
            input: batch,
            model,
        };

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(key) = &self.api_key {
            builder = match self.config.flavor {
                HttpFlavor::Azure => builder.header("api-key", key),
                HttpFlavor::OpenAi => builder.bearer_auth(key),
            };
        }

        let response = builder
            .send()
            .await
            .map_err(|e| EmbedError::unavailable("http", format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedError::unavailable(
                "http",
                format!("endpoint returned {status}: {}", truncate(&body, 200)),
            ));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::unavailable("http", format!("malformed response: {e}")))?;
        Ok(order_by_index(body))
    }
}

fn order_by_index(mut response: EmbeddingResponse) -> Vec<Vec<f32>> {
    response.data.sort_by_key(|item| item.index);
    response
        .data
        .into_iter()
        .map(|item| item.embedding)
        .collect()
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((offset, _)) => &text[..offset],
        None => text,
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedProvider {
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size) {
            tracing::debug!("Requesting {} embeddings from {}", batch.len(), self.url);
            let vectors = self.embed_batch(batch).await?;
            if vectors.len() != batch.len() {
                return Err(EmbedError::CountMismatch {
                    expected: batch.len(),
                    actual: vectors.len(),
                });
            }
            embeddings.extend(vectors);
        }

        let result = EmbeddingResult::new(embeddings);
        result.validate(texts.len(), self.config.dimension)?;
        Ok(result)
    }

    fn embedding_dimension(&self) -> usize {
        self.config.dimension
    }

    fn provider_name(&self) -> &str {
        "http"
    }
}
