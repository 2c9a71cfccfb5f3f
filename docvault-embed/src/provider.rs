//! Embedding provider trait and the local fastembed implementation

use crate::config::{EmbedConfig, HashingConfig, ProviderConfig};
use crate::error::{EmbedError, Result};
use crate::hashing::HashingEmbedProvider;
use crate::http::HttpEmbedProvider;
use async_trait::async_trait;
use fastembed::{InitOptions, TextEmbedding};
use fnv::FnvHasher;
use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

/// Result of embedding generation
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text, in input order
    pub embeddings: Vec<Vec<f32>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a new embedding result.
    ///
    /// The dimension is inferred from the first embedding vector, or 0 if
    /// there are none.
    pub fn new(embeddings: Vec<Vec<f32>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    /// Returns the number of embedding vectors in this result.
    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    /// Returns `true` if this result contains no embedding vectors.
    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    /// Check that there is one vector per input and that every vector has
    /// `dimension` finite components.
    pub fn validate(&self, expected_count: usize, dimension: usize) -> Result<()> {
        if self.embeddings.len() != expected_count {
            return Err(EmbedError::CountMismatch {
                expected: expected_count,
                actual: self.embeddings.len(),
            });
        }
        for embedding in &self.embeddings {
            if embedding.len() != dimension {
                return Err(EmbedError::DimensionMismatch {
                    expected: dimension,
                    actual: embedding.len(),
                });
            }
            if embedding.iter().any(|value| !value.is_finite()) {
                return Err(EmbedError::invalid_config(
                    "provider returned non-finite embedding values",
                ));
            }
        }
        Ok(())
    }

    pub fn into_vectors(self) -> Vec<Vec<f32>> {
        self.embeddings
    }
}

/// Trait for embedding providers that can generate embeddings from text
///
/// Implementations are all-or-nothing: either every input text gets a vector
/// of [`embedding_dimension`](EmbeddingProvider::embedding_dimension) length,
/// in input order, or an error is returned.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let result = self.embed_texts(&[text.to_string()]).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or(EmbedError::CountMismatch {
                expected: 1,
                actual: 0,
            })
    }

    /// Generate embeddings for multiple texts (batch processing)
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Get the dimension of embeddings produced by this provider
    fn embedding_dimension(&self) -> usize;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;
}

/// Build the provider described by `config`.
///
/// Local models are downloaded and loaded here, so this may take a while on
/// first use.
pub async fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    tracing::info!("Creating {} embedding provider", config.provider_name());
    match config {
        ProviderConfig::Hashing(HashingConfig { dimension }) => {
            Ok(Arc::new(HashingEmbedProvider::new(*dimension)?))
        }
        ProviderConfig::FastEmbed(embed_config) => {
            Ok(Arc::new(FastEmbedProvider::create(embed_config.clone()).await?))
        }
        ProviderConfig::Http(http_config) => {
            Ok(Arc::new(HttpEmbedProvider::new(http_config.clone())?))
        }
    }
}

/// Type alias for cached model entries (model, dimension)
type ModelCacheEntry = (Arc<Mutex<TextEmbedding>>, usize);

/// Global cache for initialized embedding models to avoid reloading
static MODEL_CACHE: OnceLock<Mutex<HashMap<String, ModelCacheEntry>>> = OnceLock::new();

fn model_cache() -> MutexGuard<'static, HashMap<String, ModelCacheEntry>> {
    MODEL_CACHE
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// FastEmbed-based embedding provider using local ONNX models
#[derive(Clone)]
pub struct FastEmbedProvider {
    config: EmbedConfig,
    model: Option<Arc<Mutex<TextEmbedding>>>,
    dimension: usize,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("config", &self.config)
            .field("model", &self.model.is_some())
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl FastEmbedProvider {
    /// Creates a new uninitialized provider; call [`initialize`](Self::initialize) before use.
    pub fn new(config: EmbedConfig) -> Self {
        let dimension = config.model.dimension();
        Self {
            config,
            model: None,
            dimension,
        }
    }

    /// Loads the embedding model, reusing a cached instance when one exists.
    pub async fn initialize(&mut self) -> Result<()> {
        self.config.validate()?;
        let cache_key = self.create_cache_key();

        let cached = model_cache()
            .get(&cache_key)
            .map(|(model, dim)| (Arc::clone(model), *dim));

        if let Some((model, dimension)) = cached {
            tracing::info!("Using cached model for: {}", self.config.model_name());
            self.model = Some(model);
            self.dimension = dimension;
            return Ok(());
        }

        let config = self.config.clone();
        let (model, dimension) =
            tokio::task::spawn_blocking(move || -> Result<(TextEmbedding, usize)> {
                tracing::info!("Loading embedding model: {}", config.model_name());

                let init_options = InitOptions::new(config.model.to_fastembed())
                    .with_cache_dir(config.cache_dir.clone())
                    .with_show_download_progress(config.show_download_progress);

                let mut model = TextEmbedding::try_new(init_options)
                    .map_err(|e| EmbedError::External { source: e })?;

                // Probe the real dimension rather than trusting the table
                let probe = model
                    .embed(vec!["dimension probe".to_string()], None)
                    .map_err(|e| EmbedError::External { source: e })?;
                let dimension = probe
                    .first()
                    .map(|emb| emb.len())
                    .unwrap_or_else(|| config.model.dimension());

                tracing::info!("Model loaded successfully. Dimension: {}", dimension);
                Ok((model, dimension))
            })
            .await??;

        let model = Arc::new(Mutex::new(model));
        model_cache().insert(cache_key, (Arc::clone(&model), dimension));

        self.model = Some(model);
        self.dimension = dimension;
        Ok(())
    }

    /// Creates and initializes a provider in one step.
    pub async fn create(config: EmbedConfig) -> Result<Self> {
        let mut provider = Self::new(config);
        provider.initialize().await?;
        Ok(provider)
    }

    fn create_cache_key(&self) -> String {
        let mut hasher = FnvHasher::default();
        hasher.write(self.config.model_name().as_bytes());
        hasher.write(self.config.cache_dir.to_string_lossy().as_bytes());
        format!("v1:{:x}", hasher.finish())
    }

    /// Clears the global model cache.
    pub fn clear_cache() {
        model_cache().clear();
        tracing::info!("Model cache cleared");
    }

    /// Returns the number of cached models.
    pub fn cache_size() -> usize {
        model_cache().len()
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        let model = self.model.as_ref().ok_or_else(|| {
            EmbedError::invalid_config("Model not initialized. Call initialize() first.")
        })?;

        tracing::debug!("Generating embeddings for {} texts", texts.len());

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.config.batch_size) {
            let chunk = chunk.to_vec();
            let model = Arc::clone(model);

            let batch = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
                let mut guard = model.lock().unwrap_or_else(PoisonError::into_inner);
                guard
                    .embed(chunk, None)
                    .map_err(|e| EmbedError::External { source: e })
            })
            .await??;

            all_embeddings.extend(batch);
        }

        let result = EmbeddingResult::new(all_embeddings);
        result.validate(texts.len(), self.dimension)?;
        tracing::debug!("Generated {} embeddings", result.len());
        Ok(result)
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }
}
