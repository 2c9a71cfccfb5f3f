//! Configuration for embedding providers

use crate::error::{EmbedError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Dimension of Azure OpenAI `text-embedding-ada-002` vectors.
pub const ADA_002_DIMENSION: usize = 1536;

/// Which provider to build and how to configure it.
///
/// Deserializes from a table tagged by `provider`, e.g. in TOML:
///
/// ```toml
/// provider = "http"
/// endpoint = "https://example.openai.azure.com"
/// model = "text-embedding-ada-002"
/// flavor = "azure"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Deterministic feature hashing, no model or network required
    Hashing(HashingConfig),
    /// Local ONNX model through fastembed
    FastEmbed(EmbedConfig),
    /// Remote OpenAI-compatible embeddings endpoint
    Http(HttpConfig),
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::Hashing(HashingConfig::default())
    }
}

impl ProviderConfig {
    /// The dimension the configured provider will produce.
    pub fn dimension(&self) -> usize {
        match self {
            Self::Hashing(config) => config.dimension,
            Self::FastEmbed(config) => config.model.dimension(),
            Self::Http(config) => config.dimension,
        }
    }

    /// Short name used in logs and stats.
    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::Hashing(_) => "hashing",
            Self::FastEmbed(_) => "fastembed",
            Self::Http(_) => "http",
        }
    }
}

/// Configuration for the feature-hashing provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashingConfig {
    /// Number of hash buckets, i.e. the vector length
    pub dimension: usize,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self { dimension: 384 }
    }
}

impl HashingConfig {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

/// Built-in fastembed models that can run locally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocalModel {
    AllMiniLmL6V2,
    BgeSmallEnV15,
    BgeBaseEnV15,
    NomicEmbedTextV15,
}

impl LocalModel {
    pub fn dimension(&self) -> usize {
        match self {
            Self::AllMiniLmL6V2 | Self::BgeSmallEnV15 => 384,
            Self::BgeBaseEnV15 | Self::NomicEmbedTextV15 => 768,
        }
    }

    pub fn model_name(&self) -> &'static str {
        match self {
            Self::AllMiniLmL6V2 => "all-MiniLM-L6-v2",
            Self::BgeSmallEnV15 => "bge-small-en-v1.5",
            Self::BgeBaseEnV15 => "bge-base-en-v1.5",
            Self::NomicEmbedTextV15 => "nomic-embed-text-v1.5",
        }
    }

    pub(crate) fn to_fastembed(self) -> fastembed::EmbeddingModel {
        match self {
            Self::AllMiniLmL6V2 => fastembed::EmbeddingModel::AllMiniLML6V2,
            Self::BgeSmallEnV15 => fastembed::EmbeddingModel::BGESmallENV15,
            Self::BgeBaseEnV15 => fastembed::EmbeddingModel::BGEBaseENV15,
            Self::NomicEmbedTextV15 => fastembed::EmbeddingModel::NomicEmbedTextV15,
        }
    }
}

/// Configuration for local fastembed models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    /// Which built-in model to load
    pub model: LocalModel,
    /// Directory fastembed downloads model files into
    pub cache_dir: PathBuf,
    /// Maximum batch size for embedding generation
    pub batch_size: usize,
    /// Whether to print download progress on first use
    pub show_download_progress: bool,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            model: LocalModel::AllMiniLmL6V2,
            cache_dir: PathBuf::from("models"),
            batch_size: 32,
            show_download_progress: false,
        }
    }
}

impl EmbedConfig {
    /// Create a configuration for `model` caching files under `cache_dir`
    pub fn new<P: AsRef<Path>>(model: LocalModel, cache_dir: P) -> Self {
        Self {
            model,
            cache_dir: cache_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Set the batch size for embedding generation (builder style)
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    /// Set whether download progress is shown (builder style)
    pub fn with_download_progress(self, show_download_progress: bool) -> Self {
        Self {
            show_download_progress,
            ..self
        }
    }

    pub fn model_name(&self) -> &'static str {
        self.model.model_name()
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(EmbedError::invalid_config("batch_size must be positive"));
        }
        Ok(())
    }
}

/// Wire dialect of a remote embeddings endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpFlavor {
    /// `POST {endpoint}/embeddings` with a bearer token
    OpenAi,
    /// `POST {endpoint}/openai/deployments/{model}/embeddings?api-version=...` with an `api-key` header
    Azure,
}

/// Configuration for a remote embeddings endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Base URL of the service
    pub endpoint: String,
    /// Model name (OpenAI) or deployment name (Azure)
    pub model: String,
    pub flavor: HttpFlavor,
    /// API version query parameter, Azure only
    pub api_version: String,
    /// Literal API key; prefer `api_key_env`
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Environment variable holding the API key
    pub api_key_env: Option<String>,
    /// Vector length the model produces
    pub dimension: usize,
    /// Maximum number of texts per request
    pub batch_size: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            model: "text-embedding-ada-002".to_string(),
            flavor: HttpFlavor::Azure,
            api_version: "2024-02-15-preview".to_string(),
            api_key: None,
            api_key_env: Some("AZURE_OPENAI_API_KEY".to_string()),
            dimension: ADA_002_DIMENSION,
            batch_size: 16,
            timeout_secs: 30,
        }
    }
}

impl HttpConfig {
    /// Azure OpenAI deployment serving `text-embedding-ada-002`
    pub fn azure(endpoint: impl Into<String>, deployment: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: deployment.into(),
            ..Self::default()
        }
    }

    /// OpenAI-compatible endpoint (OpenAI itself, Ollama, vLLM, ...)
    pub fn openai(endpoint: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            flavor: HttpFlavor::OpenAi,
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            dimension,
            ..Self::default()
        }
    }

    /// Set a literal API key (builder style)
    pub fn with_api_key(self, api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..self
        }
    }

    /// Set the request timeout (builder style)
    pub fn with_timeout_secs(self, timeout_secs: u64) -> Self {
        Self {
            timeout_secs,
            ..self
        }
    }

    /// Set the number of texts per request (builder style)
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    /// Full URL of the embeddings route.
    pub fn embeddings_url(&self) -> String {
        let base = self.endpoint.trim_end_matches('/');
        match self.flavor {
            HttpFlavor::OpenAi => format!("{base}/embeddings"),
            HttpFlavor::Azure => format!(
                "{base}/openai/deployments/{}/embeddings?api-version={}",
                self.model, self.api_version
            ),
        }
    }

    /// The API key from the config or the configured environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| {
            self.api_key_env
                .as_deref()
                .and_then(|name| std::env::var(name).ok())
                .filter(|key| !key.is_empty())
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            return Err(EmbedError::invalid_config("endpoint must be set"));
        }
        if self.dimension == 0 {
            return Err(EmbedError::invalid_config("dimension must be positive"));
        }
        if self.batch_size == 0 {
            return Err(EmbedError::invalid_config("batch_size must be positive"));
        }
        Ok(())
    }
}
