//! Service configuration, loaded from a TOML file with every field defaulted.
//!
//! ```toml
//! data_dir = "/var/lib/docvault"
//! dimension = 1536
//! backend = "exact"
//! chunk_size = 1000
//! chunk_overlap = 200
//!
//! [embedding]
//! provider = "http"
//! endpoint = "https://example.openai.azure.com"
//! model = "text-embedding-ada-002"
//! ```

use crate::error::{RetrievalError, Result};
use docvault_context::ChunkParams;
use docvault_embed::ProviderConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// How chunk text is turned into index vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Vectors from an embedding provider, appended incrementally
    #[default]
    Exact,
    /// A TF-IDF vectorizer refitted over the whole corpus on every add
    Tfidf,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Exact => "exact",
            Backend::Tfidf => "tfidf",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exact" => Ok(Backend::Exact),
            "tfidf" => Ok(Backend::Tfidf),
            _ => Err(format!("Invalid backend: {s}")),
        }
    }
}

/// Configuration for a [`RetrievalService`](crate::retrieval::service::RetrievalService)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    /// Directory holding the persisted snapshot
    pub data_dir: PathBuf,
    /// Store-wide vector length
    pub dimension: usize,
    pub backend: Backend,
    /// Chunk window size in characters
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks
    pub chunk_overlap: usize,
    /// Result count used when a caller does not pass `k`
    pub default_k: usize,
    /// Embedding provider for the exact backend
    pub embedding: ProviderConfig,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        let embedding = ProviderConfig::default();
        Self {
            data_dir: PathBuf::from(".docvault"),
            dimension: embedding.dimension(),
            backend: Backend::Exact,
            chunk_size: docvault_context::text::DEFAULT_CHUNK_SIZE,
            chunk_overlap: docvault_context::text::DEFAULT_CHUNK_OVERLAP,
            default_k: 5,
            embedding,
        }
    }
}

impl RetrieverConfig {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Read a TOML configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RetrievalError::invalid_config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            RetrievalError::invalid_config(format!("cannot parse {}: {e}", path.display()))
        })?;
        Ok(config)
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_chunking(mut self, chunk_size: usize, chunk_overlap: usize) -> Self {
        self.chunk_size = chunk_size;
        self.chunk_overlap = chunk_overlap;
        self
    }

    pub fn with_default_k(mut self, default_k: usize) -> Self {
        self.default_k = default_k;
        self
    }

    /// Use `embedding` and adopt its dimension.
    pub fn with_embedding(mut self, embedding: ProviderConfig) -> Self {
        self.dimension = embedding.dimension();
        self.embedding = embedding;
        self
    }

    pub fn chunk_params(&self) -> ChunkParams {
        ChunkParams::new(self.chunk_size, self.chunk_overlap)
    }

    /// Check the settings that can be checked without touching disk or network.
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(RetrievalError::invalid_config("dimension must be positive"));
        }
        self.chunk_params().validate()?;
        if self.backend == Backend::Exact && self.embedding.dimension() != self.dimension {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dimension,
                actual: self.embedding.dimension(),
            });
        }
        Ok(())
    }
}
