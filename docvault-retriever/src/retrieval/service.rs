//! The retrieval service: the one entry point for adding, searching and
//! resetting the document store.
//!
//! This module ties the pipeline together. It owns the chunking strategy, the
//! vector index, the metadata store and the persistence layer, and keeps them
//! consistent with each other.
//!
//! ## Pipeline Flow
//!
//! ```text
//! addDocument: text → ChunkingStrategy → encoder → FlatIndex + MetadataStore → PersistenceLayer
//! search:      query → encoder → FlatIndex::search → join MetadataStore → ranked results
//! ```
//!
//! ## Backends
//!
//! - **exact**: chunk vectors come from an [`EmbeddingProvider`] and are
//!   appended to the index. The provider is called before the write lock is
//!   taken, so an abandoned or failed embedding call leaves nothing behind.
//! - **tfidf**: a [`TfIdfVectorizer`] is refitted over the whole corpus on
//!   every add and the index is rebuilt from scratch. The refit happens under
//!   the write lock into fresh values that are swapped in only on success.
//!
//! ## Concurrency
//!
//! Index, metadata, vectorizer and persistence layer sit behind one
//! [`tokio::sync::RwLock`]. `add_document` and `clear` take the write lock;
//! `search`, `search_vector` and `stats` share the read lock. While the write
//! lock is held there is no `.await`, so the in-memory mutation and the
//! snapshot write always run to completion together.
//!
//! ## Durability
//!
//! Every successful `add_document` writes a snapshot before returning. If that
//! write fails the in-memory state is still correct and the failure comes
//! back as [`AddOutcome::persistence_warning`] rather than as an error.

use crate::config::{Backend, RetrieverConfig};
use crate::error::{RetrievalError, Result};
use crate::retrieval::chunking_strategy::ChunkingStrategy;
use crate::retrieval::flat_index::FlatIndex;
use crate::retrieval::tfidf::TfIdfVectorizer;
use crate::status::StoreStats;
use crate::storage::snapshot::{LoadOutcome, PersistenceLayer, SnapshotRef};
use crate::storage::{Chunk, ChunkExtra, MetadataStore};
use chrono::Utc;
use docvault_embed::{EmbedError, EmbeddingProvider, create_provider};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Characters of each chunk included by [`RetrievalService::build_context`] by default
pub const DEFAULT_CONTEXT_CHARS: usize = 300;

/// Result of a successful [`RetrievalService::add_document`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddOutcome {
    /// Chunks created from the document
    pub chunks_created: usize,
    /// Chunks in the store afterwards
    pub total_chunks: usize,
    /// Set when the in-memory store was updated but the snapshot write failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistence_warning: Option<String>,
}

/// One ranked search hit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub chunk: Chunk,
    /// Squared L2 distance to the query; smaller is closer
    pub distance: f32,
    /// 1-based position in the result list
    pub rank: usize,
}

impl SearchResult {
    /// Distance mapped into `(0, 1]`, larger is closer.
    pub fn similarity(&self) -> f32 {
        1.0 / (1.0 + self.distance)
    }
}

enum Encoder {
    Provider(Arc<dyn EmbeddingProvider>),
    TfIdf,
}

impl Encoder {
    fn backend(&self) -> Backend {
        match self {
            Encoder::Provider(_) => Backend::Exact,
            Encoder::TfIdf => Backend::Tfidf,
        }
    }
}

struct StoreState {
    index: FlatIndex,
    metadata: MetadataStore,
    vectorizer: Option<TfIdfVectorizer>,
    persistence: PersistenceLayer,
}

impl StoreState {
    fn is_trained(&self) -> bool {
        !self.metadata.is_empty()
    }

    /// Rank the `k` nearest chunks and join them with their records.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        let neighbors = self.index.search(query, k)?;
        Ok(neighbors
            .into_iter()
            .filter_map(|neighbor| {
                let chunk = self.metadata.get(neighbor.position)?;
                Some((chunk.clone(), neighbor.distance))
            })
            .enumerate()
            .map(|(i, (chunk, distance))| SearchResult {
                chunk,
                distance,
                rank: i + 1,
            })
            .collect())
    }

    /// Snapshot the current state; returns the failure text instead of an error.
    fn persist(&mut self, backend: Backend) -> Option<String> {
        let StoreState {
            index,
            metadata,
            vectorizer,
            persistence,
        } = self;
        let snapshot = SnapshotRef {
            backend,
            index,
            metadata,
            vectorizer: vectorizer.as_ref(),
        };
        match persistence.save(snapshot) {
            Ok(()) => None,
            Err(e) => {
                error!(
                    "PersistenceWriteFailed: snapshot to {} failed: {}",
                    persistence.dir().display(),
                    e
                );
                Some(e.to_string())
            }
        }
    }
}

/// Document store with exact nearest-neighbor search. Share it behind an `Arc`.
pub struct RetrievalService {
    config: RetrieverConfig,
    chunking: ChunkingStrategy,
    encoder: Encoder,
    state: RwLock<StoreState>,
}

impl std::fmt::Debug for RetrievalService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalService")
            .field("config", &self.config)
            .field("backend", &self.encoder.backend())
            .finish()
    }
}

impl RetrievalService {
    /// Open the store described by `config`, building the embedding provider
    /// it names for the exact backend, and load any prior snapshot.
    pub async fn open(config: RetrieverConfig) -> Result<Self> {
        config.validate()?;
        match config.backend {
            Backend::Exact => {
                let provider = create_provider(&config.embedding).await?;
                Self::open_with_provider(config, provider)
            }
            Backend::Tfidf => Self::open_tfidf(config),
        }
    }

    /// Open an exact-backend store that embeds with `provider`.
    pub fn open_with_provider(
        config: RetrieverConfig,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        if config.backend != Backend::Exact {
            return Err(RetrievalError::invalid_config(format!(
                "an embedding provider needs the exact backend, not {}",
                config.backend
            )));
        }
        if provider.embedding_dimension() != config.dimension {
            return Err(RetrievalError::DimensionMismatch {
                expected: config.dimension,
                actual: provider.embedding_dimension(),
            });
        }
        Self::open_inner(config, Encoder::Provider(provider))
    }

    /// Open a tfidf-backend store.
    pub fn open_tfidf(config: RetrieverConfig) -> Result<Self> {
        if config.backend != Backend::Tfidf {
            return Err(RetrievalError::invalid_config(format!(
                "open_tfidf needs the tfidf backend, not {}",
                config.backend
            )));
        }
        Self::open_inner(config, Encoder::TfIdf)
    }

    fn open_inner(config: RetrieverConfig, encoder: Encoder) -> Result<Self> {
        if config.dimension == 0 {
            return Err(RetrievalError::invalid_config("dimension must be positive"));
        }
        let chunking = ChunkingStrategy::new(config.chunk_params())?;
        let backend = encoder.backend();

        let mut persistence = PersistenceLayer::new(&config.data_dir);
        let state = match persistence.load(backend, config.dimension) {
            LoadOutcome::Loaded(snapshot) => StoreState {
                index: snapshot.index,
                metadata: snapshot.metadata,
                vectorizer: snapshot.vectorizer,
                persistence,
            },
            LoadOutcome::NotFound => StoreState {
                index: FlatIndex::new(config.dimension),
                metadata: MetadataStore::new(),
                vectorizer: None,
                persistence,
            },
        };

        info!(
            "Opened {} store at {} with {} chunks (dimension {})",
            backend,
            config.data_dir.display(),
            state.metadata.count(),
            config.dimension
        );

        Ok(Self {
            config,
            chunking,
            encoder,
            state: RwLock::new(state),
        })
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    pub fn backend(&self) -> Backend {
        self.encoder.backend()
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    /// Chunk, embed and store `text` as `filename`.
    pub async fn add_document(&self, text: &str, filename: &str) -> Result<AddOutcome> {
        self.add_document_with_extra(text, filename, &ChunkExtra::new())
            .await
    }

    /// Like [`add_document`](Self::add_document), attaching `extra` to every chunk.
    ///
    /// # Errors
    ///
    /// - [`RetrievalError::InvalidMetadata`] if `extra` is out of bounds
    /// - [`RetrievalError::EmbeddingUnavailable`] if the provider fails
    /// - [`RetrievalError::DimensionMismatch`] if a returned vector has the wrong length
    ///
    /// In every error case the store is unchanged.
    pub async fn add_document_with_extra(
        &self,
        text: &str,
        filename: &str,
        extra: &ChunkExtra,
    ) -> Result<AddOutcome> {
        let chunks = self
            .chunking
            .chunk_document(text, filename, extra, Utc::now())?;

        if chunks.is_empty() {
            debug!("{} produced no chunks, nothing to add", filename);
            let state = self.state.read().await;
            return Ok(AddOutcome {
                chunks_created: 0,
                total_chunks: state.metadata.count(),
                persistence_warning: None,
            });
        }

        match &self.encoder {
            Encoder::Provider(provider) => self.add_embedded(provider.as_ref(), chunks).await,
            Encoder::TfIdf => self.add_refitted(chunks).await,
        }
    }

    async fn add_embedded(
        &self,
        provider: &dyn EmbeddingProvider,
        chunks: Vec<Chunk>,
    ) -> Result<AddOutcome> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embedded = provider.embed_texts(&texts).await?;
        if embedded.len() != chunks.len() {
            return Err(RetrievalError::from(EmbedError::CountMismatch {
                expected: chunks.len(),
                actual: embedded.len(),
            }));
        }
        let vectors = embedded.into_vectors();

        let mut state = self.state.write().await;
        state.index.add(&vectors)?;
        let chunks_created = chunks.len();
        let filename = chunks[0].source_filename.clone();
        state.metadata.extend(chunks);
        let persistence_warning = state.persist(Backend::Exact);

        info!(
            "Added {} chunks from {} ({} total)",
            chunks_created,
            filename,
            state.metadata.count()
        );
        Ok(AddOutcome {
            chunks_created,
            total_chunks: state.metadata.count(),
            persistence_warning,
        })
    }

    async fn add_refitted(&self, chunks: Vec<Chunk>) -> Result<AddOutcome> {
        let mut state = self.state.write().await;

        let corpus: Vec<&str> = state
            .metadata
            .iter()
            .chain(chunks.iter())
            .map(|chunk| chunk.text.as_str())
            .collect();
        let (vectorizer, vectors) = TfIdfVectorizer::fit_transform(&corpus, self.config.dimension);
        let mut index = FlatIndex::new(self.config.dimension);
        index.rebuild(&vectors)?;
        debug!(
            "Refitted TF-IDF over {} chunks ({} terms)",
            corpus.len(),
            vectorizer.vocabulary_len()
        );

        let chunks_created = chunks.len();
        let filename = chunks[0].source_filename.clone();
        state.index = index;
        state.vectorizer = Some(vectorizer);
        state.metadata.extend(chunks);
        let persistence_warning = state.persist(Backend::Tfidf);

        info!(
            "Added {} chunks from {} ({} total)",
            chunks_created,
            filename,
            state.metadata.count()
        );
        Ok(AddOutcome {
            chunks_created,
            total_chunks: state.metadata.count(),
            persistence_warning,
        })
    }

    /// The `k` chunks closest to `query`. An empty store or `k == 0` returns
    /// no results without calling the embedding provider.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        // A tfidf query is encoded and ranked under the same read guard
        let results = match &self.encoder {
            Encoder::Provider(provider) => {
                if self.state.read().await.metadata.is_empty() {
                    return Ok(Vec::new());
                }
                let query_vector = provider.embed_text(query).await?;
                self.state.read().await.search(&query_vector, k)?
            }
            Encoder::TfIdf => {
                let state = self.state.read().await;
                match &state.vectorizer {
                    Some(vectorizer) if !state.metadata.is_empty() => {
                        state.search(&vectorizer.transform(query), k)?
                    }
                    _ => return Ok(Vec::new()),
                }
            }
        };

        debug!("Search for {:?} returned {} results", query, results.len());
        Ok(results)
    }

    /// The `k` chunks closest to a caller-supplied vector.
    pub async fn search_vector(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        self.state.read().await.search(query, k)
    }

    /// Format the top `k` results as grounding text for a response generator,
    /// each excerpt cut to `max_chars_per_chunk` characters.
    pub async fn build_context(
        &self,
        query: &str,
        k: usize,
        max_chars_per_chunk: usize,
    ) -> Result<String> {
        let results = self.search(query, k).await?;
        if results.is_empty() {
            return Ok(String::new());
        }

        let mut context = String::from("Relevant document excerpts:\n\n");
        for result in &results {
            let excerpt: String = result.chunk.text.chars().take(max_chars_per_chunk).collect();
            context.push_str(&format!(
                "From {}: {}...\n\n",
                result.chunk.source_filename, excerpt
            ));
        }
        Ok(context)
    }

    /// Empty the store and delete the snapshot. Safe to call repeatedly.
    ///
    /// Memory is emptied even when deleting the files fails; the failure is
    /// then returned as [`RetrievalError::PersistenceWriteFailed`].
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().await;
        let removed = state.metadata.count();
        state.index.clear();
        state.metadata.clear();
        state.vectorizer = None;

        if let Err(e) = state.persistence.clear() {
            warn!("Cleared memory but could not delete snapshot: {}", e);
            return Err(e.into());
        }
        info!("Cleared store ({} chunks removed)", removed);
        Ok(())
    }

    pub async fn stats(&self) -> StoreStats {
        let state = self.state.read().await;
        let source_files: Vec<String> = state
            .metadata
            .unique_source_files()
            .into_iter()
            .map(str::to_string)
            .collect();
        StoreStats {
            total_chunks: state.metadata.count(),
            unique_source_files: source_files.len(),
            is_trained: state.is_trained(),
            dimension: self.config.dimension,
            backend: self.encoder.backend(),
            provider: match &self.encoder {
                Encoder::Provider(provider) => Some(provider.provider_name().to_string()),
                Encoder::TfIdf => None,
            },
            snapshot_bytes: state.persistence.snapshot_bytes(),
            source_files,
        }
    }
}
