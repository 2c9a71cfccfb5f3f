//! Chunk records and their on-disk snapshot
//!
//! This module holds the provenance side of the store. Vectors live in the
//! [`FlatIndex`](crate::retrieval::flat_index::FlatIndex); the
//! [`MetadataStore`] here is a parallel array joined to it by position, so the
//! two always have the same length after a completed mutation.
//!
//! ## Key Components
//!
//! - **Chunk**: immutable record of one text segment and where it came from
//! - **MetadataStore**: append-only, position-addressed sequence of chunks
//! - **PersistenceLayer**: crash-safe save and validated load of a whole snapshot
//!
//! ## Architecture
//!
//! ```text
//! FlatIndex ─────┐
//! MetadataStore ─┼─ PersistenceLayer ── manifest.json + generation-numbered artifacts
//! TfIdfVectorizer┘
//! ```

use crate::error::{RetrievalError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub mod snapshot;

/// Ordinal slot of a vector in the index; joins index entries to metadata.
pub type PositionId = usize;

/// Free-form per-chunk annotations, bounded by [`validate_extra`].
pub type ChunkExtra = BTreeMap<String, String>;

pub const MAX_EXTRA_ENTRIES: usize = 16;
pub const MAX_EXTRA_KEY_CHARS: usize = 64;
pub const MAX_EXTRA_VALUE_CHARS: usize = 1024;

/// A text segment with its provenance. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source_filename: String,
    /// Position within the source document (0-based)
    pub chunk_index: usize,
    /// Number of chunks the source document produced
    pub total_chunks: usize,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub extra: ChunkExtra,
}

/// Reject `extra` maps with too many entries or oversized keys/values.
pub fn validate_extra(extra: &ChunkExtra) -> Result<()> {
    if extra.len() > MAX_EXTRA_ENTRIES {
        return Err(RetrievalError::invalid_metadata(format!(
            "{} entries exceed the limit of {MAX_EXTRA_ENTRIES}",
            extra.len()
        )));
    }
    for (key, value) in extra {
        if key.is_empty() || key.chars().count() > MAX_EXTRA_KEY_CHARS {
            return Err(RetrievalError::invalid_metadata(format!(
                "key {key:?} must be 1 to {MAX_EXTRA_KEY_CHARS} characters"
            )));
        }
        if value.chars().count() > MAX_EXTRA_VALUE_CHARS {
            return Err(RetrievalError::invalid_metadata(format!(
                "value for {key:?} exceeds {MAX_EXTRA_VALUE_CHARS} characters"
            )));
        }
    }
    Ok(())
}

/// Ordered chunk records, index-aligned with the vector index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataStore {
    chunks: Vec<Chunk>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return its position.
    pub fn append(&mut self, chunk: Chunk) -> PositionId {
        self.chunks.push(chunk);
        self.chunks.len() - 1
    }

    pub fn extend(&mut self, chunks: impl IntoIterator<Item = Chunk>) {
        self.chunks.extend(chunks);
    }

    pub fn get(&self, position: PositionId) -> Option<&Chunk> {
        self.chunks.get(position)
    }

    pub fn count(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }

    pub fn unique_source_files(&self) -> BTreeSet<&str> {
        self.chunks
            .iter()
            .map(|chunk| chunk.source_filename.as_str())
            .collect()
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
    }
}
