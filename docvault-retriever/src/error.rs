//! Error types for the retrieval service and its persistence layer

use docvault_context::ChunkError;
use docvault_embed::EmbedError;
use std::path::PathBuf;

/// Result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Errors surfaced by [`RetrievalService`](crate::retrieval::service::RetrievalService).
///
/// Every variant is raised before the in-memory store is touched, except
/// [`PersistenceWriteFailed`](RetrievalError::PersistenceWriteFailed) from
/// `clear`, where memory has already been emptied.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    /// A vector's length differs from the store dimension
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The embedding provider was unreachable or failed
    #[error("embedding provider unavailable: {source}")]
    EmbeddingUnavailable {
        #[source]
        source: EmbedError,
    },

    /// Zero chunk size, or overlap not smaller than the size
    #[error(transparent)]
    InvalidChunkParameters(#[from] ChunkError),

    /// The per-chunk `extra` map exceeds its bounds
    #[error("invalid chunk metadata: {message}")]
    InvalidMetadata { message: String },

    /// Writing or deleting persisted artifacts failed
    #[error("persistence write failed: {source}")]
    PersistenceWriteFailed {
        #[from]
        source: PersistError,
    },

    /// Configuration is inconsistent or could not be read
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl RetrievalError {
    pub fn invalid_metadata<S: Into<String>>(message: S) -> Self {
        Self::InvalidMetadata {
            message: message.into(),
        }
    }

    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

impl From<EmbedError> for RetrievalError {
    fn from(err: EmbedError) -> Self {
        match err {
            EmbedError::DimensionMismatch { expected, actual } => {
                Self::DimensionMismatch { expected, actual }
            }
            source => Self::EmbeddingUnavailable { source },
        }
    }
}

/// Failures while reading or writing snapshot artifacts.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Artifacts exist but are inconsistent with each other or the manifest
    #[error("corrupt snapshot: {0}")]
    Corrupt(String),
}

impl PersistError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt<S: Into<String>>(message: S) -> Self {
        Self::Corrupt(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RetrievalError::DimensionMismatch {
            expected: 1536,
            actual: 384,
        };
        assert_eq!(err.to_string(), "dimension mismatch: expected 1536, got 384");

        let err = RetrievalError::from(ChunkError::ZeroSize);
        assert_eq!(
            err.to_string(),
            "invalid chunk parameters: size must be positive"
        );

        let err = PersistError::corrupt("index holds 3 vectors, metadata 2");
        assert_eq!(
            err.to_string(),
            "corrupt snapshot: index holds 3 vectors, metadata 2"
        );
    }

    #[test]
    fn test_embed_error_mapping() {
        let err = RetrievalError::from(EmbedError::DimensionMismatch {
            expected: 8,
            actual: 4,
        });
        assert!(matches!(
            err,
            RetrievalError::DimensionMismatch {
                expected: 8,
                actual: 4
            }
        ));

        let err = RetrievalError::from(EmbedError::unavailable("http", "connection refused"));
        assert!(matches!(err, RetrievalError::EmbeddingUnavailable { .. }));
    }
}
