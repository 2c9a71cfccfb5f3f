use crate::error::Result;
use crate::storage::{Chunk, ChunkExtra, validate_extra};
use chrono::{DateTime, Utc};
use docvault_context::{ChunkParams, TextChunker};
use std::path::Path;

/// `extra` key recording the lower-cased file extension
pub const FILE_TYPE_KEY: &str = "file_type";
/// `extra` key recording the chunk length in characters
pub const CHUNK_CHARS_KEY: &str = "chunk_chars";

/// Strategy for turning a document into chunk records - delegates the
/// splitting itself to docvault-context
#[derive(Debug, Clone)]
pub struct ChunkingStrategy {
    chunker: TextChunker,
}

impl ChunkingStrategy {
    /// Create a strategy, rejecting invalid window parameters up front
    pub fn new(params: ChunkParams) -> Result<Self> {
        Ok(Self {
            chunker: TextChunker::new(params)?,
        })
    }

    pub fn params(&self) -> ChunkParams {
        self.chunker.params()
    }

    /// Chunk `text` into records for `filename`.
    ///
    /// Every record carries the caller's `extra` plus [`FILE_TYPE_KEY`] and
    /// [`CHUNK_CHARS_KEY`]; the merged map is validated before anything is
    /// returned.
    pub fn chunk_document(
        &self,
        text: &str,
        filename: &str,
        extra: &ChunkExtra,
        created_at: DateTime<Utc>,
    ) -> Result<Vec<Chunk>> {
        let file_type = file_type(filename);
        let segments = self.chunker.chunk(text);
        let total_chunks = segments.len();

        let mut base = extra.clone();
        base.insert(FILE_TYPE_KEY.to_string(), file_type);
        // Longest possible value, so one check covers every chunk
        base.insert(CHUNK_CHARS_KEY.to_string(), usize::MAX.to_string());
        validate_extra(&base)?;

        let chunks: Vec<Chunk> = segments
            .into_iter()
            .map(|segment| {
                let mut extra = base.clone();
                extra.insert(
                    CHUNK_CHARS_KEY.to_string(),
                    segment.char_range.len().to_string(),
                );
                Chunk {
                    text: segment.text,
                    source_filename: filename.to_string(),
                    chunk_index: segment.sequence,
                    total_chunks,
                    created_at,
                    extra,
                }
            })
            .collect();

        tracing::debug!(
            "Chunked {} into {} chunks (size {}, overlap {})",
            filename,
            chunks.len(),
            self.params().size,
            self.params().overlap
        );

        Ok(chunks)
    }
}

/// Lower-cased extension of `filename` with its leading dot (`.txt`), or an
/// empty string when there is none.
pub fn file_type(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RetrievalError;
    use crate::storage::MAX_EXTRA_ENTRIES;

    const BRIEF: &str = "Server uptime is 99.8%. Budget utilization is 92%.";

    #[test]
    fn test_chunk_document_records() {
        let strategy = ChunkingStrategy::new(ChunkParams::new(30, 5)).unwrap();
        let now = Utc::now();
        let chunks = strategy
            .chunk_document(BRIEF, "Brief.TXT", &ChunkExtra::new(), now)
            .unwrap();

        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            assert_eq!(chunk.total_chunks, chunks.len());
            assert_eq!(chunk.source_filename, "Brief.TXT");
            assert_eq!(chunk.created_at, now);
            assert_eq!(chunk.extra[FILE_TYPE_KEY], ".txt");
            assert_eq!(
                chunk.extra[CHUNK_CHARS_KEY],
                chunk.text.chars().count().to_string()
            );
        }
        assert_eq!(chunks[0].text, "Server uptime is 99.8%.");
    }

    #[test]
    fn test_caller_extra_is_kept() {
        let strategy = ChunkingStrategy::new(ChunkParams::default()).unwrap();
        let mut extra = ChunkExtra::new();
        extra.insert("department".to_string(), "finance".to_string());

        let chunks = strategy
            .chunk_document("Quarterly budget.", "budget.csv", &extra, Utc::now())
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].extra["department"], "finance");
        assert_eq!(chunks[0].extra[FILE_TYPE_KEY], ".csv");
    }

    #[test]
    fn test_extra_limit_counts_reserved_keys() {
        let strategy = ChunkingStrategy::new(ChunkParams::default()).unwrap();
        let extra: ChunkExtra = (0..MAX_EXTRA_ENTRIES - 1)
            .map(|i| (format!("k{i}"), "v".to_string()))
            .collect();
        let err = strategy
            .chunk_document("text", "a.txt", &extra, Utc::now())
            .unwrap_err();
        assert!(matches!(err, RetrievalError::InvalidMetadata { .. }));
    }

    #[test]
    fn test_invalid_params_rejected() {
        let err = ChunkingStrategy::new(ChunkParams::new(10, 10)).unwrap_err();
        assert!(matches!(err, RetrievalError::InvalidChunkParameters(_)));
    }

    #[test]
    fn test_empty_document_has_no_chunks() {
        let strategy = ChunkingStrategy::new(ChunkParams::default()).unwrap();
        let chunks = strategy
            .chunk_document("   \n", "empty.txt", &ChunkExtra::new(), Utc::now())
            .unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_file_type() {
        assert_eq!(file_type("report.PDF"), ".pdf");
        assert_eq!(file_type("dir/notes.md"), ".md");
        assert_eq!(file_type("archive.tar.gz"), ".gz");
        assert_eq!(file_type("README"), "");
        assert_eq!(file_type(".bashrc"), "");
    }
}
