pub mod error;
pub mod text;

// Re-export the main chunking entry points for external use
pub use error::{ChunkError, Result};
pub use text::{ChunkParams, TextChunker, TextSegment, chunk_text};
