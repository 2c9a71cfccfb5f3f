//! This module splits extracted document text into overlapping segments that can
//! be embedded independently and retrieved on their own.
//!
//! The module defines two main structs:
//! - [`TextChunker`]: Holds validated [`ChunkParams`] and produces the segments.
//! - [`TextSegment`]: A single segment of text along with its position in the
//!   source document.
//!
//! # Chunking Policy
//!
//! *   **Short documents**: A document no longer than the window size becomes a
//!     single segment equal to the trimmed input.
//! *   **Sliding window**: Longer documents are cut into windows of `size`
//!     characters. Before cutting, the chunker looks backward from the window
//!     end for a sentence terminal (`.`, `!`, `?`) within the last `size / 2`
//!     characters and cuts just after it, so sentences stay whole when possible.
//! *   **Overlap**: Each window starts `overlap` characters before the previous
//!     one ended, so neighbouring segments share context.
//! *   **Characters, not bytes**: Sizes are counted in Unicode scalar values, so
//!     multi-byte text is never split inside a character.
//!
//! # Usage
//!
//! ```
//! use docvault_context::text::{ChunkParams, TextChunker};
//!
//! let chunker = TextChunker::new(ChunkParams::new(50, 10)).unwrap();
//! let segments = chunker.chunk("Server uptime is 99.8%. Budget utilization is 92%. Three incidents were resolved.");
//!
//! assert!(segments.len() > 1);
//! assert_eq!(segments[0].text, "Server uptime is 99.8%. Budget utilization is 92%.");
//! for (i, segment) in segments.iter().enumerate() {
//!     assert_eq!(segment.sequence, i);
//!     assert!(!segment.text.is_empty());
//! }
//! ```
use crate::error::{ChunkError, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Default window size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default number of characters shared by consecutive windows.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Window size and overlap for the sliding-window chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkParams {
    /// Maximum size of each segment in characters
    pub size: usize,
    /// Characters shared by consecutive segments
    pub overlap: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkParams {
    pub fn new(size: usize, overlap: usize) -> Self {
        Self { size, overlap }
    }

    /// Reject parameters that would never advance the window.
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(ChunkError::ZeroSize);
        }
        if self.overlap >= self.size {
            return Err(ChunkError::OverlapTooLarge {
                size: self.size,
                overlap: self.overlap,
            });
        }
        Ok(())
    }
}

/// Represents a single segment of a document's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextSegment {
    /// The position of this segment within the document (0-indexed).
    pub sequence: usize,
    /// The trimmed text of this segment.
    pub text: String,
    /// Character offsets of `text` within the original document.
    pub char_range: Range<usize>,
}

/// Sliding-window chunker with sentence-aware cut points.
#[derive(Debug, Clone)]
pub struct TextChunker {
    params: ChunkParams,
}

impl TextChunker {
    /// Creates a chunker, validating the parameters first.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError::ZeroSize`] when `size` is zero and
    /// [`ChunkError::OverlapTooLarge`] when `overlap >= size`.
    pub fn new(params: ChunkParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> ChunkParams {
        self.params
    }

    /// Splits `text` into ordered, non-empty segments.
    ///
    /// Segments that are empty after trimming (for example a window made only
    /// of whitespace) are dropped, and the remaining segments are numbered
    /// contiguously from zero.
    ///
    /// ```
    /// use docvault_context::text::{ChunkParams, TextChunker};
    ///
    /// let chunker = TextChunker::new(ChunkParams::default()).unwrap();
    /// let segments = chunker.chunk("  short text \n");
    /// assert_eq!(segments.len(), 1);
    /// assert_eq!(segments[0].text, "short text");
    /// ```
    pub fn chunk(&self, text: &str) -> Vec<TextSegment> {
        // Byte offset of every character boundary, including the end of the text
        let offsets: Vec<usize> = text
            .char_indices()
            .map(|(offset, _)| offset)
            .chain(std::iter::once(text.len()))
            .collect();
        let total = offsets.len() - 1;
        let ChunkParams { size, overlap } = self.params;

        let mut segments = Vec::new();
        if total <= size {
            push_trimmed(&mut segments, text, &offsets, 0..total);
            return segments;
        }

        let mut start = 0;
        while start < total {
            let mut end = (start + size).min(total);

            if end < total {
                let lookback_start = end.saturating_sub(size / 2).max(start);
                let window = &text[offsets[lookback_start]..offsets[end]];
                if let Some(pos) = window.rfind(is_sentence_terminal) {
                    end = lookback_start + window[..pos].chars().count() + 1;
                }
            }

            push_trimmed(&mut segments, text, &offsets, start..end);

            if end >= total {
                break;
            }
            let next = end.saturating_sub(overlap);
            start = if next > start { next } else { end };
        }

        segments
    }
}

/// Convenience wrapper returning only the segment texts.
///
/// ```
/// use docvault_context::chunk_text;
///
/// assert_eq!(chunk_text("short text", 1000, 200).unwrap(), vec!["short text"]);
/// assert!(chunk_text("anything", 10, 10).is_err());
/// ```
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Result<Vec<String>> {
    let chunker = TextChunker::new(ChunkParams::new(size, overlap))?;
    Ok(chunker
        .chunk(text)
        .into_iter()
        .map(|segment| segment.text)
        .collect())
}

fn is_sentence_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

fn push_trimmed(
    segments: &mut Vec<TextSegment>,
    text: &str,
    offsets: &[usize],
    chars: Range<usize>,
) {
    let raw = &text[offsets[chars.start]..offsets[chars.end]];
    let trimmed_start = raw.trim_start();
    let trimmed = trimmed_start.trim_end();
    if trimmed.is_empty() {
        return;
    }

    let leading = raw[..raw.len() - trimmed_start.len()].chars().count();
    let start = chars.start + leading;
    let end = start + trimmed.chars().count();

    segments.push(TextSegment {
        sequence: segments.len(),
        text: trimmed.to_string(),
        char_range: start..end,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence_text(len: usize) -> String {
        let sentence = "The quarterly review covers uptime, incidents and budget. ";
        sentence.chars().cycle().take(len).collect()
    }

    #[test]
    fn test_short_text_single_trimmed_segment() {
        let segments = chunk_text("  short text\n", 1000, 200).unwrap();
        assert_eq!(segments, vec!["short text".to_string()]);
    }

    #[test]
    fn test_text_exactly_window_size_is_single_segment() {
        let text = "a".repeat(50);
        let segments = chunk_text(&text, 50, 10).unwrap();
        assert_eq!(segments, vec![text]);
    }

    #[test]
    fn test_empty_and_whitespace_input() {
        assert!(chunk_text("", 1000, 200).unwrap().is_empty());
        assert!(chunk_text("   \n\t ", 1000, 200).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        assert_eq!(chunk_text("text", 0, 0), Err(ChunkError::ZeroSize));
        assert_eq!(
            chunk_text("text", 100, 100),
            Err(ChunkError::OverlapTooLarge {
                size: 100,
                overlap: 100
            })
        );
        assert!(ChunkParams::new(100, 150).validate().is_err());
        assert!(ChunkParams::new(100, 99).validate().is_ok());
    }

    #[test]
    fn test_long_text_covers_input_with_bounded_overlap() {
        let text = sentence_text(2500);
        let chunker = TextChunker::new(ChunkParams::new(1000, 200)).unwrap();
        let segments = chunker.chunk(&text);
        let chars: Vec<char> = text.chars().collect();

        assert!(segments.len() >= 3);
        assert_eq!(segments[0].char_range.start, 0);

        for segment in &segments {
            assert!(segment.text.chars().count() <= 1000);
            let expected: String = chars[segment.char_range.clone()].iter().collect();
            assert_eq!(segment.text, expected);
        }

        for pair in segments.windows(2) {
            let (prev, next) = (&pair[0].char_range, &pair[1].char_range);
            // No gap between consecutive segments, apart from trimmed whitespace
            let gap: String = chars[prev.end.min(next.start)..next.start].iter().collect();
            assert!(gap.trim().is_empty(), "uncovered text: {gap:?}");
            let shared = prev.end.saturating_sub(next.start);
            assert!(shared <= 200, "segments share {shared} characters");
        }

        let last = segments.last().unwrap();
        let tail: String = chars[last.char_range.end..].iter().collect();
        assert!(tail.trim().is_empty());
    }

    #[test]
    fn test_breaks_after_sentence_terminal() {
        let text = "Server uptime is 99.8%. Budget utilization is 92%. Three incidents were resolved.";
        let chunker = TextChunker::new(ChunkParams::new(50, 10)).unwrap();
        let segments = chunker.chunk(text);

        assert_eq!(
            segments[0].text,
            "Server uptime is 99.8%. Budget utilization is 92%."
        );
        assert!(segments.last().unwrap().text.ends_with("resolved."));
    }

    #[test]
    fn test_raw_boundary_without_terminal() {
        let text = "x".repeat(25);
        let segments = chunk_text(&text, 10, 2).unwrap();
        assert_eq!(segments[0].len(), 10);
        assert_eq!(segments[1].len(), 10);
        assert_eq!(segments.last().unwrap().len(), 9);
    }

    #[test]
    fn test_sequences_are_contiguous_after_dropping_blank_windows() {
        let text = format!("{}{}{}", "a".repeat(10), " ".repeat(30), "b".repeat(10));
        let chunker = TextChunker::new(ChunkParams::new(10, 0)).unwrap();
        let segments = chunker.chunk(&text);

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].sequence, 0);
        assert_eq!(segments[1].sequence, 1);
        assert_eq!(segments[1].text, "b".repeat(10));
    }

    #[test]
    fn test_multibyte_text_is_split_on_characters() {
        let text = "Überprüfung läuft. ".repeat(20);
        let segments = chunk_text(&text, 30, 5).unwrap();
        assert!(segments.len() > 1);
        for segment in &segments {
            assert!(segment.chars().count() <= 30);
        }
    }

    #[test]
    fn test_large_overlap_still_terminates() {
        let text = "Ab. ".repeat(100);
        let segments = chunk_text(&text, 10, 9).unwrap();
        assert!(!segments.is_empty());
        assert!(segments.len() < text.len());
    }
}
