//! Error types for text chunking

/// Result type for chunking operations.
pub type Result<T> = std::result::Result<T, ChunkError>;

/// Rejected chunking parameters.
///
/// Both variants are raised before any text is inspected, so callers can
/// validate configuration up front and fail without side effects.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    /// The window size must be at least one character
    #[error("invalid chunk parameters: size must be positive")]
    ZeroSize,

    /// The overlap must be strictly smaller than the window, or the window would never advance
    #[error("invalid chunk parameters: overlap {overlap} must be smaller than size {size}")]
    OverlapTooLarge { size: usize, overlap: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            ChunkError::ZeroSize.to_string(),
            "invalid chunk parameters: size must be positive"
        );
        assert_eq!(
            ChunkError::OverlapTooLarge {
                size: 100,
                overlap: 100
            }
            .to_string(),
            "invalid chunk parameters: overlap 100 must be smaller than size 100"
        );
    }
}
