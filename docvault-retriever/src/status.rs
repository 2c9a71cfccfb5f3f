use crate::config::Backend;
use serde::{Deserialize, Serialize};

/// Store statistics, as reported by the status endpoint and `docvault stats`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Chunks in the index
    pub total_chunks: usize,
    /// Distinct source filenames among the chunks
    pub unique_source_files: usize,
    /// Whether the store holds any content (the backend has been fitted)
    pub is_trained: bool,
    /// Store-wide vector length
    pub dimension: usize,
    pub backend: Backend,
    /// Embedding provider name, for the exact backend
    pub provider: Option<String>,
    /// Total size of the persisted snapshot in bytes
    pub snapshot_bytes: u64,
    /// Source filenames, sorted
    pub source_files: Vec<String>,
}

impl StoreStats {
    pub fn snapshot_megabytes(&self) -> f64 {
        self.snapshot_bytes as f64 / (1024.0 * 1024.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_json_shape() {
        let stats = StoreStats {
            total_chunks: 3,
            unique_source_files: 1,
            is_trained: true,
            dimension: 384,
            backend: Backend::Exact,
            provider: Some("hashing".to_string()),
            snapshot_bytes: 2 * 1024 * 1024,
            source_files: vec!["brief.txt".to_string()],
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["total_chunks"], 3);
        assert_eq!(json["backend"], "exact");
        assert_eq!(json["is_trained"], true);
        assert_eq!(stats.snapshot_megabytes(), 2.0);
    }
}
