// Repository configuration

use std::path::PathBuf;

use crate::constants::{
    DEFAULT_BUDGET_BYTES, DEFAULT_MIN_SAVINGS_PERCENT, DEFAULT_RECENCY_BOOST,
    DEFAULT_SEMANTIC_CANDIDATE_LIMIT, DEFAULT_SEMANTIC_DIMENSIONS, DEFAULT_SEMANTIC_MIN_SCORE,
};

/// Configuration for a [`MediaVault`](crate::repo::MediaVault) instance.
///
/// All knobs have working defaults; only the library root is required.
/// Fields are public so callers adjust them directly after `new`.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Base directory for stored assets, thumbnails and the embedding cache.
    pub library_root: PathBuf,
    /// Total byte ceiling before eviction triggers.
    pub budget_bytes: u64,
    /// Weight of recency vs. tag overlap in ranking, 0..=1.
    pub prefer_recency_boost: f64,
    /// Re-encode images before storage when it saves enough space.
    pub optimize_images: bool,
    /// Minimum size reduction (percent) required to keep optimized output.
    pub optimize_min_savings_percent: f64,
    /// Enable embedding-based fallback search.
    pub semantic_enabled: bool,
    /// Similarity floor for fallback results.
    pub semantic_min_score: f32,
    /// Max candidates considered for fallback scoring.
    pub semantic_candidate_limit: usize,
    /// Embedding vector length.
    pub semantic_dimensions: usize,
}

impl VaultConfig {
    pub fn new(library_root: impl Into<PathBuf>) -> Self {
        Self {
            library_root: library_root.into(),
            budget_bytes: DEFAULT_BUDGET_BYTES,
            prefer_recency_boost: DEFAULT_RECENCY_BOOST,
            optimize_images: false,
            optimize_min_savings_percent: DEFAULT_MIN_SAVINGS_PERCENT,
            semantic_enabled: true,
            semantic_min_score: DEFAULT_SEMANTIC_MIN_SCORE,
            semantic_candidate_limit: DEFAULT_SEMANTIC_CANDIDATE_LIMIT,
            semantic_dimensions: DEFAULT_SEMANTIC_DIMENSIONS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VaultConfig::new("/tmp/lib");
        assert_eq!(config.budget_bytes, DEFAULT_BUDGET_BYTES);
        assert!((config.prefer_recency_boost - DEFAULT_RECENCY_BOOST).abs() < f64::EPSILON);
        assert!(!config.optimize_images);
        assert!(config.semantic_enabled);
        assert_eq!(config.semantic_dimensions, DEFAULT_SEMANTIC_DIMENSIONS);
    }
}
