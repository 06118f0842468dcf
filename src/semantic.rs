// Semantic indexer - fixed-length tag embeddings
//
// Signed feature hashing over tag tokens and their character trigrams,
// L2-normalized. Tokens anchor exact-word similarity; trigrams let close
// word forms ("sunset" / "sunsets") land in overlapping buckets. Purely
// lexical, no model downloads; used only as a fallback ranking signal.
//
// Buckets derive from SHA-256 of the feature text. Embeddings outlive the
// process in the metadata store and the on-disk cache, so the feature hash
// must stay identical across platforms and toolchain upgrades.

use sha2::{Digest, Sha256};

const TOKEN_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct SemanticIndexer {
    dims: usize,
}

impl SemanticIndexer {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Derive an embedding from a normalized tag list. Empty input yields
    /// the zero vector.
    pub fn embed(&self, tags: &[String]) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];

        for tag in tags {
            for token in tag.split_whitespace() {
                self.accumulate(&mut vector, token, TOKEN_WEIGHT);
                for trigram in trigrams(token) {
                    self.accumulate(&mut vector, &trigram, TRIGRAM_WEIGHT);
                }
            }
        }

        l2_normalize(&mut vector);
        vector
    }

    fn accumulate(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let h = feature_hash(feature);
        let bucket = (h % self.dims as u64) as usize;
        // One spare bit decides the sign so collisions partially cancel
        let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

fn feature_hash(feature: &str) -> u64 {
    let digest = Sha256::digest(feature.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(head)
}

fn trigrams(token: &str) -> Vec<String> {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() < 3 {
        return Vec::new();
    }
    chars.windows(3).map(|w| w.iter().collect()).collect()
}

fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Cosine similarity between two vectors. Mismatched lengths or zero
/// vectors score 0.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_embedding_is_deterministic_and_sized() {
        let indexer = SemanticIndexer::new(64);
        let a = indexer.embed(&tags(&["sunset", "beach"]));
        let b = indexer.embed(&tags(&["sunset", "beach"]));
        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
    }

    #[test]
    fn test_identical_tags_score_one() {
        let indexer = SemanticIndexer::new(128);
        let a = indexer.embed(&tags(&["golden", "retriever"]));
        let b = indexer.embed(&tags(&["golden", "retriever"]));
        assert!((cosine(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_close_word_forms_beat_unrelated_words() {
        let indexer = SemanticIndexer::new(256);
        let base = indexer.embed(&tags(&["sunset"]));
        let close = indexer.embed(&tags(&["sunsets"]));
        let unrelated = indexer.embed(&tags(&["spreadsheet"]));

        let close_score = cosine(&base, &close);
        let unrelated_score = cosine(&base, &unrelated);
        assert!(
            close_score > unrelated_score,
            "'sunsets' ({close_score}) should score above 'spreadsheet' ({unrelated_score})"
        );
        assert!(close_score > 0.3);
    }

    #[test]
    fn test_embedding_is_pinned_to_its_persisted_form() {
        // Embeddings are persisted; this vector must never change across
        // platforms or toolchain upgrades. Features for "sunset": the token
        // itself plus trigrams sun/uns/nse/set, bucketed by SHA-256.
        let indexer = SemanticIndexer::new(8);
        let v = indexer.embed(&tags(&["sunset"]));
        let expected = [
            -0.8164966f32,
            0.0,
            0.0,
            -0.4082483,
            0.0,
            0.0,
            0.4082483,
            0.0,
        ];
        for (got, want) in v.iter().zip(expected.iter()) {
            assert!(
                (got - want).abs() < 1e-5,
                "embedding drifted: got {:?}, want {:?}",
                v,
                expected
            );
        }
    }

    #[test]
    fn test_empty_tags_yield_zero_vector() {
        let indexer = SemanticIndexer::new(32);
        let v = indexer.embed(&[]);
        assert!(v.iter().all(|&x| x == 0.0));
        assert_eq!(cosine(&v, &v), 0.0);
    }

    #[test]
    fn test_cosine_length_mismatch_is_zero() {
        assert_eq!(cosine(&[1.0, 0.0], &[1.0]), 0.0);
    }
}
