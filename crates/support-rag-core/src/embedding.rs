//! Embedding model trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that all embedding backends implement,
//! an offline [`HashingEmbedder`], and pure helpers for vector
//! serialization and similarity computation.
//!
//! Network and ONNX-backed providers (fastembed, Ollama, OpenAI) live in
//! the `support-rag` app crate.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Trait for embedding models.
///
/// Ticket embeddings and query embeddings must come from the same
/// implementation so that their distances are comparable.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;
    /// Encode `texts` into one vector each, in input order, processing at
    /// most `batch_size` texts per model call.
    async fn embed(&self, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>>;
}

/// Deterministic feature-hashing embedder.
///
/// Lowercases the text, splits it on non-alphanumeric characters, and
/// hashes each token (SHA-256) into one of `dims` buckets with a signed
/// unit weight. The result is L2-normalised, so identical texts have
/// cosine distance `0.0` and texts sharing no tokens are orthogonal.
/// Needs no model download.
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    /// Embed a single text synchronously.
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        let lower = text.to_lowercase();
        for token in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.as_bytes());
            let mut idx_bytes = [0u8; 8];
            idx_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(idx_bytes) % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        l2_normalize(&mut v);
        v
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String], _batch_size: usize) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use support_rag_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors or
/// vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Cosine distance `1 - cos(a, b)`, in `[0.0, 2.0]`; smaller is closer.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert!(cosine_distance(&v, &v).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite_distance_is_two() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_distance(&a, &b) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_mismatched_or_empty() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_hashing_embedder_is_deterministic_and_normalised() {
        let e = HashingEmbedder::new(64);
        let a = e.embed_one("Password reset for my account");
        let b = e.embed_one("password RESET for my account");
        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hashing_embedder_ranks_shared_tokens_closer() {
        let e = HashingEmbedder::new(256);
        let doc = e.embed_one("Password reset\n\nUser cannot log in");
        let related = e.embed_one("I forgot my password");
        let unrelated = e.embed_one("Printer toner replacement schedule");
        assert!(cosine_similarity(&doc, &related) > cosine_similarity(&doc, &unrelated));
    }

    #[test]
    fn test_hashing_embedder_empty_text_is_zero_vector() {
        let e = HashingEmbedder::new(8);
        assert!(e.embed_one("   ").iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn test_hashing_embedder_batch_matches_single() {
        let e = HashingEmbedder::new(32);
        let texts = vec!["alpha beta".to_string(), "gamma".to_string()];
        let out = e.embed(&texts, 1).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1], e.embed_one("gamma"));
    }
}
