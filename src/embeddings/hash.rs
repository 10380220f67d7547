//! Deterministic offline embedder.
//!
//! Derives a normalized pseudo-random vector from a BLAKE3 hash of the
//! text. Equal texts get equal vectors; there is no semantic similarity.
//! Useful for wiring checks and tests without an embedding server.

use async_trait::async_trait;

use super::service::Embedder;
use crate::Result;

/// Hash-seeded embedder.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    #[must_use]
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(hash_embedding(text, self.dimension))
    }
}

/// Create a deterministic, L2-normalized embedding for `text`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn hash_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let digest = blake3::hash(text.as_bytes());
    let mut seed_bytes = [0u8; 8];
    seed_bytes.copy_from_slice(&digest.as_bytes()[..8]);
    let mut seed = u64::from_le_bytes(seed_bytes);

    let mut embedding = Vec::with_capacity(dimension);
    for _ in 0..dimension {
        seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        let value = (((seed >> 33) as f32) / (u32::MAX as f32)).mul_add(2.0, -1.0);
        embedding.push(value);
    }

    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut embedding {
            *v /= norm;
        }
    }

    embedding
}
