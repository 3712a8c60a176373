//! Deterministic, offline embedding provider.

use anyhow::Result;
use async_trait::async_trait;

use super::EmbeddingProvider;

const LCG_MULTIPLIER: u64 = 1_103_515_245;
const LCG_INCREMENT: u64 = 12_345;
const LCG_MODULUS: u64 = 1 << 31;

/// Hash-seeded pseudo-random embeddings.
///
/// The text is normalised (trimmed, lowercased, whitespace collapsed), hashed
/// with a 31-multiplier rolling hash, and the hash seeds a linear
/// congruential generator that produces one value in `[-1, 1]` per
/// dimension. The vector is then L2-normalised.
#[derive(Debug, Clone)]
pub struct MockEmbeddings {
    dimensions: usize,
    model: String,
}

impl MockEmbeddings {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            model: format!("mock-{}", dimensions),
        }
    }

    fn normalize_text(text: &str) -> String {
        text.split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn seed(text: &str) -> u64 {
        let hash = text
            .chars()
            .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(c as i32));
        u64::from(hash.unsigned_abs()) % LCG_MODULUS
    }

    /// Compute the embedding synchronously.
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut state = Self::seed(&Self::normalize_text(text));
        let mut vector: Vec<f32> = (0..self.dimensions)
            .map(|_| {
                state = (state * LCG_MULTIPLIER + LCG_INCREMENT) % LCG_MODULUS;
                ((state as f64 / LCG_MODULUS as f64) * 2.0 - 1.0) as f32
            })
            .collect();

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector_for(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
