//! Deterministic mock collaborators

use engram_core::{EmbeddingError, EmbeddingProvider};

/// Token-hash embedding provider.
///
/// Each whitespace token contributes to one dimension chosen by an FNV-1a
/// hash, so texts sharing words produce nearby vectors. Deterministic across
/// runs and platforms; useless for real semantics, ideal for tests.
pub struct TokenHashEmbedder {
    model: String,
    dims: usize,
}

impl TokenHashEmbedder {
    pub fn new(model: &str, dims: usize) -> Self {
        Self {
            model: model.to_string(),
            dims,
        }
    }
}

impl EmbeddingProvider for TokenHashEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("empty text".into()));
        }
        let mut v = vec![0.0_f32; self.dims];
        for token in text.to_lowercase().split_whitespace() {
            let mut h: u64 = 1469598103934665603;
            for b in token.bytes() {
                h ^= b as u64;
                h = h.wrapping_mul(1099511628211);
            }
            v[(h as usize) % self.dims] += 1.0;
        }
        engram_core::embeddings::l2_normalize(&mut v);
        Ok(v)
    }
}

/// A provider that always fails, for warming/error-path tests.
pub struct FailingEmbedder {
    model: String,
}

impl FailingEmbedder {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
        }
    }
}

impl EmbeddingProvider for FailingEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        8
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Failed("mock outage".into()))
    }
}
