//! Embedding producers
//!
//! The engine treats embedding as an external collaborator behind the
//! [`EmbeddingProvider`] trait. A [`EmbeddingRegistry`] maps model ids to
//! providers so the migration controller can hold the primary and secondary
//! models at the same time.

#[cfg(feature = "embeddings")]
pub mod local;
pub mod remote;

#[cfg(feature = "embeddings")]
pub use local::LocalEmbedder;
pub use remote::RemoteEmbedder;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Embedding error
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    /// Failed to initialize the model
    #[error("model initialization failed: {0}")]
    ModelInit(String),
    /// Failed to generate an embedding
    #[error("embedding generation failed: {0}")]
    Failed(String),
    /// Invalid input (empty, too long)
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// No provider registered for the model id
    #[error("unknown embedding model: {0}")]
    UnknownModel(String),
}

// ============================================================================
// PROVIDER TRAIT
// ============================================================================

/// A pure embedding producer: `embed(text) -> vector`.
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier (stored on each record as `embedding_model`).
    fn model(&self) -> &str;

    /// Declared output dimension.
    fn dimensions(&self) -> usize;

    /// Embed a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed a batch of texts. The default loops over [`embed`].
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Model id -> provider map, shared process-wide.
#[derive(Default)]
pub struct EmbeddingRegistry {
    providers: RwLock<HashMap<String, Arc<dyn EmbeddingProvider>>>,
}

impl EmbeddingRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own model id.
    pub fn register(&self, provider: Arc<dyn EmbeddingProvider>) {
        self.providers
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(provider.model().to_string(), provider);
    }

    /// Look up a provider by model id.
    pub fn get(&self, model: &str) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
        self.providers
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(model)
            .cloned()
            .ok_or_else(|| EmbeddingError::UnknownModel(model.to_string()))
    }

    /// Registered model ids.
    pub fn models(&self) -> Vec<String> {
        self.providers
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .keys()
            .cloned()
            .collect()
    }
}

// ============================================================================
// SIMILARITY
// ============================================================================

/// Compute cosine similarity between two vectors.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot_product = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = (norm_a * norm_b).sqrt();
    if denominator > 0.0 {
        dot_product / denominator
    } else {
        0.0
    }
}

/// L2-normalize a vector in place.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider {
        model: String,
        dims: usize,
    }

    impl EmbeddingProvider for FixedProvider {
        fn model(&self) -> &str {
            &self.model
        }
        fn dimensions(&self) -> usize {
            self.dims
        }
        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![1.0; self.dims])
        }
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_length_mismatch() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 0.0001);
        assert!((v[1] - 0.8).abs() < 0.0001);
    }

    #[test]
    fn test_registry_lookup() {
        let registry = EmbeddingRegistry::new();
        registry.register(Arc::new(FixedProvider {
            model: "m1".into(),
            dims: 4,
        }));

        let provider = registry.get("m1").unwrap();
        assert_eq!(provider.dimensions(), 4);
        assert!(matches!(
            registry.get("m2"),
            Err(EmbeddingError::UnknownModel(_))
        ));

        let mut models = registry.models();
        models.sort();
        assert_eq!(models, vec!["m1".to_string()]);
    }

    #[test]
    fn test_default_batch_uses_embed() {
        let provider = FixedProvider {
            model: "m1".into(),
            dims: 2,
        };
        let out = provider.embed_batch(&["a", "b"]).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], vec![1.0, 1.0]);
    }
}
