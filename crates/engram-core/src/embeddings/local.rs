//! Local semantic embeddings
//!
//! Uses fastembed for local ONNX inference with nomic-embed-text-v1.5 and
//! Matryoshka truncation to 256 dimensions (3x storage savings for ~2%
//! quality loss; the first N dims of the 768-dim output ARE the N-dim
//! representation).

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Mutex;

use super::{l2_normalize, EmbeddingError, EmbeddingProvider};

/// Model id exposed by the local provider.
pub const LOCAL_MODEL_ID: &str = "nomic-ai/nomic-embed-text-v1.5";

/// Output dimensions after Matryoshka truncation.
pub const LOCAL_DIMENSIONS: usize = 256;

/// Maximum text length for embedding (truncated if longer).
pub const MAX_TEXT_LENGTH: usize = 8192;

/// Batch size for efficient embedding generation.
const BATCH_SIZE: usize = 32;

/// Get the cache directory for fastembed models.
/// Respects FASTEMBED_CACHE_PATH, then the platform cache directory.
fn cache_dir() -> std::path::PathBuf {
    if let Ok(path) = std::env::var("FASTEMBED_CACHE_PATH") {
        return std::path::PathBuf::from(path);
    }
    if let Some(proj_dirs) = directories::ProjectDirs::from("dev", "engram", "engram") {
        return proj_dirs.cache_dir().join("fastembed");
    }
    std::path::PathBuf::from(".fastembed_cache")
}

/// Truncate to [`LOCAL_DIMENSIONS`] and L2-normalize.
fn matryoshka_truncate(mut vector: Vec<f32>) -> Vec<f32> {
    if vector.len() > LOCAL_DIMENSIONS {
        vector.truncate(LOCAL_DIMENSIONS);
    }
    l2_normalize(&mut vector);
    vector
}

/// Local fastembed-backed embedding provider.
///
/// Construction loads (and on first run downloads) the model, so it belongs
/// in the warming phase, never on the transport path.
pub struct LocalEmbedder {
    model: Mutex<TextEmbedding>,
}

impl LocalEmbedder {
    /// Load the model, downloading it into the cache directory if needed.
    pub fn new() -> Result<Self, EmbeddingError> {
        let cache = cache_dir();
        if let Err(e) = std::fs::create_dir_all(&cache) {
            tracing::warn!("failed to create embedding cache dir {:?}: {}", cache, e);
        }

        let options = InitOptions::new(EmbeddingModel::NomicEmbedTextV15)
            .with_show_download_progress(false)
            .with_cache_dir(cache);

        let model = TextEmbedding::try_new(options).map_err(|e| {
            EmbeddingError::ModelInit(format!(
                "failed to initialize {LOCAL_MODEL_ID}: {e}. \
                 Ensure ONNX runtime is available and model files can be downloaded."
            ))
        })?;

        Ok(Self {
            model: Mutex::new(model),
        })
    }
}

impl EmbeddingProvider for LocalEmbedder {
    fn model(&self) -> &str {
        LOCAL_MODEL_ID
    }

    fn dimensions(&self) -> usize {
        LOCAL_DIMENSIONS
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("text cannot be empty".into()));
        }

        let text = if text.len() > MAX_TEXT_LENGTH {
            // Truncate on a char boundary
            let mut end = MAX_TEXT_LENGTH;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            &text[..end]
        } else {
            text
        };

        let mut model = self
            .model
            .lock()
            .map_err(|_| EmbeddingError::ModelInit("model lock poisoned".into()))?;

        let mut embeddings = model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::Failed(e.to_string()))?;

        if embeddings.is_empty() {
            return Err(EmbeddingError::Failed("no embedding generated".into()));
        }

        Ok(matryoshka_truncate(embeddings.remove(0)))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut model = self
            .model
            .lock()
            .map_err(|_| EmbeddingError::ModelInit("model lock poisoned".into()))?;

        let mut all = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(BATCH_SIZE) {
            let truncated: Vec<&str> = chunk
                .iter()
                .map(|t| {
                    if t.len() > MAX_TEXT_LENGTH {
                        let mut end = MAX_TEXT_LENGTH;
                        while !t.is_char_boundary(end) {
                            end -= 1;
                        }
                        &t[..end]
                    } else {
                        *t
                    }
                })
                .collect();

            let embeddings = model
                .embed(truncated, None)
                .map_err(|e| EmbeddingError::Failed(e.to_string()))?;
            all.extend(embeddings.into_iter().map(matryoshka_truncate));
        }
        Ok(all)
    }
}

// ============================================================================
// TESTS
// ============================================================================
