//! Remote embedding endpoint client
//!
//! Speaks a minimal HTTP protocol: `POST <url>` with
//! `{"model": "...", "input": ["text", ...]}` and expects
//! `{"embeddings": [[f32, ...], ...]}` back. Any endpoint implementing this
//! shape (a sidecar model server, an inference gateway) can serve as the
//! embedding producer.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{EmbeddingError, EmbeddingProvider};

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// HTTP-backed embedding provider.
pub struct RemoteEmbedder {
    client: reqwest::blocking::Client,
    url: String,
    model: String,
    dimensions: usize,
}

impl RemoteEmbedder {
    /// Create a client for a remote endpoint serving `model` at `dimensions`.
    pub fn new(url: &str, model: &str, dimensions: usize) -> Result<Self, EmbeddingError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| EmbeddingError::ModelInit(e.to_string()))?;
        Ok(Self {
            client,
            url: url.to_string(),
            model: model.to_string(),
            dimensions,
        })
    }

    fn request(&self, input: Vec<&str>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let expected = input.len();
        let response = self
            .client
            .post(&self.url)
            .json(&EmbedRequest {
                model: &self.model,
                input,
            })
            .send()
            .map_err(|e| EmbeddingError::Failed(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(EmbeddingError::Failed(format!(
                "endpoint returned {}",
                response.status()
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .map_err(|e| EmbeddingError::Failed(format!("malformed response: {e}")))?;

        if parsed.embeddings.len() != expected {
            return Err(EmbeddingError::Failed(format!(
                "expected {expected} embeddings, got {}",
                parsed.embeddings.len()
            )));
        }
        for vector in &parsed.embeddings {
            if vector.len() != self.dimensions {
                return Err(EmbeddingError::Failed(format!(
                    "expected {}-dim vectors, got {}",
                    self.dimensions,
                    vector.len()
                )));
            }
        }
        Ok(parsed.embeddings)
    }
}

impl EmbeddingProvider for RemoteEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("text cannot be empty".into()));
        }
        let mut vectors = self.request(vec![text])?;
        Ok(vectors.remove(0))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        self.request(texts.to_vec())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape_serializes() {
        let req = EmbedRequest {
            model: "m1",
            input: vec!["hello"],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "m1");
        assert_eq!(json["input"][0], "hello");
    }

    #[test]
    fn test_response_shape_parses() {
        let json = r#"{"embeddings": [[0.1, 0.2], [0.3, 0.4]]}"#;
        let parsed: EmbedResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.embeddings.len(), 2);
        assert_eq!(parsed.embeddings[0].len(), 2);
    }

    #[test]
    fn test_empty_text_rejected() {
        let embedder = RemoteEmbedder::new("http://localhost:9", "m1", 2).unwrap();
        assert!(matches!(
            embedder.embed(""),
            Err(EmbeddingError::InvalidInput(_))
        ));
    }
}
