//! Episodic domain
//!
//! Keeps an in-process buffer of the most recent conversation excerpts so
//! immediate session context never needs an index round-trip, and triggers
//! reflection generation once enough unreflected excerpts accumulate.
//! Reflection failure is non-fatal: the excerpts stay unreflected and the
//! next trigger retries them.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Buffer capacity (most recent conversation excerpts).
pub const BUFFER_CAPACITY: usize = 64;

/// Unreflected excerpts required to enqueue a reflection.
pub const REFLECTION_THRESHOLD: usize = 10;

/// Importance assigned to generated reflections.
pub const REFLECTION_IMPORTANCE: f64 = 0.7;

// ============================================================================
// EXCERPTS
// ============================================================================

/// One buffered conversation excerpt.
#[derive(Debug, Clone)]
pub struct ConversationExcerpt {
    /// Id of the stored conversation memory
    pub id: String,
    /// Its textual projection
    pub text: String,
    /// When it was stored
    pub stored_at: DateTime<Utc>,
    reflected: bool,
}

// ============================================================================
// REFLECTION GENERATOR
// ============================================================================

/// Plug-in that turns a batch of excerpts into a reflection body.
pub trait ReflectionGenerator: Send + Sync {
    /// Summarize the excerpts. An error leaves them unreflected.
    fn reflect(&self, excerpts: &[ConversationExcerpt]) -> Result<String, String>;
}

/// Default generator: extractive summary built from the leading sentence of
/// each excerpt. Deliberately model-free so the engine works stand-alone;
/// hosts can plug in an LLM-backed generator.
pub struct ExtractiveSummarizer {
    /// Cap on the generated body length
    max_len: usize,
}

impl Default for ExtractiveSummarizer {
    fn default() -> Self {
        Self { max_len: 2000 }
    }
}

impl ReflectionGenerator for ExtractiveSummarizer {
    fn reflect(&self, excerpts: &[ConversationExcerpt]) -> Result<String, String> {
        if excerpts.is_empty() {
            return Err("nothing to reflect on".to_string());
        }
        let mut body = String::from("Recent conversation summary:\n");
        for excerpt in excerpts {
            let lead = leading_sentence(&excerpt.text);
            if lead.is_empty() {
                continue;
            }
            body.push_str("- ");
            body.push_str(lead);
            body.push('\n');
            if body.len() >= self.max_len {
                break;
            }
        }
        if body.len() > self.max_len {
            let mut end = self.max_len;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            body.truncate(end);
        }
        Ok(body.trim_end().to_string())
    }
}

/// First sentence (or line) of an excerpt, whichever ends sooner.
fn leading_sentence(text: &str) -> &str {
    let line = text.lines().next().unwrap_or("").trim();
    match line.find(['.', '!', '?']) {
        Some(pos) => &line[..=pos],
        None => line,
    }
}

// ============================================================================
// BUFFER
// ============================================================================

/// A batch of excerpts handed to the reflection generator.
#[derive(Debug, Clone)]
pub struct ReflectionBatch {
    /// Excerpts to summarize, oldest first
    pub excerpts: Vec<ConversationExcerpt>,
}

impl ReflectionBatch {
    /// Ids of the source memories (become the reflection's refs).
    pub fn ids(&self) -> Vec<String> {
        self.excerpts.iter().map(|e| e.id.clone()).collect()
    }
}

/// Bounded buffer of recent conversation excerpts.
pub struct ConversationBuffer {
    inner: Mutex<VecDeque<ConversationExcerpt>>,
    capacity: usize,
}

impl Default for ConversationBuffer {
    fn default() -> Self {
        Self::new(BUFFER_CAPACITY)
    }
}

impl ConversationBuffer {
    /// Create a buffer holding at most `capacity` excerpts.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<ConversationExcerpt>> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Append a freshly stored conversation excerpt. Returns a batch when the
    /// unreflected count reached the threshold.
    pub fn push(&self, id: &str, text: &str) -> Option<ReflectionBatch> {
        let mut buffer = self.lock();
        while buffer.len() >= self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(ConversationExcerpt {
            id: id.to_string(),
            text: text.to_string(),
            stored_at: Utc::now(),
            reflected: false,
        });

        let unreflected: Vec<ConversationExcerpt> = buffer
            .iter()
            .filter(|e| !e.reflected)
            .cloned()
            .collect();
        if unreflected.len() >= REFLECTION_THRESHOLD {
            Some(ReflectionBatch {
                excerpts: unreflected,
            })
        } else {
            None
        }
    }

    /// Mark a batch as reflected after its reflection stored successfully.
    pub fn mark_reflected(&self, ids: &[String]) {
        let mut buffer = self.lock();
        for excerpt in buffer.iter_mut() {
            if ids.contains(&excerpt.id) {
                excerpt.reflected = true;
            }
        }
    }

    /// Most recent excerpts, newest first (session context without an index
    /// round-trip).
    pub fn recent(&self, limit: usize) -> Vec<ConversationExcerpt> {
        let buffer = self.lock();
        buffer.iter().rev().take(limit).cloned().collect()
    }

    /// Drop a deleted memory's excerpt from the buffer.
    pub fn forget(&self, id: &str) {
        self.lock().retain(|e| e.id != id);
    }

    /// Current unreflected count.
    pub fn unreflected_count(&self) -> usize {
        self.lock().iter().filter(|e| !e.reflected).count()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(buffer: &ConversationBuffer, count: usize) -> Option<ReflectionBatch> {
        let mut last = None;
        for i in 0..count {
            last = buffer.push(&format!("conv-{i}"), &format!("user: message {i}"));
        }
        last
    }

    #[test]
    fn test_threshold_triggers_batch() {
        let buffer = ConversationBuffer::default();
        assert!(fill(&buffer, REFLECTION_THRESHOLD - 1).is_none());
        let batch = buffer.push("conv-final", "user: the last straw").unwrap();
        assert_eq!(batch.excerpts.len(), REFLECTION_THRESHOLD);
    }

    #[test]
    fn test_failed_reflection_retries_next_push() {
        let buffer = ConversationBuffer::default();
        let batch = fill(&buffer, REFLECTION_THRESHOLD).unwrap();
        // Generation failed: nothing marked. The next push re-offers everything.
        drop(batch);
        let retry = buffer.push("conv-extra", "user: again").unwrap();
        assert_eq!(retry.excerpts.len(), REFLECTION_THRESHOLD + 1);
    }

    #[test]
    fn test_marked_batch_resets_counter() {
        let buffer = ConversationBuffer::default();
        let batch = fill(&buffer, REFLECTION_THRESHOLD).unwrap();
        buffer.mark_reflected(&batch.ids());
        assert_eq!(buffer.unreflected_count(), 0);
        assert!(fill(&buffer, REFLECTION_THRESHOLD - 1).is_none());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let buffer = ConversationBuffer::new(4);
        fill(&buffer, 6);
        let recent = buffer.recent(10);
        assert_eq!(recent.len(), 4);
        assert_eq!(recent[0].id, "conv-5");
        assert_eq!(recent[3].id, "conv-2");
    }

    #[test]
    fn test_forget_removes_excerpt() {
        let buffer = ConversationBuffer::default();
        fill(&buffer, 3);
        buffer.forget("conv-1");
        assert!(buffer.recent(10).iter().all(|e| e.id != "conv-1"));
    }

    #[test]
    fn test_extractive_summarizer() {
        let excerpts = vec![
            ConversationExcerpt {
                id: "a".into(),
                text: "user: I moved to Lyon last month. It is lovely.".into(),
                stored_at: Utc::now(),
                reflected: false,
            },
            ConversationExcerpt {
                id: "b".into(),
                text: "assistant: Noted!".into(),
                stored_at: Utc::now(),
                reflected: false,
            },
        ];
        let body = ExtractiveSummarizer::default().reflect(&excerpts).unwrap();
        assert!(body.contains("Lyon"));
        assert!(!body.contains("lovely"));
    }

    #[test]
    fn test_summarizer_rejects_empty_batch() {
        assert!(ExtractiveSummarizer::default().reflect(&[]).is_err());
    }
}
