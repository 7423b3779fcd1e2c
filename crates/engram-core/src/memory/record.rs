//! Memory record - the atomic unit the engine stores
//!
//! Each record carries:
//! - Typed content (fact, entity, conversation, reflection, code)
//! - Importance in [0, 1], mutated by decay and access
//! - Tier (short-term / long-term / archived) with a restricted transition graph
//! - Embedding metadata for the dual-collection migration invariants

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::content::MemoryContent;

// ============================================================================
// MEMORY TYPES
// ============================================================================

/// Types of memory records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    /// A discrete statement of fact
    #[default]
    Fact,
    /// A named entity with attributes
    Entity,
    /// A conversation excerpt (participant-tagged utterances)
    Conversation,
    /// A higher-level reflection summarizing other memories
    Reflection,
    /// A code snippet with a language tag
    Code,
}

impl MemoryType {
    /// All types, in schema order
    pub const ALL: [MemoryType; 5] = [
        MemoryType::Fact,
        MemoryType::Entity,
        MemoryType::Conversation,
        MemoryType::Reflection,
        MemoryType::Code,
    ];

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Fact => "fact",
            MemoryType::Entity => "entity",
            MemoryType::Conversation => "conversation",
            MemoryType::Reflection => "reflection",
            MemoryType::Code => "code",
        }
    }

    /// Parse from string name; unknown names are rejected
    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "fact" => Some(MemoryType::Fact),
            "entity" => Some(MemoryType::Entity),
            "conversation" => Some(MemoryType::Conversation),
            "reflection" => Some(MemoryType::Reflection),
            "code" => Some(MemoryType::Code),
            _ => None,
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// TIERS
// ============================================================================

/// Coarse storage class determining retention and retrieval priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTier {
    /// Freshly stored or recently accessed
    #[default]
    ShortTerm,
    /// Demoted after decay; still indexed
    LongTerm,
    /// Cold storage; excluded from the lexical index
    Archived,
}

impl MemoryTier {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryTier::ShortTerm => "short_term",
            MemoryTier::LongTerm => "long_term",
            MemoryTier::Archived => "archived",
        }
    }

    /// Parse from string name; unknown names are rejected
    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "short_term" => Some(MemoryTier::ShortTerm),
            "long_term" => Some(MemoryTier::LongTerm),
            "archived" => Some(MemoryTier::Archived),
            _ => None,
        }
    }

    /// Whether moving from `self` to `target` is an allowed transition.
    ///
    /// Demotion walks forward one step (short_term → long_term → archived);
    /// access promotes one step back. `archived → short_term` in one move is
    /// never allowed. A same-tier move is a no-op and always permitted.
    pub fn can_transition_to(&self, target: MemoryTier) -> bool {
        use MemoryTier::*;
        matches!(
            (self, target),
            (ShortTerm, ShortTerm)
                | (LongTerm, LongTerm)
                | (Archived, Archived)
                | (ShortTerm, LongTerm)
                | (LongTerm, Archived)
                | (LongTerm, ShortTerm)
                | (Archived, LongTerm)
        )
    }

    /// The tier one promotion step closer to short_term, if any.
    pub fn promoted(&self) -> Option<MemoryTier> {
        match self {
            MemoryTier::ShortTerm => None,
            MemoryTier::LongTerm => Some(MemoryTier::ShortTerm),
            MemoryTier::Archived => Some(MemoryTier::LongTerm),
        }
    }

    /// The tier one demotion step further from short_term, if any.
    pub fn demoted(&self) -> Option<MemoryTier> {
        match self {
            MemoryTier::ShortTerm => Some(MemoryTier::LongTerm),
            MemoryTier::LongTerm => Some(MemoryTier::Archived),
            MemoryTier::Archived => None,
        }
    }
}

impl std::fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// MEMORY RECORD
// ============================================================================

/// A memory record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    /// Unique identifier (UUID v4), immutable
    pub id: String,
    /// Type of memory; determines the content shape
    pub memory_type: MemoryType,
    /// Typed content
    pub content: MemoryContent,
    /// Importance in [0, 1]; decays over time, reinforced by access
    pub importance: f64,
    /// When the record was created
    pub created_at: DateTime<Utc>,
    /// When the record was last modified
    pub updated_at: DateTime<Utc>,
    /// When the record was last returned by retrieval
    pub last_accessed_at: DateTime<Utc>,
    /// How many times retrieval returned this record
    pub access_count: i64,
    /// Storage tier
    pub tier: MemoryTier,
    /// Reference into the active vector collection (null while an embedding
    /// is pending, e.g. during migration preparation)
    pub embedding_ref: Option<String>,
    /// Identifier of the model that produced the current embedding
    pub embedding_model: Option<String>,
    /// Tag set (kept sorted and deduplicated)
    pub tags: Vec<String>,
    /// Free-form provenance
    pub source: Option<String>,
}

impl Memory {
    /// Create a new record with fresh id and timestamps.
    pub fn new(memory_type: MemoryType, content: MemoryContent, importance: f64) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            memory_type,
            content,
            importance: importance.clamp(0.0, 1.0),
            created_at: now,
            updated_at: now,
            last_accessed_at: now,
            access_count: 0,
            tier: MemoryTier::ShortTerm,
            embedding_ref: None,
            embedding_model: None,
            tags: Vec::new(),
            source: None,
        }
    }

    /// Replace the tag set, normalizing to sorted unique values.
    pub fn set_tags(&mut self, tags: Vec<String>) {
        self.tags = normalize_tags(tags);
    }

    /// Union additional tags into the set.
    pub fn merge_tags(&mut self, tags: &[String]) {
        let mut merged = self.tags.clone();
        merged.extend(tags.iter().cloned());
        self.tags = normalize_tags(merged);
    }

    /// Age of the record in fractional days.
    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created_at).num_milliseconds() as f64 / 86_400_000.0
    }

    /// Days since the record was last accessed.
    pub fn idle_days(&self, now: DateTime<Utc>) -> f64 {
        (now - self.last_accessed_at).num_milliseconds() as f64 / 86_400_000.0
    }

    /// Clamp importance into [0, 1]; call after every mutation.
    pub fn clamp_importance(&mut self) {
        self.importance = self.importance.clamp(0.0, 1.0);
    }
}

/// Sort and deduplicate a tag list.
pub fn normalize_tags(mut tags: Vec<String>) -> Vec<String> {
    tags.retain(|t| !t.trim().is_empty());
    tags.sort();
    tags.dedup();
    tags
}

// ============================================================================
// FILTERS AND INPUTS
// ============================================================================

/// Filter over memory records, shared by `list` and both search paths.
///
/// Empty sets mean "no constraint"; tag matching is any-match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryFilter {
    /// Restrict to these types
    #[serde(default)]
    pub types: Vec<MemoryType>,
    /// Restrict to these tiers
    #[serde(default)]
    pub tiers: Vec<MemoryTier>,
    /// Match any of these tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Created at or after this instant
    pub created_after: Option<DateTime<Utc>>,
    /// Created at or before this instant
    pub created_before: Option<DateTime<Utc>>,
}

impl MemoryFilter {
    /// True when no constraint is set.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
            && self.tiers.is_empty()
            && self.tags.is_empty()
            && self.created_after.is_none()
            && self.created_before.is_none()
    }

    /// Evaluate the filter against record attributes.
    pub fn matches(
        &self,
        memory_type: MemoryType,
        tier: MemoryTier,
        tags: &[String],
        created_at: DateTime<Utc>,
    ) -> bool {
        if !self.types.is_empty() && !self.types.contains(&memory_type) {
            return false;
        }
        if !self.tiers.is_empty() && !self.tiers.contains(&tier) {
            return false;
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| tags.contains(t)) {
            return false;
        }
        if let Some(after) = self.created_after
            && created_at < after
        {
            return false;
        }
        if let Some(before) = self.created_before
            && created_at > before
        {
            return false;
        }
        true
    }
}

/// Input for storing a new memory
///
/// Uses `deny_unknown_fields` so field injection is rejected at the edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StoreInput {
    /// Type of memory; determines the content shape
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    /// Content value, validated against the type's shape
    pub content: serde_json::Value,
    /// Initial importance (default 0.5)
    pub importance: Option<f64>,
    /// Tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Provenance
    pub source: Option<String>,
}

/// Result of a `store` call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreOutcome {
    /// Id of the stored (or merged-into) record
    pub id: String,
    /// True when dedup merged into an existing record
    pub merged: bool,
}

/// Partial update of a memory record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdatePatch {
    /// Replace the content (same type as the record)
    pub content: Option<serde_json::Value>,
    /// Replace the importance
    pub importance: Option<f64>,
    /// Replace the tag set
    pub tags: Option<Vec<String>>,
    /// Replace the provenance
    pub source: Option<String>,
}

impl UpdatePatch {
    /// True when the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.importance.is_none()
            && self.tags.is_none()
            && self.source.is_none()
    }
}

// ============================================================================
// RETRIEVAL RESULTS AND STATS
// ============================================================================

/// A single hybrid-retrieval hit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedMemory {
    /// The matched record
    pub memory: Memory,
    /// Final score after recency/importance re-weighting
    pub score: f64,
    /// Normalized fused score before re-weighting
    pub fused_score: f64,
    /// Vector similarity if the vector source matched
    pub vector_score: Option<f64>,
    /// Lexical score if the lexical source matched
    pub lexical_score: Option<f64>,
}

/// Index sizes reported by `memory_stats`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    /// Vectors in the active collection
    pub vectors: usize,
    /// Rows in the lexical index
    pub lexical_entries: usize,
}

/// Aggregate statistics over the store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    /// Total records
    pub total: i64,
    /// Counts keyed by type name
    pub by_type: BTreeMap<String, i64>,
    /// Counts keyed by tier name
    pub by_tier: BTreeMap<String, i64>,
    /// Index sizes
    pub index: IndexStats,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::content::FactContent;

    fn fact(statement: &str) -> MemoryContent {
        MemoryContent::Fact(FactContent {
            statement: statement.to_string(),
            confidence: None,
        })
    }

    #[test]
    fn test_type_roundtrip() {
        for t in MemoryType::ALL {
            assert_eq!(MemoryType::parse_name(t.as_str()), Some(t));
        }
        assert_eq!(MemoryType::parse_name("concept"), None);
    }

    #[test]
    fn test_tier_transition_graph() {
        use MemoryTier::*;
        assert!(ShortTerm.can_transition_to(LongTerm));
        assert!(LongTerm.can_transition_to(Archived));
        assert!(LongTerm.can_transition_to(ShortTerm));
        assert!(Archived.can_transition_to(LongTerm));
        // One-step rule: archived never jumps straight to short_term
        assert!(!Archived.can_transition_to(ShortTerm));
        assert!(!ShortTerm.can_transition_to(Archived));
    }

    #[test]
    fn test_importance_clamped_on_creation() {
        let m = Memory::new(MemoryType::Fact, fact("x"), 1.7);
        assert_eq!(m.importance, 1.0);
        let m = Memory::new(MemoryType::Fact, fact("x"), -0.3);
        assert_eq!(m.importance, 0.0);
    }

    #[test]
    fn test_tag_normalization() {
        let mut m = Memory::new(MemoryType::Fact, fact("x"), 0.5);
        m.set_tags(vec!["b".into(), "a".into(), "b".into(), "  ".into()]);
        assert_eq!(m.tags, vec!["a".to_string(), "b".to_string()]);

        m.merge_tags(&["c".to_string(), "a".to_string()]);
        assert_eq!(m.tags, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_filter_matches() {
        let now = Utc::now();
        let filter = MemoryFilter {
            types: vec![MemoryType::Fact],
            tags: vec!["geo".into()],
            ..Default::default()
        };
        assert!(filter.matches(
            MemoryType::Fact,
            MemoryTier::ShortTerm,
            &["geo".to_string(), "eu".to_string()],
            now,
        ));
        assert!(!filter.matches(MemoryType::Code, MemoryTier::ShortTerm, &["geo".to_string()], now));
        assert!(!filter.matches(MemoryType::Fact, MemoryTier::ShortTerm, &["eu".to_string()], now));
    }

    #[test]
    fn test_store_input_deny_unknown_fields() {
        let json = r#"{"type": "fact", "content": {"statement": "x"}, "tags": []}"#;
        assert!(serde_json::from_str::<StoreInput>(json).is_ok());

        let json = r#"{"type": "fact", "content": {"statement": "x"}, "extra": 1}"#;
        assert!(serde_json::from_str::<StoreInput>(json).is_err());

        // Unknown enum value is rejected too
        let json = r#"{"type": "concept", "content": {"statement": "x"}}"#;
        assert!(serde_json::from_str::<StoreInput>(json).is_err());
    }
}
