//! Memory module - core types and data structures
//!
//! The record model: typed content, importance, tier, embedding metadata,
//! plus the filter/input/result types shared by the tool surface.

mod content;
mod record;

pub use content::{
    sanitize_text, CodeContent, ContentError, ConversationContent, ConversationMessage,
    ConversationRole, EntityContent, FactContent, MemoryContent, ReflectionContent,
    MAX_TEXT_BYTES,
};
pub use record::{
    normalize_tags, IndexStats, Memory, MemoryFilter, MemoryStats, MemoryTier, MemoryType,
    RetrievedMemory, StoreInput, StoreOutcome, UpdatePatch,
};
