//! Persistence domain
//!
//! Durable storage of memories and both indexes:
//! - SQLite record store with the FTS5 lexical index (WAL, reader/writer split)
//! - Vector collections behind the [`VectorBackend`] trait
//! - Access side-effect batcher and per-id lock stripes

mod batcher;
mod locks;
mod migrations;
mod store;
mod vector;

pub use batcher::AccessBatcher;
pub use locks::{LockStripes, DEFAULT_STRIPES};
pub use migrations::{apply_migrations, Migration, MIGRATIONS};
pub use store::{sanitize_fts5_query, ts_to_sql, AccessUpdate, MemoryStore};
pub use vector::{
    HnswBackend, VectorBackend, VectorError, VectorHit, VectorPayload, DEFAULT_CONNECTIVITY,
    DEFAULT_EXPANSION_ADD, DEFAULT_EXPANSION_SEARCH,
};
