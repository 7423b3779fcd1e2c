//! Database migrations
//!
//! Schema migration definitions for the record store.

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: memory records + FTS5 lexical index",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Expiry log for archived-tier retention",
        up: MIGRATION_V2_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: records + lexical index
///
/// The FTS table is standalone (not content-synced): the store writes it
/// explicitly so the "index before inline" ordering holds. Readers join
/// lexical hits against `memories`, which drops hits whose record row is not
/// yet (or no longer) present.
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    memory_type TEXT NOT NULL,
    content TEXT NOT NULL,
    importance REAL NOT NULL DEFAULT 0.5,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    last_accessed_at TEXT NOT NULL,
    access_count INTEGER NOT NULL DEFAULT 0,
    tier TEXT NOT NULL DEFAULT 'short_term',
    embedding_ref TEXT,
    embedding_model TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    source TEXT
);

CREATE INDEX IF NOT EXISTS idx_memories_tier ON memories(tier);
CREATE INDEX IF NOT EXISTS idx_memories_type ON memories(memory_type);
CREATE INDEX IF NOT EXISTS idx_memories_created ON memories(created_at);
CREATE INDEX IF NOT EXISTS idx_memories_last_accessed ON memories(last_accessed_at);
CREATE INDEX IF NOT EXISTS idx_memories_importance ON memories(importance);

-- Lexical index over the textual projection of non-archived memories
CREATE VIRTUAL TABLE IF NOT EXISTS memory_fts USING fts5(
    id UNINDEXED,
    text,
    tokenize='porter unicode61'
);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

/// V2: retention expiry log (a memory is never silently lost)
const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS expiry_log (
    id TEXT PRIMARY KEY,
    memory_type TEXT NOT NULL,
    final_importance REAL NOT NULL,
    expired_at TEXT NOT NULL
);

UPDATE schema_version SET version = 2, applied_at = datetime('now');
"#;

/// Get the current schema version (0 when the tracking table is absent).
fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(0);
    }
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, Option<u32>>(0).map(|v| v.unwrap_or(0))
    })
}

/// Apply all pending migrations; returns the number applied.
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                "Applying migration v{}: {}",
                migration.version,
                migration.description
            );
            conn.execute_batch(migration.up)?;
            applied += 1;
        }
    }

    Ok(applied)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_apply_in_order() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let applied = apply_migrations(&conn).unwrap();
        assert_eq!(applied as usize, MIGRATIONS.len());

        // Re-applying is a no-op
        let applied = apply_migrations(&conn).unwrap();
        assert_eq!(applied, 0);
    }

    #[test]
    fn test_versions_are_monotonic() {
        let mut last = 0;
        for m in MIGRATIONS {
            assert!(m.version > last);
            last = m.version;
        }
    }
}
