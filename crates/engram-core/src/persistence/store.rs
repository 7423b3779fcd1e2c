//! SQLite record store
//!
//! Durable storage for memory records plus the FTS5 lexical index. Uses
//! separate reader/writer connections behind mutexes so all methods take
//! `&self` and the store can live in an `Arc` without an outer lock.
//!
//! Write ordering contract: callers write index entries (vector + lexical)
//! before the record row, and on delete remove the record row before sweeping
//! index entries. Lexical reads join against `memories`, so a hit whose
//! record is missing is dropped instead of dangling.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use crate::error::{EngineError, Result};
use crate::memory::{Memory, MemoryContent, MemoryFilter, MemoryTier, MemoryType};

// ============================================================================
// TIMESTAMP ENCODING
// ============================================================================

/// Encode a timestamp in fixed-width RFC 3339 with millisecond precision so
/// that lexicographic comparison in SQL matches chronological order.
pub fn ts_to_sql(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn ts_from_sql(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| EngineError::Internal(format!("corrupt timestamp '{raw}': {e}")))
}

// ============================================================================
// ACCESS UPDATES
// ============================================================================

/// One access side-effect, applied in receipt order by the batcher.
#[derive(Debug, Clone)]
pub struct AccessUpdate {
    /// Accessed memory id
    pub id: String,
    /// When the retrieval returned it
    pub at: DateTime<Utc>,
}

// ============================================================================
// STORE
// ============================================================================

/// SQLite-backed record store
pub struct MemoryStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl MemoryStore {
    /// Apply performance PRAGMAs to a connection.
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open (or create) the store at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let writer_conn = Connection::open(db_path)?;
        Self::configure_connection(&writer_conn)?;
        super::migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(db_path)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
        })
    }

    fn writer(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| EngineError::Internal("writer lock poisoned".into()))
    }

    fn reader(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| EngineError::Internal("reader lock poisoned".into()))
    }

    // ========================================================================
    // LEXICAL INDEX
    // ========================================================================

    /// Insert (or replace) the lexical entry for a memory.
    pub fn insert_lexical(&self, id: &str, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let conn = self.writer()?;
        conn.execute("DELETE FROM memory_fts WHERE id = ?1", params![id])?;
        conn.execute(
            "INSERT INTO memory_fts (id, text) VALUES (?1, ?2)",
            params![id, text],
        )?;
        Ok(())
    }

    /// Remove the lexical entry for a memory.
    pub fn delete_lexical(&self, id: &str) -> Result<()> {
        self.writer()?
            .execute("DELETE FROM memory_fts WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Number of entries in the lexical index.
    pub fn lexical_count(&self) -> Result<usize> {
        let count: i64 =
            self.reader()?
                .query_row("SELECT COUNT(*) FROM memory_fts", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// BM25 search over the lexical index, joined against live records so a
    /// hit on a deleted memory never surfaces. Returns (id, score) with
    /// higher scores better.
    pub fn lexical_search(
        &self,
        query: &str,
        k: usize,
        filter: &MemoryFilter,
    ) -> Result<Vec<(String, f64)>> {
        let match_expr = sanitize_fts5_query(query);
        if match_expr.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut sql = String::from(
            "SELECT memory_fts.id, -bm25(memory_fts) AS score
             FROM memory_fts
             JOIN memories m ON m.id = memory_fts.id
             WHERE memory_fts MATCH ?1 AND m.tier != 'archived'",
        );
        let mut params_vec: Vec<SqlValue> = vec![SqlValue::Text(match_expr)];
        push_filter_sql(filter, "m", &mut sql, &mut params_vec);
        sql.push_str(" ORDER BY bm25(memory_fts) LIMIT ");
        sql.push_str(&k.to_string());

        let conn = self.reader()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params_vec), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ========================================================================
    // RECORD OPERATIONS
    // ========================================================================

    /// Insert a new record row. The caller has already written index entries.
    pub fn insert_record(&self, m: &Memory) -> Result<()> {
        self.writer()?.execute(
            "INSERT OR REPLACE INTO memories
             (id, memory_type, content, importance, created_at, updated_at,
              last_accessed_at, access_count, tier, embedding_ref, embedding_model,
              tags, source)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                m.id,
                m.memory_type.as_str(),
                m.content.to_value().to_string(),
                m.importance,
                ts_to_sql(m.created_at),
                ts_to_sql(m.updated_at),
                ts_to_sql(m.last_accessed_at),
                m.access_count,
                m.tier.as_str(),
                m.embedding_ref,
                m.embedding_model,
                serde_json::to_string(&m.tags).unwrap_or_else(|_| "[]".into()),
                m.source,
            ],
        )?;
        Ok(())
    }

    /// Replace an existing record row in full.
    pub fn replace_record(&self, m: &Memory) -> Result<()> {
        let changed = self.writer()?.execute(
            "UPDATE memories SET
                memory_type = ?2, content = ?3, importance = ?4, updated_at = ?5,
                last_accessed_at = ?6, access_count = ?7, tier = ?8,
                embedding_ref = ?9, embedding_model = ?10, tags = ?11, source = ?12
             WHERE id = ?1",
            params![
                m.id,
                m.memory_type.as_str(),
                m.content.to_value().to_string(),
                m.importance,
                ts_to_sql(m.updated_at),
                ts_to_sql(m.last_accessed_at),
                m.access_count,
                m.tier.as_str(),
                m.embedding_ref,
                m.embedding_model,
                serde_json::to_string(&m.tags).unwrap_or_else(|_| "[]".into()),
                m.source,
            ],
        )?;
        if changed == 0 {
            return Err(EngineError::NotFound(m.id.clone()));
        }
        Ok(())
    }

    /// Fetch a record by id.
    pub fn get(&self, id: &str) -> Result<Option<Memory>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(&format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1"))?;
        let row = stmt
            .query_row(params![id], row_to_raw)
            .optional()?;
        row.map(raw_to_memory).transpose()
    }

    /// Delete a record row. Returns false when the id was absent.
    /// Index entries are swept by the caller afterwards.
    pub fn delete_record(&self, id: &str) -> Result<bool> {
        let changed = self
            .writer()?
            .execute("DELETE FROM memories WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// List records matching the filter, newest first, with the total count.
    pub fn list(
        &self,
        filter: &MemoryFilter,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Memory>, i64)> {
        let mut where_sql = String::from(" WHERE 1=1");
        let mut params_vec: Vec<SqlValue> = Vec::new();
        push_filter_sql(filter, "memories", &mut where_sql, &mut params_vec);

        let conn = self.reader()?;
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM memories{where_sql}"),
            rusqlite::params_from_iter(params_vec.clone()),
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT {MEMORY_COLUMNS} FROM memories{where_sql}
             ORDER BY created_at DESC LIMIT {limit} OFFSET {offset}"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params_vec), row_to_raw)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let memories = rows.into_iter().map(raw_to_memory).collect::<Result<Vec<_>>>()?;
        Ok((memories, total))
    }

    /// All records in one tier.
    pub fn scan_tier(&self, tier: MemoryTier) -> Result<Vec<Memory>> {
        let conn = self.reader()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE tier = ?1"))?;
        let rows = stmt
            .query_map(params![tier.as_str()], row_to_raw)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(raw_to_memory).collect()
    }

    /// All non-archived records (the temporal cycle's working set).
    pub fn scan_non_archived(&self) -> Result<Vec<Memory>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MEMORY_COLUMNS} FROM memories WHERE tier != 'archived'"
        ))?;
        let rows = stmt
            .query_map([], row_to_raw)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(raw_to_memory).collect()
    }

    /// Ids of records whose current embedding was produced by `model`.
    pub fn ids_embedded_with(&self, model: &str) -> Result<Vec<String>> {
        let conn = self.reader()?;
        let mut stmt =
            conn.prepare("SELECT id FROM memories WHERE embedding_model = ?1 ORDER BY created_at")?;
        let rows = stmt
            .query_map(params![model], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Count of records carrying a non-null embedding reference.
    pub fn count_with_embedding(&self) -> Result<i64> {
        let count: i64 = self.reader()?.query_row(
            "SELECT COUNT(*) FROM memories WHERE embedding_ref IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Overwrite importance (the decay path's only write).
    pub fn set_importance(&self, id: &str, importance: f64) -> Result<()> {
        self.writer()?.execute(
            "UPDATE memories SET importance = ?2 WHERE id = ?1",
            params![id, importance.clamp(0.0, 1.0)],
        )?;
        Ok(())
    }

    /// Rewrite every record's embedding model marker (migration CLEANUP).
    pub fn reassign_embedding_model(&self, from: &str, to: &str) -> Result<usize> {
        let changed = self.writer()?.execute(
            "UPDATE memories SET embedding_model = ?2 WHERE embedding_model = ?1",
            params![from, to],
        )?;
        Ok(changed)
    }

    /// Update only the embedding metadata of a record.
    pub fn set_embedding(
        &self,
        id: &str,
        embedding_ref: Option<&str>,
        embedding_model: Option<&str>,
    ) -> Result<()> {
        let changed = self.writer()?.execute(
            "UPDATE memories SET embedding_ref = ?2, embedding_model = ?3 WHERE id = ?1",
            params![id, embedding_ref, embedding_model],
        )?;
        if changed == 0 {
            return Err(EngineError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Move a record to another tier, enforcing the transition graph and
    /// keeping the lexical index consistent with the non-archived invariant.
    pub fn move_tier(&self, id: &str, new_tier: MemoryTier) -> Result<()> {
        let memory = self
            .get(id)?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        if memory.tier == new_tier {
            return Ok(());
        }
        if !memory.tier.can_transition_to(new_tier) {
            return Err(EngineError::InvalidTransition {
                from: memory.tier.as_str().to_string(),
                to: new_tier.as_str().to_string(),
            });
        }

        self.writer()?.execute(
            "UPDATE memories SET tier = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, new_tier.as_str(), ts_to_sql(Utc::now())],
        )?;

        // Archived memories leave the lexical index; resurfacing re-enters it.
        if new_tier == MemoryTier::Archived {
            self.delete_lexical(id)?;
        } else if memory.tier == MemoryTier::Archived {
            let text = crate::semantic::project(&memory.content);
            self.insert_lexical(id, &text)?;
        }
        Ok(())
    }

    /// Apply a batch of access side-effects in receipt order.
    pub fn apply_access_updates(&self, updates: &[AccessUpdate], alpha: f64) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let mut conn = self.writer()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE memories SET
                    access_count = access_count + 1,
                    last_accessed_at = max(last_accessed_at, ?2),
                    importance = min(1.0, importance + ?3 * (1.0 - importance))
                 WHERE id = ?1",
            )?;
            for update in updates {
                stmt.execute(params![update.id, ts_to_sql(update.at), alpha])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Record a retention expiry so the loss is never silent.
    pub fn log_expiry(&self, id: &str, memory_type: MemoryType, final_importance: f64) -> Result<()> {
        self.writer()?.execute(
            "INSERT OR REPLACE INTO expiry_log (id, memory_type, final_importance, expired_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, memory_type.as_str(), final_importance, ts_to_sql(Utc::now())],
        )?;
        Ok(())
    }

    /// Counts by type and tier, plus the total.
    pub fn counts(&self) -> Result<(i64, BTreeMap<String, i64>, BTreeMap<String, i64>)> {
        let conn = self.reader()?;
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;

        let mut by_type = BTreeMap::new();
        let mut stmt = conn.prepare("SELECT memory_type, COUNT(*) FROM memories GROUP BY memory_type")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (k, v) = row?;
            by_type.insert(k, v);
        }

        let mut by_tier = BTreeMap::new();
        let mut stmt = conn.prepare("SELECT tier, COUNT(*) FROM memories GROUP BY tier")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (k, v) = row?;
            by_tier.insert(k, v);
        }

        Ok((total, by_type, by_tier))
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

const MEMORY_COLUMNS: &str = "id, memory_type, content, importance, created_at, updated_at, \
     last_accessed_at, access_count, tier, embedding_ref, embedding_model, tags, source";

/// Raw row tuple, converted outside rusqlite's error type.
type RawRow = (
    String,         // id
    String,         // memory_type
    String,         // content json
    f64,            // importance
    String,         // created_at
    String,         // updated_at
    String,         // last_accessed_at
    i64,            // access_count
    String,         // tier
    Option<String>, // embedding_ref
    Option<String>, // embedding_model
    String,         // tags json
    Option<String>, // source
);

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
    ))
}

fn raw_to_memory(raw: RawRow) -> Result<Memory> {
    let (
        id,
        type_name,
        content_json,
        importance,
        created_at,
        updated_at,
        last_accessed_at,
        access_count,
        tier_name,
        embedding_ref,
        embedding_model,
        tags_json,
        source,
    ) = raw;

    let memory_type = MemoryType::parse_name(&type_name)
        .ok_or_else(|| EngineError::Internal(format!("corrupt memory_type '{type_name}'")))?;
    let tier = MemoryTier::parse_name(&tier_name)
        .ok_or_else(|| EngineError::Internal(format!("corrupt tier '{tier_name}'")))?;
    let content: MemoryContent = serde_json::from_str(&content_json)
        .map_err(|e| EngineError::Internal(format!("corrupt content for {id}: {e}")))?;
    if content.kind() != memory_type {
        return Err(EngineError::Internal(format!(
            "content/type mismatch for {id}: column says {memory_type}, content is {}",
            content.kind()
        )));
    }
    let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();

    Ok(Memory {
        id,
        memory_type,
        content,
        importance,
        created_at: ts_from_sql(&created_at)?,
        updated_at: ts_from_sql(&updated_at)?,
        last_accessed_at: ts_from_sql(&last_accessed_at)?,
        access_count,
        tier,
        embedding_ref,
        embedding_model,
        tags,
        source,
    })
}

// ============================================================================
// FILTER SQL
// ============================================================================

/// Append WHERE clauses (AND-joined) for a record filter on table `alias`.
fn push_filter_sql(
    filter: &MemoryFilter,
    alias: &str,
    sql: &mut String,
    params_vec: &mut Vec<SqlValue>,
) {
    if !filter.types.is_empty() {
        let placeholders = placeholders(params_vec.len(), filter.types.len());
        sql.push_str(&format!(" AND {alias}.memory_type IN ({placeholders})"));
        for t in &filter.types {
            params_vec.push(SqlValue::Text(t.as_str().to_string()));
        }
    }
    if !filter.tiers.is_empty() {
        let placeholders = placeholders(params_vec.len(), filter.tiers.len());
        sql.push_str(&format!(" AND {alias}.tier IN ({placeholders})"));
        for t in &filter.tiers {
            params_vec.push(SqlValue::Text(t.as_str().to_string()));
        }
    }
    if !filter.tags.is_empty() {
        let placeholders = placeholders(params_vec.len(), filter.tags.len());
        sql.push_str(&format!(
            " AND EXISTS (SELECT 1 FROM json_each({alias}.tags) WHERE json_each.value IN ({placeholders}))"
        ));
        for t in &filter.tags {
            params_vec.push(SqlValue::Text(t.clone()));
        }
    }
    if let Some(after) = filter.created_after {
        params_vec.push(SqlValue::Text(ts_to_sql(after)));
        sql.push_str(&format!(" AND {alias}.created_at >= ?{}", params_vec.len()));
    }
    if let Some(before) = filter.created_before {
        params_vec.push(SqlValue::Text(ts_to_sql(before)));
        sql.push_str(&format!(" AND {alias}.created_at <= ?{}", params_vec.len()));
    }
}

/// `?n, ?n+1, ...` placeholder list starting after `offset` bound params.
fn placeholders(offset: usize, count: usize) -> String {
    (offset + 1..=offset + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Quote every whitespace-separated token so user input cannot inject FTS5
/// query syntax (NEAR, AND, column filters, ...).
pub fn sanitize_fts5_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|token| token.replace('"', ""))
        .filter(|token| !token.is_empty())
        .map(|token| format!("\"{token}\""))
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::FactContent;
    use tempfile::TempDir;

    fn test_store() -> (MemoryStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::open(&dir.path().join("test.db")).unwrap();
        (store, dir)
    }

    fn fact_memory(statement: &str) -> Memory {
        Memory::new(
            MemoryType::Fact,
            MemoryContent::Fact(FactContent {
                statement: statement.to_string(),
                confidence: None,
            }),
            0.5,
        )
    }

    #[test]
    fn test_insert_and_get_roundtrip() {
        let (store, _dir) = test_store();
        let mut m = fact_memory("Paris is the capital of France");
        m.set_tags(vec!["geo".into()]);
        store.insert_record(&m).unwrap();

        let fetched = store.get(&m.id).unwrap().unwrap();
        assert_eq!(fetched.id, m.id);
        assert_eq!(fetched.memory_type, MemoryType::Fact);
        assert_eq!(fetched.tags, vec!["geo".to_string()]);
        assert_eq!(fetched.tier, MemoryTier::ShortTerm);
        assert_eq!(fetched.content, m.content);
    }

    #[test]
    fn test_get_missing_returns_none() {
        let (store, _dir) = test_store();
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn test_delete_record_is_idempotent() {
        let (store, _dir) = test_store();
        let m = fact_memory("x");
        store.insert_record(&m).unwrap();
        assert!(store.delete_record(&m.id).unwrap());
        assert!(!store.delete_record(&m.id).unwrap());
    }

    #[test]
    fn test_lexical_search_joins_live_records() {
        let (store, _dir) = test_store();
        let m = fact_memory("Paris is the capital of France");
        store.insert_lexical(&m.id, "Paris is the capital of France").unwrap();

        // Index entry exists but the record row does not yet: no hit surfaces.
        let hits = store
            .lexical_search("capital France", 10, &MemoryFilter::default())
            .unwrap();
        assert!(hits.is_empty());

        store.insert_record(&m).unwrap();
        let hits = store
            .lexical_search("capital France", 10, &MemoryFilter::default())
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, m.id);
        assert!(hits[0].1 > 0.0);
    }

    #[test]
    fn test_lexical_search_respects_type_filter() {
        let (store, _dir) = test_store();
        let m = fact_memory("rust ownership rules");
        store.insert_lexical(&m.id, "rust ownership rules").unwrap();
        store.insert_record(&m).unwrap();

        let filter = MemoryFilter {
            types: vec![MemoryType::Code],
            ..Default::default()
        };
        assert!(store.lexical_search("ownership", 10, &filter).unwrap().is_empty());

        let filter = MemoryFilter {
            types: vec![MemoryType::Fact],
            ..Default::default()
        };
        assert_eq!(store.lexical_search("ownership", 10, &filter).unwrap().len(), 1);
    }

    #[test]
    fn test_move_tier_enforces_graph() {
        let (store, _dir) = test_store();
        let m = fact_memory("x");
        store.insert_lexical(&m.id, "x marks the spot").unwrap();
        store.insert_record(&m).unwrap();

        // short_term -> archived skips a step
        let err = store.move_tier(&m.id, MemoryTier::Archived);
        assert!(matches!(err, Err(EngineError::InvalidTransition { .. })));

        store.move_tier(&m.id, MemoryTier::LongTerm).unwrap();
        store.move_tier(&m.id, MemoryTier::Archived).unwrap();
        assert_eq!(store.get(&m.id).unwrap().unwrap().tier, MemoryTier::Archived);

        // Archived memories leave the lexical index
        assert_eq!(store.lexical_count().unwrap(), 0);

        // Resurfacing re-enters it
        store.move_tier(&m.id, MemoryTier::LongTerm).unwrap();
        assert_eq!(store.lexical_count().unwrap(), 1);
    }

    #[test]
    fn test_move_tier_same_tier_is_noop() {
        let (store, _dir) = test_store();
        let m = fact_memory("x");
        store.insert_record(&m).unwrap();
        store.move_tier(&m.id, MemoryTier::ShortTerm).unwrap();
    }

    #[test]
    fn test_access_updates_monotonic_and_clamped() {
        let (store, _dir) = test_store();
        let m = fact_memory("x");
        store.insert_record(&m).unwrap();

        let updates: Vec<AccessUpdate> = (0..3)
            .map(|_| AccessUpdate { id: m.id.clone(), at: Utc::now() })
            .collect();
        store.apply_access_updates(&updates, 0.02).unwrap();

        let fetched = store.get(&m.id).unwrap().unwrap();
        assert_eq!(fetched.access_count, 3);
        assert!(fetched.importance > 0.5);
        assert!(fetched.importance <= 1.0);
        assert!(fetched.last_accessed_at >= m.last_accessed_at);
    }

    #[test]
    fn test_list_filter_and_pagination() {
        let (store, _dir) = test_store();
        for i in 0..5 {
            let mut m = fact_memory(&format!("fact {i}"));
            m.set_tags(vec!["batch".into()]);
            store.insert_record(&m).unwrap();
        }

        let filter = MemoryFilter {
            tags: vec!["batch".into()],
            ..Default::default()
        };
        let (page, total) = store.list(&filter, 2, 0).unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);

        let (rest, _) = store.list(&filter, 10, 4).unwrap();
        assert_eq!(rest.len(), 1);
    }

    #[test]
    fn test_counts() {
        let (store, _dir) = test_store();
        store.insert_record(&fact_memory("a")).unwrap();
        store.insert_record(&fact_memory("b")).unwrap();

        let (total, by_type, by_tier) = store.counts().unwrap();
        assert_eq!(total, 2);
        assert_eq!(by_type.get("fact"), Some(&2));
        assert_eq!(by_tier.get("short_term"), Some(&2));
    }

    #[test]
    fn test_sanitize_fts5_query() {
        assert_eq!(
            sanitize_fts5_query("capital of France"),
            "\"capital\" \"of\" \"France\""
        );
        assert_eq!(sanitize_fts5_query("a NEAR(b)"), "\"NEAR(b)\"");
        assert_eq!(sanitize_fts5_query("\"quoted\""), "\"quoted\"");
        assert_eq!(sanitize_fts5_query("   "), "");
    }

    #[test]
    fn test_timestamp_encoding_is_sortable() {
        let early = ts_to_sql("2026-01-01T00:00:00.000Z".parse().unwrap());
        let late = ts_to_sql("2026-01-01T00:00:00.123Z".parse().unwrap());
        assert!(early < late);
    }
}
