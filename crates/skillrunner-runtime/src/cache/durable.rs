//! Durable tier backed by SQLite, migrated and queried the way the
//! teacher's `FactoryDb` does: one `execute_batch` schema string, row
//! structs that convert into domain types, a `Mutex<Connection>` since
//! `rusqlite::Connection` is not `Sync`.
//!
//! Stats are kept in a `cache_stats` counter table keyed by statistic
//! name.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use skillrunner_common::{CompletionResponse, EngineError};

use super::CacheEntry;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    ttl_secs INTEGER NOT NULL,
    hit_count INTEGER NOT NULL DEFAULT 0,
    size_bytes INTEGER NOT NULL,
    model_id TEXT NOT NULL,
    prompt_hash TEXT NOT NULL,
    last_accessed_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cache_entries_last_accessed ON cache_entries(last_accessed_at);
CREATE INDEX IF NOT EXISTS idx_cache_entries_expires_at ON cache_entries(expires_at);

CREATE TABLE IF NOT EXISTS cache_stats (
    name TEXT PRIMARY KEY,
    value INTEGER NOT NULL DEFAULT 0
);
";

const STAT_EVICTIONS: &str = "eviction_count";
const STAT_EXPIRED: &str = "expired_count";

pub(crate) struct DurableTier {
    conn: Mutex<Connection>,
    max_size_bytes: u64,
}

struct EntryRow {
    key: String,
    value: String,
    created_at: String,
    expires_at: String,
    ttl_secs: i64,
    hit_count: i64,
    size_bytes: i64,
    model_id: String,
    prompt_hash: String,
    last_accessed_at: String,
}

impl EntryRow {
    fn into_entry(self) -> Result<CacheEntry, EngineError> {
        let value: CompletionResponse = serde_json::from_str(&self.value)
            .map_err(|e| EngineError::internal("corrupt cache_entries row").with_cause(e))?;
        Ok(CacheEntry {
            key: self.key,
            value,
            created_at: parse_timestamp(&self.created_at)?,
            expires_at: parse_timestamp(&self.expires_at)?,
            ttl: Duration::from_secs(self.ttl_secs.max(0) as u64),
            hit_count: self.hit_count.max(0) as u64,
            size_bytes: self.size_bytes.max(0) as u64,
            model_id: self.model_id,
            prompt_hash: self.prompt_hash,
            last_accessed_at: parse_timestamp(&self.last_accessed_at)?,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, EngineError> {
    raw.parse::<DateTime<Utc>>()
        .map_err(|e| EngineError::internal("corrupt cache_entries timestamp").with_cause(e))
}

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<EntryRow> {
    Ok(EntryRow {
        key: row.get(0)?,
        value: row.get(1)?,
        created_at: row.get(2)?,
        expires_at: row.get(3)?,
        ttl_secs: row.get(4)?,
        hit_count: row.get(5)?,
        size_bytes: row.get(6)?,
        model_id: row.get(7)?,
        prompt_hash: row.get(8)?,
        last_accessed_at: row.get(9)?,
    })
}

const SELECT_COLUMNS: &str = "key, value, created_at, expires_at, ttl_secs, hit_count, size_bytes, model_id, prompt_hash, last_accessed_at";

impl DurableTier {
    pub(crate) fn open(path: &Path, max_size_bytes: u64) -> Result<Self, EngineError> {
        let conn = Connection::open(path)
            .map_err(|e| EngineError::internal("failed to open cache database").with_cause(e))?;
        Self::from_connection(conn, max_size_bytes)
    }

    pub(crate) fn open_in_memory(max_size_bytes: u64) -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| EngineError::internal("failed to open in-memory cache database").with_cause(e))?;
        Self::from_connection(conn, max_size_bytes)
    }

    fn from_connection(conn: Connection, max_size_bytes: u64) -> Result<Self, EngineError> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| EngineError::internal("failed to migrate cache database").with_cause(e))?;
        Ok(Self {
            conn: Mutex::new(conn),
            max_size_bytes: max_size_bytes.max(1),
        })
    }

    fn bump_stat(conn: &Connection, name: &str, by: i64) -> Result<(), EngineError> {
        conn.execute(
            "INSERT INTO cache_stats (name, value) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET value = value + excluded.value",
            params![name, by],
        )
        .map_err(|e| EngineError::internal("cache stats update failed").with_cause(e))?;
        Ok(())
    }

    pub(crate) fn stat(&self, name: &str) -> Result<u64, EngineError> {
        let conn = self.conn.lock().expect("cache connection poisoned");
        let value: Option<i64> = conn
            .query_row("SELECT value FROM cache_stats WHERE name = ?1", params![name], |r| r.get(0))
            .optional()
            .map_err(|e| EngineError::internal("cache stats read failed").with_cause(e))?;
        Ok(value.unwrap_or(0).max(0) as u64)
    }

    pub(crate) fn eviction_count(&self) -> Result<u64, EngineError> {
        self.stat(STAT_EVICTIONS)
    }

    pub(crate) fn expired_count(&self) -> Result<u64, EngineError> {
        self.stat(STAT_EXPIRED)
    }

    /// Fetch an entry, bumping its `last_accessed_at` and `hit_count` as
    /// a side effect.
    pub(crate) fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<CacheEntry>, EngineError> {
        let conn = self.conn.lock().expect("cache connection poisoned");
        let row: Option<EntryRow> = conn
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM cache_entries WHERE key = ?1"),
                params![key],
                row_to_entry,
            )
            .optional()
            .map_err(|e| EngineError::internal("cache lookup failed").with_cause(e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        conn.execute(
            "UPDATE cache_entries SET last_accessed_at = ?1, hit_count = hit_count + 1 WHERE key = ?2",
            params![now.to_rfc3339(), key],
        )
        .map_err(|e| EngineError::internal("cache accessed_at update failed").with_cause(e))?;

        let mut entry = row.into_entry()?;
        entry.hit_count += 1;
        entry.last_accessed_at = now;
        Ok(Some(entry))
    }

    /// Read without mutating recency/hit metadata (used by `has`/`keys`).
    pub(crate) fn peek(&self, key: &str) -> Result<Option<CacheEntry>, EngineError> {
        let conn = self.conn.lock().expect("cache connection poisoned");
        conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM cache_entries WHERE key = ?1"),
            params![key],
            row_to_entry,
        )
        .optional()
        .map_err(|e| EngineError::internal("cache lookup failed").with_cause(e))?
        .map(EntryRow::into_entry)
        .transpose()
    }

    /// Insert or overwrite `entry`. Returns `true` if a different entry
    /// had to be evicted (least-recently-accessed) to stay within the
    /// byte budget.
    pub(crate) fn put(&self, entry: &CacheEntry) -> Result<bool, EngineError> {
        let conn = self.conn.lock().expect("cache connection poisoned");
        let value_json = serde_json::to_string(&entry.value)
            .map_err(|e| EngineError::internal("failed to serialize cache entry").with_cause(e))?;

        let existing_size: Option<i64> = conn
            .query_row("SELECT size_bytes FROM cache_entries WHERE key = ?1", params![entry.key], |r| r.get(0))
            .optional()
            .map_err(|e| EngineError::internal("cache lookup failed").with_cause(e))?;

        let current_total: i64 = conn
            .query_row("SELECT COALESCE(SUM(size_bytes), 0) FROM cache_entries", [], |row| row.get(0))
            .map_err(|e| EngineError::internal("cache size query failed").with_cause(e))?;

        let base_total = current_total - existing_size.unwrap_or(0);
        let mut projected = base_total + entry.size_bytes as i64;
        let mut evicted = false;

        while projected > self.max_size_bytes as i64 {
            let lru_key: Option<(String, i64)> = conn
                .query_row(
                    "SELECT key, size_bytes FROM cache_entries WHERE key != ?1 ORDER BY last_accessed_at ASC LIMIT 1",
                    params![entry.key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(|e| EngineError::internal("cache eviction query failed").with_cause(e))?;
            let Some((key, size)) = lru_key else { break };
            conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])
                .map_err(|e| EngineError::internal("cache eviction delete failed").with_cause(e))?;
            Self::bump_stat(&conn, STAT_EVICTIONS, 1)?;
            projected -= size;
            evicted = true;
        }

        conn.execute(
            "INSERT INTO cache_entries
                (key, value, created_at, expires_at, ttl_secs, hit_count, size_bytes, model_id, prompt_hash, last_accessed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at,
                ttl_secs = excluded.ttl_secs,
                size_bytes = excluded.size_bytes,
                model_id = excluded.model_id,
                prompt_hash = excluded.prompt_hash,
                last_accessed_at = excluded.last_accessed_at",
            params![
                entry.key,
                value_json,
                entry.created_at.to_rfc3339(),
                entry.expires_at.to_rfc3339(),
                entry.ttl.as_secs() as i64,
                entry.hit_count as i64,
                entry.size_bytes as i64,
                entry.model_id,
                entry.prompt_hash,
                entry.last_accessed_at.to_rfc3339(),
            ],
        )
        .map_err(|e| EngineError::internal("cache insert failed").with_cause(e))?;

        Ok(evicted)
    }

    pub(crate) fn remove(&self, key: &str) -> Result<(), EngineError> {
        let conn = self.conn.lock().expect("cache connection poisoned");
        conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])
            .map_err(|e| EngineError::internal("cache delete failed").with_cause(e))?;
        Ok(())
    }

    pub(crate) fn clear(&self) -> Result<(), EngineError> {
        let conn = self.conn.lock().expect("cache connection poisoned");
        conn.execute("DELETE FROM cache_entries", [])
            .map_err(|e| EngineError::internal("cache clear failed").with_cause(e))?;
        Ok(())
    }

    pub(crate) fn keys(&self) -> Result<Vec<String>, EngineError> {
        let conn = self.conn.lock().expect("cache connection poisoned");
        let mut stmt = conn
            .prepare("SELECT key FROM cache_entries")
            .map_err(|e| EngineError::internal("cache keys query failed").with_cause(e))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| EngineError::internal("cache keys query failed").with_cause(e))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| EngineError::internal("cache keys row failed").with_cause(e))?);
        }
        Ok(out)
    }

    pub(crate) fn len(&self) -> Result<u64, EngineError> {
        let conn = self.conn.lock().expect("cache connection poisoned");
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))
            .map_err(|e| EngineError::internal("cache count query failed").with_cause(e))?;
        Ok(count.max(0) as u64)
    }

    pub(crate) fn total_size_bytes(&self) -> Result<u64, EngineError> {
        let conn = self.conn.lock().expect("cache connection poisoned");
        let total: i64 = conn
            .query_row("SELECT COALESCE(SUM(size_bytes), 0) FROM cache_entries", [], |row| row.get(0))
            .map_err(|e| EngineError::internal("cache size query failed").with_cause(e))?;
        Ok(total.max(0) as u64)
    }

    pub(crate) fn oldest_and_newest(&self) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>), EngineError> {
        let conn = self.conn.lock().expect("cache connection poisoned");
        let oldest: Option<String> = conn
            .query_row("SELECT MIN(created_at) FROM cache_entries", [], |row| row.get(0))
            .optional()
            .map_err(|e| EngineError::internal("cache bounds query failed").with_cause(e))?
            .flatten();
        let newest: Option<String> = conn
            .query_row("SELECT MAX(created_at) FROM cache_entries", [], |row| row.get(0))
            .optional()
            .map_err(|e| EngineError::internal("cache bounds query failed").with_cause(e))?
            .flatten();
        Ok((
            oldest.and_then(|s| s.parse().ok()),
            newest.and_then(|s| s.parse().ok()),
        ))
    }

    pub(crate) fn total_ttl_secs(&self) -> Result<(u64, u64), EngineError> {
        let conn = self.conn.lock().expect("cache connection poisoned");
        let (sum, count): (i64, i64) = conn
            .query_row(
                "SELECT COALESCE(SUM(ttl_secs), 0), COUNT(*) FROM cache_entries",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| EngineError::internal("cache ttl query failed").with_cause(e))?;
        Ok((sum.max(0) as u64, count.max(0) as u64))
    }

    pub(crate) fn remove_expired(&self, now: DateTime<Utc>) -> Result<usize, EngineError> {
        let conn = self.conn.lock().expect("cache connection poisoned");
        let removed = conn
            .execute("DELETE FROM cache_entries WHERE expires_at <= ?1", params![now.to_rfc3339()])
            .map_err(|e| EngineError::internal("cache expiry sweep failed").with_cause(e))?;
        if removed > 0 {
            Self::bump_stat(&conn, STAT_EXPIRED, removed as i64)?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use skillrunner_common::FinishReason;

    fn entry(key: &str, created_at: DateTime<Utc>) -> CacheEntry {
        CacheEntry::new(
            key,
            CompletionResponse {
                content: "x".to_string(),
                input_tokens: 1,
                output_tokens: 1,
                finish_reason: FinishReason::Stop,
                model_used: "m".to_string(),
                duration: Duration::ZERO,
                rate_limit: None,
            },
            created_at,
            Duration::from_secs(3600),
            "m",
            "hash",
        )
    }

    #[test]
    fn put_then_get_round_trips() {
        let tier = DurableTier::open_in_memory(1_000_000).unwrap();
        let t0 = Utc::now();
        tier.put(&entry("a", t0)).unwrap();
        let fetched = tier.get("a", t0).unwrap().unwrap();
        assert_eq!(fetched.value.content, "x");
        assert_eq!(fetched.hit_count, 1);
    }

    #[test]
    fn get_bumps_last_accessed_at() {
        let tier = DurableTier::open_in_memory(1_000_000).unwrap();
        let t0 = Utc::now();
        tier.put(&entry("a", t0)).unwrap();
        let later = t0 + ChronoDuration::seconds(30);
        tier.get("a", later).unwrap();
        let refetched = tier.peek("a").unwrap().unwrap();
        assert_eq!(refetched.last_accessed_at, later);
    }

    #[test]
    fn evicts_least_recently_accessed_when_over_byte_budget() {
        let a = entry("a", Utc::now());
        let budget = a.size_bytes * 2;
        let tier = DurableTier::open_in_memory(budget).unwrap();
        let t0 = Utc::now();
        tier.put(&entry("a", t0)).unwrap();
        tier.put(&entry("b", t0 + ChronoDuration::seconds(1))).unwrap();
        // touch "b" so "a" becomes least-recently-accessed
        tier.get("b", t0 + ChronoDuration::seconds(2)).unwrap();
        let evicted = tier.put(&entry("c", t0 + ChronoDuration::seconds(3))).unwrap();
        assert!(evicted);
        assert!(tier.peek("a").unwrap().is_none());
        assert!(tier.peek("b").unwrap().is_some());
        assert!(tier.eviction_count().unwrap() >= 1);
    }

    #[test]
    fn remove_expired_deletes_only_stale_rows_and_bumps_stat() {
        let tier = DurableTier::open_in_memory(1_000_000).unwrap();
        let t0 = Utc::now();
        let mut stale = entry("stale", t0);
        stale.expires_at = t0 - ChronoDuration::seconds(1);
        tier.put(&stale).unwrap();
        tier.put(&entry("fresh", t0)).unwrap();

        let removed = tier.remove_expired(t0).unwrap();
        assert_eq!(removed, 1);
        assert!(tier.peek("stale").unwrap().is_none());
        assert!(tier.peek("fresh").unwrap().is_some());
        assert_eq!(tier.expired_count().unwrap(), 1);
    }
}
