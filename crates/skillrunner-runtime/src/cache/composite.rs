//! The composite two-tier cache the engine actually talks to: memory
//! tier first, durable tier second, promoting a durable hit back into
//! memory and writing through to both tiers on `set`.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use skillrunner_common::{Clock, CompletionResponse, EngineError};

use super::durable::DurableTier;
use super::glob_match;
use super::memory::MemoryTier;
use super::{CacheEntry, CacheStats};

pub struct ResponseCache {
    memory: MemoryTier,
    durable: DurableTier,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    tokens_saved: AtomicU64,
    memory_evictions: AtomicU64,
}

impl ResponseCache {
    pub fn open(
        path: &Path,
        memory_max_bytes: u64,
        durable_max_bytes: u64,
        default_ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            memory: MemoryTier::new(memory_max_bytes),
            durable: DurableTier::open(path, durable_max_bytes)?,
            default_ttl,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            tokens_saved: AtomicU64::new(0),
            memory_evictions: AtomicU64::new(0),
        })
    }

    pub fn open_in_memory(
        memory_max_bytes: u64,
        durable_max_bytes: u64,
        default_ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            memory: MemoryTier::new(memory_max_bytes),
            durable: DurableTier::open_in_memory(durable_max_bytes)?,
            default_ttl,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            tokens_saved: AtomicU64::new(0),
            memory_evictions: AtomicU64::new(0),
        })
    }

    /// `get(key) → (value, hit?)`.
    pub fn get(&self, key: &str) -> Result<(Option<CompletionResponse>, bool), EngineError> {
        let (entry, hit) = self.get_entry(key)?;
        Ok((entry.map(|e| e.value), hit))
    }

    /// `get_entry(key) → (entry, hit?)`, incrementing `hit_count` on a
    /// hit. A durable hit with remaining TTL is promoted into memory.
    pub fn get_entry(&self, key: &str) -> Result<(Option<CacheEntry>, bool), EngineError> {
        let now = self.clock.now();

        if let Some(entry) = self.memory.get(key) {
            if entry.is_expired(now) {
                self.memory.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Ok((None, false));
            }
            let entry = self.memory.get_and_record_hit(key).unwrap_or(entry);
            self.hits.fetch_add(1, Ordering::Relaxed);
            self.tokens_saved
                .fetch_add(entry.value.total_tokens() as u64, Ordering::Relaxed);
            return Ok((Some(entry), true));
        }

        if let Some(entry) = self.durable.get(key, now)? {
            if entry.is_expired(now) {
                self.durable.remove(key)?;
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Ok((None, false));
            }
            let evicted = self.memory.put(entry.clone());
            self.memory_evictions.fetch_add(evicted, Ordering::Relaxed);
            self.hits.fetch_add(1, Ordering::Relaxed);
            self.tokens_saved
                .fetch_add(entry.value.total_tokens() as u64, Ordering::Relaxed);
            return Ok((Some(entry), true));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok((None, false))
    }

    /// `set(key, value, ttl)` — stores with a caller-specified TTL.
    pub fn set(&self, key: impl Into<String>, value: CompletionResponse, ttl: Duration) -> Result<(), EngineError> {
        let model_id = value.model_used.clone();
        self.set_with_metadata(CacheEntry::new(key, value, self.clock.now(), ttl, model_id, String::new()))
    }

    /// `set(key, value)` using the cache's configured default TTL.
    pub fn set_default_ttl(&self, key: impl Into<String>, value: CompletionResponse) -> Result<(), EngineError> {
        self.set(key, value, self.default_ttl)
    }

    /// `set_with_metadata(entry)` — stores with caller-supplied metadata,
    /// including `model_id` and `prompt_hash`.
    pub fn set_with_metadata(&self, mut entry: CacheEntry) -> Result<(), EngineError> {
        let now = self.clock.now();
        entry.created_at = now;
        let ttl_chrono = ChronoDuration::from_std(entry.ttl).map_err(|e| EngineError::internal("cache ttl out of range").with_cause(e))?;
        entry.expires_at = now + ttl_chrono;
        entry.last_accessed_at = now;

        let evicted = self.memory.put(entry.clone());
        self.memory_evictions.fetch_add(evicted, Ordering::Relaxed);
        self.durable.put(&entry)?;
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<(), EngineError> {
        self.memory.remove(key);
        self.durable.remove(key)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), EngineError> {
        self.memory.clear();
        self.durable.clear()?;
        Ok(())
    }

    pub fn has(&self, key: &str) -> Result<bool, EngineError> {
        if self.memory.get(key).is_some() {
            return Ok(true);
        }
        Ok(self.durable.peek(key)?.is_some())
    }

    /// Keys matching a `*`-glob pattern, deduplicated across both tiers.
    /// Deduplication happens only here — other operations address a
    /// single key and don't need it.
    pub fn keys(&self, pattern: &str) -> Result<Vec<String>, EngineError> {
        let mut all: std::collections::BTreeSet<String> = self.memory.keys().into_iter().collect();
        all.extend(self.durable.keys()?);
        Ok(all.into_iter().filter(|k| glob_match(pattern, k)).collect())
    }

    /// Raw per-tier count, memory + durable. Unlike `keys()`, this does not
    /// deduplicate a key promoted into both tiers.
    pub fn size(&self) -> Result<u64, EngineError> {
        Ok(self.memory.len() as u64 + self.durable.len()?)
    }

    /// Drop expired entries from both tiers. Intended to be called
    /// periodically by a caller-owned janitor task; `get`/`set` only
    /// lazily clear the single entry a lookup happens to touch.
    pub fn cleanup(&self) -> Result<usize, EngineError> {
        let now = self.clock.now();
        let memory_removed = self.memory.remove_expired(now);
        let durable_removed = self.durable.remove_expired(now)?;
        Ok(memory_removed + durable_removed)
    }

    pub fn stats(&self) -> Result<CacheStats, EngineError> {
        let total_entries = self.memory.len() as u64 + self.durable.len()?;

        let (mem_oldest, mem_newest) = self.memory.oldest_and_newest();
        let (dur_oldest, dur_newest) = self.durable.oldest_and_newest()?;
        let oldest_entry = [mem_oldest, dur_oldest].into_iter().flatten().min();
        let newest_entry = [mem_newest, dur_newest].into_iter().flatten().max();

        let (mem_ttl_sum, mem_count) = self.memory.total_ttl_secs();
        let (dur_ttl_sum, dur_count) = self.durable.total_ttl_secs()?;
        let ttl_count = mem_count as u64 + dur_count;
        let avg_ttl_secs = if ttl_count == 0 { 0 } else { (mem_ttl_sum + dur_ttl_sum) / ttl_count };

        Ok(CacheStats {
            total_entries,
            total_size: self.memory.current_size_bytes() + self.durable.total_size_bytes()?,
            hit_count: self.hits.load(Ordering::Relaxed),
            miss_count: self.misses.load(Ordering::Relaxed),
            eviction_count: self.memory_evictions.load(Ordering::Relaxed) + self.durable.eviction_count()?,
            expired_count: self.durable.expired_count()?,
            oldest_entry,
            newest_entry,
            avg_ttl: Duration::from_secs(avg_ttl_secs),
            tokens_saved: self.tokens_saved.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillrunner_common::{test_clock_at, FinishReason};
    use std::time::Duration as StdDuration;

    fn response() -> CompletionResponse {
        CompletionResponse {
            content: "hello".to_string(),
            input_tokens: 3,
            output_tokens: 2,
            finish_reason: FinishReason::Stop,
            model_used: "m".to_string(),
            duration: StdDuration::ZERO,
            rate_limit: None,
        }
    }

    #[test]
    fn miss_then_hit_after_set() {
        let clock = test_clock_at(chrono::Utc::now());
        let cache = ResponseCache::open_in_memory(1_000_000, 1_000_000, StdDuration::from_secs(60), clock.clone()).unwrap();

        let (value, hit) = cache.get("fp1").unwrap();
        assert!(value.is_none());
        assert!(!hit);

        cache.set_default_ttl("fp1", response()).unwrap();
        let (value, hit) = cache.get("fp1").unwrap();
        assert_eq!(value.unwrap().content, "hello");
        assert!(hit);

        let stats = cache.stats().unwrap();
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.miss_count, 1);
        assert!((stats.hit_rate_percent() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn expired_entry_counts_as_miss_not_hit() {
        let now = chrono::Utc::now();
        let clock = test_clock_at(now);
        let cache = ResponseCache::open_in_memory(1_000_000, 1_000_000, StdDuration::from_millis(1), clock.clone()).unwrap();

        cache.set_default_ttl("fp1", response()).unwrap();
        clock.advance(chrono::Duration::seconds(1));
        let (value, hit) = cache.get("fp1").unwrap();
        assert!(value.is_none());
        assert!(!hit);
    }

    #[test]
    fn durable_hit_promotes_into_memory_tier() {
        let clock = test_clock_at(chrono::Utc::now());
        let cache = ResponseCache::open_in_memory(1_000_000, 1_000_000, StdDuration::from_secs(60), clock.clone()).unwrap();
        cache.set_default_ttl("fp1", response()).unwrap();

        cache.memory.remove("fp1");
        assert!(cache.memory.get("fp1").is_none());

        let (value, hit) = cache.get("fp1").unwrap();
        assert!(value.is_some());
        assert!(hit);
        assert!(cache.memory.get("fp1").is_some());
    }

    #[test]
    fn delete_removes_from_both_tiers() {
        let clock = test_clock_at(chrono::Utc::now());
        let cache = ResponseCache::open_in_memory(1_000_000, 1_000_000, StdDuration::from_secs(60), clock).unwrap();
        cache.set_default_ttl("fp1", response()).unwrap();
        cache.delete("fp1").unwrap();
        assert!(!cache.has("fp1").unwrap());
    }

    #[test]
    fn keys_matches_glob_pattern_and_dedupes() {
        let clock = test_clock_at(chrono::Utc::now());
        let cache = ResponseCache::open_in_memory(1_000_000, 1_000_000, StdDuration::from_secs(60), clock).unwrap();
        cache.set_default_ttl("abc123", response()).unwrap();
        cache.set_default_ttl("xyz999", response()).unwrap();
        let keys = cache.keys("abc*").unwrap();
        assert_eq!(keys, vec!["abc123".to_string()]);
    }

    #[test]
    fn size_sums_tiers_without_deduping_a_promoted_key() {
        let clock = test_clock_at(chrono::Utc::now());
        let cache = ResponseCache::open_in_memory(1_000_000, 1_000_000, StdDuration::from_secs(60), clock).unwrap();
        cache.set_default_ttl("fp1", response()).unwrap();
        // `set` already writes through to both tiers, so the same key
        // counts once per tier rather than once overall.
        assert_eq!(cache.size().unwrap(), 2);
        assert_eq!(cache.stats().unwrap().total_entries, 2);
        assert_eq!(cache.keys("*").unwrap(), vec!["fp1".to_string()]);
    }

    #[test]
    fn memory_tier_evictions_are_counted_in_stats() {
        let clock = test_clock_at(chrono::Utc::now());
        // A byte budget too small for two entries forces an eviction on
        // the second `set`.
        let cache = ResponseCache::open_in_memory(1, 1_000_000, StdDuration::from_secs(60), clock).unwrap();
        cache.set_default_ttl("fp1", response()).unwrap();
        cache.set_default_ttl("fp2", response()).unwrap();
        assert!(cache.stats().unwrap().eviction_count >= 1);
    }

    #[test]
    fn get_entry_increments_hit_count_metadata() {
        let clock = test_clock_at(chrono::Utc::now());
        let cache = ResponseCache::open_in_memory(1_000_000, 1_000_000, StdDuration::from_secs(60), clock).unwrap();
        cache.set_default_ttl("fp1", response()).unwrap();
        let (entry, _) = cache.get_entry("fp1").unwrap();
        assert_eq!(entry.unwrap().hit_count, 1);
        let (entry, _) = cache.get_entry("fp1").unwrap();
        assert_eq!(entry.unwrap().hit_count, 2);
    }
}
