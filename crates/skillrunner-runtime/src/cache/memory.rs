//! In-memory fast tier: a `RwLock<HashMap>` guarding entries plus a
//! running `current_size_bytes` counter, with hit/miss/eviction/expired
//! counts kept as separate atomics so `stats` never blocks a writer.
//!
//! Eviction is FIFO by `created_at` rather than true LRU: while `current_size + new_size >
//! max_size_bytes` and the map is non-empty, the oldest entry is evicted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use super::CacheEntry;

pub(crate) struct MemoryTier {
    entries: RwLock<HashMap<String, CacheEntry>>,
    current_size_bytes: AtomicU64,
    max_size_bytes: u64,
}

impl MemoryTier {
    pub(crate) fn new(max_size_bytes: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            current_size_bytes: AtomicU64::new(0),
            max_size_bytes: max_size_bytes.max(1),
        }
    }

    pub(crate) fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.read().expect("memory tier poisoned").get(key).cloned()
    }

    /// Bump `hit_count` and return the updated entry, for `get_entry`'s
    /// "increments hit count atomically" contract.
    pub(crate) fn get_and_record_hit(&self, key: &str) -> Option<CacheEntry> {
        let mut entries = self.entries.write().expect("memory tier poisoned");
        let entry = entries.get_mut(key)?;
        entry.hit_count += 1;
        Some(entry.clone())
    }

    pub(crate) fn remove(&self, key: &str) -> Option<CacheEntry> {
        let mut entries = self.entries.write().expect("memory tier poisoned");
        let removed = entries.remove(key);
        if let Some(ref e) = removed {
            self.current_size_bytes.fetch_sub(e.size_bytes, Ordering::Relaxed);
        }
        removed
    }

    pub(crate) fn clear(&self) {
        let mut entries = self.entries.write().expect("memory tier poisoned");
        entries.clear();
        self.current_size_bytes.store(0, Ordering::Relaxed);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().expect("memory tier poisoned").len()
    }

    pub(crate) fn current_size_bytes(&self) -> u64 {
        self.current_size_bytes.load(Ordering::Relaxed)
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.entries.read().expect("memory tier poisoned").keys().cloned().collect()
    }

    pub(crate) fn oldest_and_newest(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let entries = self.entries.read().expect("memory tier poisoned");
        let oldest = entries.values().map(|e| e.created_at).min();
        let newest = entries.values().map(|e| e.created_at).max();
        (oldest, newest)
    }

    pub(crate) fn total_ttl_secs(&self) -> (u64, usize) {
        let entries = self.entries.read().expect("memory tier poisoned");
        let sum: u64 = entries.values().map(|e| e.ttl.as_secs()).sum();
        (sum, entries.len())
    }

    /// Insert or overwrite `entry`, evicting the oldest surviving entry
    /// (by `created_at`) while the new total would exceed the byte
    /// budget. Returns the number of entries evicted to make room.
    pub(crate) fn put(&self, entry: CacheEntry) -> u64 {
        let mut entries = self.entries.write().expect("memory tier poisoned");
        let mut evicted = 0u64;

        if let Some(existing) = entries.get(&entry.key) {
            self.current_size_bytes.fetch_sub(existing.size_bytes, Ordering::Relaxed);
        }

        let mut projected = self.current_size_bytes.load(Ordering::Relaxed) + entry.size_bytes;
        while projected > self.max_size_bytes && !entries.is_empty() {
            let Some(oldest_key) = entries
                .values()
                .min_by_key(|e| e.created_at)
                .map(|e| e.key.clone())
            else {
                break;
            };
            if oldest_key == entry.key {
                // Only the entry being inserted remains; nothing left to evict.
                break;
            }
            if let Some(removed) = entries.remove(&oldest_key) {
                self.current_size_bytes.fetch_sub(removed.size_bytes, Ordering::Relaxed);
                projected = self.current_size_bytes.load(Ordering::Relaxed) + entry.size_bytes;
                evicted += 1;
            } else {
                break;
            }
        }

        self.current_size_bytes.fetch_add(entry.size_bytes, Ordering::Relaxed);
        entries.insert(entry.key.clone(), entry);
        evicted
    }

    pub(crate) fn remove_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().expect("memory tier poisoned");
        let expired_keys: Vec<String> = entries
            .values()
            .filter(|e| e.is_expired(now))
            .map(|e| e.key.clone())
            .collect();
        for key in &expired_keys {
            if let Some(e) = entries.remove(key) {
                self.current_size_bytes.fetch_sub(e.size_bytes, Ordering::Relaxed);
            }
        }
        expired_keys.len()
    }
}
