//! The Response Cache: a two-tier cache over completion responses keyed
//! by request fingerprint, with a durable-storage tier fronted by an
//! in-memory tier for the hot path.
//!
//! The two tiers' eviction policies are deliberately left unharmonized
//! rather than guessed at: the memory tier evicts its oldest entry by
//! `created_at`, the durable tier evicts its least-recently-accessed
//! entry by `last_accessed_at`. See DESIGN.md for the recorded decision.

mod composite;
mod durable;
mod memory;

pub use composite::ResponseCache;

use std::time::Duration;

use chrono::{DateTime, Utc};
use skillrunner_common::CompletionResponse;

/// One stored response, identified by its request fingerprint.
/// `last_accessed_at` is required by the durable tier's LRU eviction
/// policy, so it rides along as an implementation detail rather than
/// caller-visible metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub value: CompletionResponse,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ttl: Duration,
    pub hit_count: u64,
    pub size_bytes: u64,
    pub model_id: String,
    pub prompt_hash: String,
    pub(crate) last_accessed_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(
        key: impl Into<String>,
        value: CompletionResponse,
        created_at: DateTime<Utc>,
        ttl: Duration,
        model_id: impl Into<String>,
        prompt_hash: impl Into<String>,
    ) -> Self {
        let ttl_chrono = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());
        let size_bytes = serde_json::to_vec(&value).map(|b| b.len() as u64).unwrap_or(0);
        Self {
            key: key.into(),
            value,
            created_at,
            expires_at: created_at + ttl_chrono,
            ttl,
            hit_count: 0,
            size_bytes,
            model_id: model_id.into(),
            prompt_hash: prompt_hash.into(),
            last_accessed_at: created_at,
        }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Aggregate counters across both tiers.
/// `hit_count`/`miss_count`/`eviction_count`/`expired_count`/
/// `tokens_saved` are read from atomics so `stats` never blocks a
/// concurrent writer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub total_entries: u64,
    pub total_size: u64,
    pub hit_count: u64,
    pub miss_count: u64,
    pub eviction_count: u64,
    pub expired_count: u64,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
    pub avg_ttl: Duration,
    pub tokens_saved: u64,
}

impl CacheStats {
    pub fn total_lookups(&self) -> u64 {
        self.hit_count + self.miss_count
    }

    /// Hit rate as a percentage in `[0, 100]`.
    pub fn hit_rate_percent(&self) -> f64 {
        if self.total_lookups() == 0 {
            0.0
        } else {
            (self.hit_count as f64 / self.total_lookups() as f64) * 100.0
        }
    }
}

/// Simple glob-style pattern for `keys`: `*` matches any run of
/// characters, everything else must match literally. Good enough for the
/// engine's own debugging/admin surface; not a full glob implementation.
pub(crate) fn glob_match(pattern: &str, candidate: &str) -> bool {
    fn helper(pattern: &[u8], candidate: &[u8]) -> bool {
        match pattern.first() {
            None => candidate.is_empty(),
            Some(b'*') => {
                helper(&pattern[1..], candidate)
                    || (!candidate.is_empty() && helper(pattern, &candidate[1..]))
            }
            Some(&c) => candidate.first().is_some_and(|&d| d == c) && helper(&pattern[1..], &candidate[1..]),
        }
    }
    helper(pattern.as_bytes(), candidate.as_bytes())
}
