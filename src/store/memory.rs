//! In-process stores backed by `DashMap`.
//!
//! Expired entries are invisible to readers as soon as their TTL passes and
//! are physically removed by `purge_expired`, which the binary calls on an
//! interval.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

use super::counter::AttemptCounter;
use super::{BanStore, RateLimitStore, StoreError, StoreResult};
use crate::clock::Clock;

fn to_chrono(d: Duration) -> StoreResult<chrono::Duration> {
    chrono::Duration::from_std(d).map_err(|e| StoreError::Internal(format!("invalid TTL {:?}: {}", d, e)))
}

#[derive(Debug, Clone, Copy)]
struct BanEntry {
    banned_until: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Ban records held in process memory.
pub struct InMemoryBanStore {
    entries: DashMap<String, BanEntry>,
    clock: Arc<dyn Clock>,
}

impl InMemoryBanStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Drop every record whose TTL has passed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Number of records held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl BanStore for InMemoryBanStore {
    async fn get(&self, key: &str) -> StoreResult<Option<DateTime<Utc>>> {
        let now = self.clock.now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.banned_until))
    }

    async fn put(&self, key: &str, banned_until: DateTime<Utc>, ttl: Duration) -> StoreResult<()> {
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(to_chrono(ttl)?)
            .ok_or_else(|| StoreError::Internal(format!("TTL {:?} runs past the end of time", ttl)))?;
        trace!(key = %key, banned_until = %banned_until, expires_at = %expires_at, "Storing ban record");
        self.entries.insert(
            key.to_string(),
            BanEntry {
                banned_until,
                expires_at,
            },
        );
        Ok(())
    }

    async fn forget(&self, key: &str) -> StoreResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Attempt counters held in process memory.
///
/// `hit_unless_exceeded` runs under the map's per-shard write lock, so the
/// compare and the increment happen as one step.
pub struct InMemoryRateLimitStore {
    counters: DashMap<String, AttemptCounter>,
    clock: Arc<dyn Clock>,
}

impl InMemoryRateLimitStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            counters: DashMap::new(),
            clock,
        }
    }

    /// Drop every counter whose window has closed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.counters.len();
        self.counters.retain(|_, counter| !counter.is_expired(now));
        before.saturating_sub(self.counters.len())
    }

    /// Number of counters held, expired or not.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    fn count_at(&self, key: &str, now: DateTime<Utc>) -> u64 {
        self.counters.get(key).map(|c| c.count(now)).unwrap_or(0)
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn too_many_attempts(&self, key: &str, max_attempts: u64) -> StoreResult<bool> {
        Ok(self.count_at(key, self.clock.now()) >= max_attempts)
    }

    async fn hit(&self, key: &str, decay: Duration) -> StoreResult<u64> {
        let now = self.clock.now();
        let decay = to_chrono(decay)?;
        let mut counter = self
            .counters
            .entry(key.to_string())
            .or_insert_with(|| AttemptCounter::new(now, decay));
        Ok(counter.hit(now, decay))
    }

    async fn attempts(&self, key: &str) -> StoreResult<u64> {
        Ok(self.count_at(key, self.clock.now()))
    }

    async fn clear(&self, key: &str) -> StoreResult<()> {
        self.counters.remove(key);
        Ok(())
    }

    async fn hit_unless_exceeded(
        &self,
        key: &str,
        max_attempts: u64,
        decay: Duration,
    ) -> StoreResult<bool> {
        let now = self.clock.now();
        let decay = to_chrono(decay)?;
        let mut counter = self
            .counters
            .entry(key.to_string())
            .or_insert_with(|| AttemptCounter::new(now, decay));

        if counter.exceeded(now, max_attempts) {
            return Ok(false);
        }
        counter.hit(now, decay);
        Ok(true)
    }
}
