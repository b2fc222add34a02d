//! Ban and attempt-counter stores.
//!
//! The decision engine keeps no state of its own. Everything it knows about
//! an identity lives behind these two traits, so any key-value store with
//! per-key expiry can back the gate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

mod counter;
pub mod memory;
mod registry;

pub use counter::AttemptCounter;
pub use memory::{InMemoryBanStore, InMemoryRateLimitStore};
pub use registry::{StorePair, StoreRegistry, MEMORY_DRIVER};

/// Errors raised by a backing store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or timed out.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The store answered but the operation failed.
    #[error("Store error: {0}")]
    Internal(String),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Expiring mapping from identity key to the instant its ban ends.
#[async_trait]
pub trait BanStore: Send + Sync {
    /// Read the ban expiry recorded for `key`, if the record has not expired.
    async fn get(&self, key: &str) -> StoreResult<Option<DateTime<Utc>>>;

    /// Record a ban for `key` that the store drops after `ttl`.
    ///
    /// Overwrites any existing record; bans never stack.
    async fn put(&self, key: &str, banned_until: DateTime<Utc>, ttl: Duration) -> StoreResult<()>;

    /// Remove the ban record for `key`.
    async fn forget(&self, key: &str) -> StoreResult<()>;
}

/// Decaying attempt counters keyed by identity.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Whether `key` has used up `max_attempts` in its current window.
    async fn too_many_attempts(&self, key: &str, max_attempts: u64) -> StoreResult<bool>;

    /// Register one attempt for `key`. A new window of length `decay`
    /// opens on the first hit after the previous one lapsed.
    ///
    /// Returns the attempt count after the hit.
    async fn hit(&self, key: &str, decay: Duration) -> StoreResult<u64>;

    /// Attempts counted for `key` in its current window.
    async fn attempts(&self, key: &str) -> StoreResult<u64>;

    /// Drop the counter for `key`.
    async fn clear(&self, key: &str) -> StoreResult<()>;

    /// Register one attempt unless `key` has already used up `max_attempts`.
    ///
    /// Returns `false`, without counting, when the limit was already reached.
    /// The default issues the check and the hit as two calls, which lets
    /// concurrent requests for the same key slip past the limit briefly.
    /// Stores with an atomic increment-and-compare should override it.
    async fn hit_unless_exceeded(
        &self,
        key: &str,
        max_attempts: u64,
        decay: Duration,
    ) -> StoreResult<bool> {
        if self.too_many_attempts(key, max_attempts).await? {
            return Ok(false);
        }
        self.hit(key, decay).await?;
        Ok(true)
    }
}
