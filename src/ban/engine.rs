//! Ban decision engine.

use chrono::{DateTime, Utc};
use tracing::{debug, info, trace};

use super::decision::Decision;
use super::identity::IdentityKey;
use super::limits::Limits;
use crate::error::Result;
use crate::store::StorePair;

/// Decides, per identity, between letting a request through and rejecting it.
///
/// The engine holds no per-identity state. Every call reads the ban store
/// and the attempt store afresh, so it can be shared across tasks freely;
/// consistency for one key under concurrent calls is whatever the stores
/// guarantee.
#[derive(Clone)]
pub struct BanEngine {
    stores: StorePair,
}

impl BanEngine {
    pub fn new(stores: StorePair) -> Self {
        Self { stores }
    }

    pub fn stores(&self) -> &StorePair {
        &self.stores
    }

    /// Decide on one request from `key` at `now`.
    ///
    /// An active ban short-circuits without touching the attempt counter.
    /// Otherwise one attempt is counted; when the limit was already used up
    /// the identity is banned for `limits.banned_minutes` instead. Store
    /// errors are returned as-is.
    pub async fn decide(
        &self,
        key: &IdentityKey,
        limits: &Limits,
        now: DateTime<Utc>,
    ) -> Result<Decision> {
        if let Some(banned_until) = self.stores.bans.get(key.as_str()).await? {
            // A record expiring exactly now is already lapsed
            if banned_until > now {
                trace!(key = %key, banned_until = %banned_until, "Identity is banned");
                return Ok(Decision::Reject { banned_until });
            }
            trace!(key = %key, banned_until = %banned_until, "Ignoring lapsed ban record");
        }

        let admitted = self
            .stores
            .attempts
            .hit_unless_exceeded(key.as_str(), limits.max_attempts, limits.decay())
            .await?;

        if admitted {
            debug!(key = %key, max_attempts = limits.max_attempts, "Attempt counted");
            return Ok(Decision::Allow);
        }

        let banned_until = limits.ban_end(now)?;
        self.stores
            .bans
            .put(key.as_str(), banned_until, limits.ban_ttl())
            .await?;

        info!(
            key = %key,
            max_attempts = limits.max_attempts,
            decay_minutes = limits.decay_minutes,
            banned_until = %banned_until,
            "Attempt limit exceeded, identity banned"
        );

        Ok(Decision::Reject { banned_until })
    }
}
