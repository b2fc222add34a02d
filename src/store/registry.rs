//! Named store drivers selected by configuration.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::memory::{InMemoryBanStore, InMemoryRateLimitStore};
use super::{BanStore, RateLimitStore};
use crate::clock::Clock;
use crate::error::{Result, SuperbanError};

/// Driver name of the built-in in-process stores.
pub const MEMORY_DRIVER: &str = "memory";

/// A ban store and an attempt store that are used together.
#[derive(Clone)]
pub struct StorePair {
    pub bans: Arc<dyn BanStore>,
    pub attempts: Arc<dyn RateLimitStore>,
}

impl StorePair {
    pub fn new(bans: Arc<dyn BanStore>, attempts: Arc<dyn RateLimitStore>) -> Self {
        Self { bans, attempts }
    }
}

/// Store pairs indexed by driver name.
///
/// Embedders register their own drivers (Redis, memcached, ...) and the
/// configured `cache_driver` picks one without touching the engine.
pub struct StoreRegistry {
    drivers: HashMap<String, StorePair>,
    memory: Option<(Arc<InMemoryBanStore>, Arc<InMemoryRateLimitStore>)>,
}

impl StoreRegistry {
    /// A registry with no drivers.
    pub fn empty() -> Self {
        Self {
            drivers: HashMap::new(),
            memory: None,
        }
    }

    /// A registry with the `memory` driver registered on `clock`.
    pub fn with_memory(clock: Arc<dyn Clock>) -> Self {
        let bans = Arc::new(InMemoryBanStore::new(clock.clone()));
        let attempts = Arc::new(InMemoryRateLimitStore::new(clock));

        let mut registry = Self::empty();
        registry.register(MEMORY_DRIVER, StorePair::new(bans.clone(), attempts.clone()));
        registry.memory = Some((bans, attempts));
        registry
    }

    /// Register `pair` under `name`, replacing any previous driver of that name.
    pub fn register(&mut self, name: impl Into<String>, pair: StorePair) {
        let name = name.into();
        debug!(driver = %name, "Registering store driver");
        self.drivers.insert(name, pair);
    }

    /// Look up the driver called `name`.
    pub fn resolve(&self, name: &str) -> Result<StorePair> {
        self.drivers
            .get(name)
            .cloned()
            .ok_or_else(|| SuperbanError::UnknownDriver(name.to_string()))
    }

    /// Purge expired entries from the built-in memory stores.
    ///
    /// Returns the number of ban records and counters removed.
    pub fn purge_memory(&self) -> (usize, usize) {
        match &self.memory {
            Some((bans, attempts)) => (bans.purge_expired(), attempts.purge_expired()),
            None => (0, 0),
        }
    }

    /// Registered driver names, sorted.
    pub fn drivers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.drivers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
