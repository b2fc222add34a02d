//! The request admission gate.
//!
//! `Superban` ties identity resolution to the decision engine. Its settings
//! are an immutable snapshot: each evaluation reads exactly one snapshot,
//! and `reconfigure` swaps in a new one only after it validates.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::ban::{resolve, BanCriterion, BanEngine, Decision, IdentityKey, Limits, RequestContext, RouteRules};
use crate::clock::Clock;
use crate::config::{SuperbanConfig, UnauthenticatedPolicy};
use crate::error::Result;
use crate::store::StoreRegistry;

/// One validated configuration, with the engine bound to its store driver.
struct GateSettings {
    criterion: BanCriterion,
    unauthenticated: UnauthenticatedPolicy,
    rules: RouteRules,
    driver: String,
    engine: BanEngine,
}

impl GateSettings {
    fn build(config: &SuperbanConfig, registry: &StoreRegistry) -> Result<Self> {
        config.validate()?;
        let criterion = config.criterion()?;
        let stores = registry.resolve(&config.cache_driver)?;

        Ok(Self {
            criterion,
            unauthenticated: config.unauthenticated,
            rules: config.rules.clone(),
            driver: config.cache_driver.clone(),
            engine: BanEngine::new(stores),
        })
    }

    fn identify(&self, ctx: &RequestContext) -> Option<IdentityKey> {
        if let Some(key) = resolve(self.criterion, ctx) {
            return Some(key);
        }
        // The address fallback only stands in for a missing user
        if !self.criterion.requires_user() {
            return None;
        }
        match self.unauthenticated {
            UnauthenticatedPolicy::Allow => None,
            UnauthenticatedPolicy::Ip => resolve(BanCriterion::Ip, ctx),
        }
    }
}

/// Request admission gate.
pub struct Superban {
    settings: RwLock<Arc<GateSettings>>,
    clock: Arc<dyn Clock>,
}

impl Superban {
    /// Build a gate from `config`, taking stores from `registry`.
    ///
    /// Fails with `InvalidCriterion` or `UnknownDriver` before any store is touched.
    pub fn new(config: &SuperbanConfig, registry: &StoreRegistry, clock: Arc<dyn Clock>) -> Result<Self> {
        let settings = GateSettings::build(config, registry)?;
        info!(
            criterion = %settings.criterion,
            driver = %settings.driver,
            unauthenticated = ?settings.unauthenticated,
            "Gate configured"
        );
        Ok(Self {
            settings: RwLock::new(Arc::new(settings)),
            clock,
        })
    }

    /// Replace the active configuration.
    ///
    /// On error the previous configuration stays in effect. Evaluations
    /// already running finish on the snapshot they started with.
    pub fn reconfigure(&self, config: &SuperbanConfig, registry: &StoreRegistry) -> Result<()> {
        let settings = match GateSettings::build(config, registry) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "Rejected reconfiguration, keeping current settings");
                return Err(e);
            }
        };
        info!(
            criterion = %settings.criterion,
            driver = %settings.driver,
            "Gate reconfigured"
        );
        *self.settings.write() = Arc::new(settings);
        Ok(())
    }

    /// The criterion currently in effect.
    pub fn criterion(&self) -> BanCriterion {
        self.snapshot().criterion
    }

    /// Decide whether the request described by `ctx` may proceed under `limits`.
    ///
    /// Requests the criterion cannot identify are let through uncounted
    /// unless the configuration falls back to the network origin.
    #[instrument(skip(self, ctx, limits), fields(ip = %ctx.ip, max_attempts = limits.max_attempts))]
    pub async fn evaluate(&self, ctx: &RequestContext, limits: &Limits) -> Result<Decision> {
        let settings = self.snapshot();

        let Some(key) = settings.identify(ctx) else {
            warn!(
                criterion = %settings.criterion,
                "No identity for request, letting it through unthrottled"
            );
            return Ok(Decision::Allow);
        };

        let decision = settings.engine.decide(&key, limits, self.clock.now()).await?;
        debug!(key = %key, decision = ?decision, "Request evaluated");
        Ok(decision)
    }

    /// Evaluate a request against the route rules for `path`.
    ///
    /// Returns `None` when no rule covers the path.
    pub async fn evaluate_route(&self, ctx: &RequestContext, path: &str) -> Result<Option<Decision>> {
        let limits = match self.snapshot().rules.find_limits(path) {
            Some(limits) => *limits,
            None => {
                debug!(path = %path, "No rule covers path");
                return Ok(None);
            }
        };
        self.evaluate(ctx, &limits).await.map(Some)
    }

    /// Lift any ban on the identity behind `ctx` and reset its attempts.
    ///
    /// Returns `false` when the request has no identity under the current criterion.
    pub async fn pardon(&self, ctx: &RequestContext) -> Result<bool> {
        let settings = self.snapshot();
        let Some(key) = settings.identify(ctx) else {
            return Ok(false);
        };

        let stores = settings.engine.stores();
        stores.bans.forget(key.as_str()).await?;
        stores.attempts.clear(key.as_str()).await?;
        info!(key = %key, "Identity pardoned");
        Ok(true)
    }

    fn snapshot(&self) -> Arc<GateSettings> {
        self.settings.read().clone()
    }
}
