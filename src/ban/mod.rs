//! Ban decision logic: identity resolution, limits and the decision engine.

mod decision;
mod engine;
mod identity;
mod limits;
mod rules;

pub use decision::{Decision, Rejection, TOO_MANY_REQUESTS};
pub use engine::BanEngine;
pub use identity::{resolve, AuthenticatedUser, BanCriterion, IdentityKey, RequestContext};
pub use limits::Limits;
pub use rules::{RouteRule, RouteRules};
