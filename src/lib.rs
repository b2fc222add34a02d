//! Superban - request admission gate
//!
//! This crate decides, per identity (IP address, user id or email), whether a
//! request should be let through or rejected because the identity is
//! temporarily banned. Identities that exceed an attempt limit inside a
//! decay window are banned for a configured period. All ban and attempt
//! state lives in pluggable expiring stores.

pub mod ban;
pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod store;

pub use ban::{Decision, Limits, RequestContext};
pub use error::{Result, SuperbanError};
pub use gate::Superban;
