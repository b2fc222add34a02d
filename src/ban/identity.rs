//! Identity key derivation from a request.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::error::SuperbanError;

/// The dimension used to key ban and attempt state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BanCriterion {
    /// The authenticated user's id
    UserId,
    /// The authenticated user's email address
    Email,
    /// The request's network origin
    Ip,
}

impl BanCriterion {
    /// The configuration token for this criterion.
    pub fn as_str(&self) -> &'static str {
        match self {
            BanCriterion::UserId => "user_id",
            BanCriterion::Email => "email",
            BanCriterion::Ip => "ip",
        }
    }

    /// Whether resolving this criterion needs an authenticated user.
    pub fn requires_user(&self) -> bool {
        !matches!(self, BanCriterion::Ip)
    }
}

impl FromStr for BanCriterion {
    type Err = SuperbanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user_id" => Ok(BanCriterion::UserId),
            "email" => Ok(BanCriterion::Email),
            "ip" => Ok(BanCriterion::Ip),
            other => Err(SuperbanError::InvalidCriterion(other.to_string())),
        }
    }
}

impl fmt::Display for BanCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated principal attached to a request, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub id: String,
    pub email: String,
}

/// Read-only view of the request the gate is asked about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// The authenticated user, when the caller has one
    #[serde(default)]
    pub user: Option<AuthenticatedUser>,
    /// The network origin of the request
    pub ip: IpAddr,
}

impl RequestContext {
    /// An anonymous request from `ip`.
    pub fn anonymous(ip: IpAddr) -> Self {
        Self { user: None, ip }
    }

    /// An authenticated request from `ip`.
    pub fn authenticated(ip: IpAddr, id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user: Some(AuthenticatedUser {
                id: id.into(),
                email: email.into(),
            }),
            ip,
        }
    }
}

/// A key that identifies one origin in the ban and attempt stores.
///
/// The key is the criterion token and the resolved value joined by `:`,
/// so user id `1` and an email or address never share state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Build a key for `value` under `criterion`.
    ///
    /// Returns `None` when the value is empty; an empty identity cannot be throttled.
    pub fn new(criterion: BanCriterion, value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        Some(Self(format!("{}:{}", criterion, value)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the identity key for `ctx` under `criterion`.
///
/// `Ip` always resolves. `UserId` and `Email` resolve only when the request
/// carries an authenticated user.
pub fn resolve(criterion: BanCriterion, ctx: &RequestContext) -> Option<IdentityKey> {
    match criterion {
        BanCriterion::UserId => ctx
            .user
            .as_ref()
            .and_then(|u| IdentityKey::new(criterion, &u.id)),
        BanCriterion::Email => ctx
            .user
            .as_ref()
            .and_then(|u| IdentityKey::new(criterion, &u.email)),
        BanCriterion::Ip => IdentityKey::new(criterion, &ctx.ip.to_string()),
    }
}
