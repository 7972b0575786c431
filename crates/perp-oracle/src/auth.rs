//! Caller authorization.
//!
//! The store never decides who may write; it asks an injected
//! [`Authorizer`]. Permission management itself lives outside this crate.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identity of whoever invokes a store operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallerId(pub String);

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Capabilities the store checks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// May push index and last-price observations.
    PricePusher,
    /// May change sampling intervals and the funding period.
    Configurator,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::PricePusher => f.write_str("price_pusher"),
            Role::Configurator => f.write_str("configurator"),
        }
    }
}

/// Capability check consulted before every mutating operation.
pub trait Authorizer: Send + Sync {
    /// Whether `caller` currently holds `role`.
    fn is_allowed(&self, caller: &CallerId, role: Role) -> bool;
}

/// Grants every role to every caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn is_allowed(&self, _caller: &CallerId, _role: Role) -> bool {
        true
    }
}

/// Explicit per-caller role grants.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    grants: HashMap<CallerId, HashSet<Role>>,
}

impl AllowList {
    /// Create an empty allow list (denies everything).
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`AllowList::grant`].
    pub fn with_grant(mut self, caller: impl Into<CallerId>, role: Role) -> Self {
        self.grant(caller, role);
        self
    }

    /// Give `caller` the `role`.
    pub fn grant(&mut self, caller: impl Into<CallerId>, role: Role) {
        self.grants.entry(caller.into()).or_default().insert(role);
    }
}

impl Authorizer for AllowList {
    fn is_allowed(&self, caller: &CallerId, role: Role) -> bool {
        self.grants
            .get(caller)
            .is_some_and(|roles| roles.contains(&role))
    }
}
