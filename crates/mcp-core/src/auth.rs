//! The `AuthInfo` capsule (spec §3): opaque to the core, attached to each
//! inbound request by the transport boundary and passed unchanged into
//! handlers. OAuth 2.1 credential acquisition is explicitly out of scope
//! (spec §1); this crate only carries the already-resolved result of it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Opaque, cloneable auth context threaded through a request's lifetime.
///
/// The core never interprets `subject` or `scopes`; it exists so the
/// capability gate and application handlers can make their own decisions
/// without the protocol engine knowing anything about OAuth, API keys, or
/// mTLS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthInfo {
    pub subject: Arc<str>,
    pub scopes: Arc<[String]>,
    #[serde(default)]
    pub claims: HashMap<String, serde_json::Value>,
}

impl AuthInfo {
    pub fn new(subject: impl Into<Arc<str>>, scopes: impl Into<Arc<[String]>>) -> Self {
        Self {
            subject: subject.into(),
            scopes: scopes.into(),
            claims: HashMap::new(),
        }
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}
