//! Typed capability structs exchanged during `initialize`, and the gate
//! (C9) that checks a method/notification against them before dispatch.
//!
//! Grounded in the teacher's `turbomcp_core::features` constants, made
//! concrete here as typed bags instead of bare strings so the gate has
//! something to pattern-match on.

use serde::{Deserialize, Serialize};

use crate::error::McpError;

/// Capabilities a server declares in its `initialize` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ListChangedCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<ListChangedCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<EmptyCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<EmptyCapability>,
}

/// Capabilities a client declares in its `initialize` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<EmptyCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elicitation: Option<EmptyCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots: Option<ListChangedCapability>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmptyCapability {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListChangedCapability {
    #[serde(default, rename = "listChanged")]
    pub list_changed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourcesCapability {
    #[serde(default, rename = "listChanged")]
    pub list_changed: bool,
    #[serde(default)]
    pub subscribe: bool,
}

/// The method/notification namespaces the gate understands. A capability
/// check walks `method.split('/').next()` against this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityDomain {
    Tools,
    Resources,
    Prompts,
    Logging,
    Sampling,
    Elicitation,
    Roots,
    Tasks,
    /// Methods with no gate: `initialize`, `ping`, cancellation, progress.
    Ungated,
}

impl CapabilityDomain {
    pub fn for_method(method: &str) -> Self {
        match method.split('/').next().unwrap_or("") {
            "tools" => Self::Tools,
            "resources" => Self::Resources,
            "prompts" => Self::Prompts,
            "logging" => Self::Logging,
            "sampling" => Self::Sampling,
            "elicitation" => Self::Elicitation,
            "roots" => Self::Roots,
            "tasks" => Self::Tasks,
            _ => Self::Ungated,
        }
    }
}

/// Assert that `method` is permitted under `caps`. Violations raise
/// `InvalidRequest` per spec §4.3.
pub fn assert_server_capability(caps: &ServerCapabilities, method: &str) -> Result<(), McpError> {
    let allowed = match CapabilityDomain::for_method(method) {
        CapabilityDomain::Tools => caps.tools.is_some(),
        CapabilityDomain::Resources => caps.resources.is_some(),
        CapabilityDomain::Prompts => caps.prompts.is_some(),
        CapabilityDomain::Logging => caps.logging.is_some(),
        CapabilityDomain::Tasks => caps.tasks.is_some(),
        CapabilityDomain::Ungated => true,
        CapabilityDomain::Sampling | CapabilityDomain::Elicitation | CapabilityDomain::Roots => {
            // these are server-initiated calls into the client; gated by
            // `assert_client_capability` instead.
            true
        }
    };
    if allowed {
        Ok(())
    } else {
        Err(McpError::capability_denied(method))
    }
}

/// Assert that a server-initiated call (`sampling/*`, `elicitation/*`,
/// `roots/*`) is permitted by the client's declared capabilities.
pub fn assert_client_capability(caps: &ClientCapabilities, method: &str) -> Result<(), McpError> {
    let allowed = match CapabilityDomain::for_method(method) {
        CapabilityDomain::Sampling => caps.sampling.is_some(),
        CapabilityDomain::Elicitation => caps.elicitation.is_some(),
        CapabilityDomain::Roots => caps.roots.is_some(),
        _ => true,
    };
    if allowed {
        Ok(())
    } else {
        Err(McpError::capability_denied(method))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denies_ungranted_tools_capability() {
        let caps = ServerCapabilities::default();
        assert!(assert_server_capability(&caps, "tools/call").is_err());
    }

    #[test]
    fn allows_ping_regardless() {
        let caps = ServerCapabilities::default();
        assert!(assert_server_capability(&caps, "ping").is_ok());
    }

    #[test]
    fn allows_granted_tools_capability() {
        let caps = ServerCapabilities {
            tools: Some(ListChangedCapability { list_changed: true }),
            ..Default::default()
        };
        assert!(assert_server_capability(&caps, "tools/call").is_ok());
    }

    #[test]
    fn denies_ungranted_sampling_from_client() {
        let caps = ClientCapabilities::default();
        assert!(assert_client_capability(&caps, "sampling/createMessage").is_err());
    }
}
