//! Protocol engine configuration.

use std::time::Duration;

/// Tunables for a [`crate::engine::ProtocolEngine`].
#[derive(Debug, Clone)]
pub struct ProtocolEngineConfig {
    /// Default outbound request timeout (spec §4.3: "default 60s").
    pub default_timeout: Duration,
    /// Whether an intervening progress notification restarts an outbound
    /// request's timeout (spec §4.3).
    pub reset_timeout_on_progress: bool,
}

impl Default for ProtocolEngineConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(60),
            reset_timeout_on_progress: true,
        }
    }
}
