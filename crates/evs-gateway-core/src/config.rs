//! Configuration types for the event gateway
//!
//! Serde-backed layered configuration with per-field defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the gateway runtime
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Handler (routing/produce) configuration
    #[serde(default)]
    pub handler: HandlerConfig,

    /// Shovel (subscription loop) configuration
    #[serde(default)]
    pub shovel: ShovelConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ============================================================================
// Handler Configuration
// ============================================================================

/// Gateway handler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Wait for produce confirmation before reporting success.
    ///
    /// When false, the inbound message is acknowledged out-of-band by the
    /// last relevant produce completion.
    #[serde(default = "default_true")]
    pub await_produce: bool,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            await_produce: true,
        }
    }
}

// ============================================================================
// Shovel Configuration
// ============================================================================

/// Subscription loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShovelConfig {
    /// How many events to read from the source per poll
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Delay between polls when the source is caught up
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub poll_interval: Duration,

    /// Source identifier stamped into outgoing metadata
    #[serde(default = "default_source_id")]
    pub source_id: String,
}

fn default_batch_size() -> usize {
    100
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(50)
}

fn default_source_id() -> String {
    "evs-gateway".to_string()
}

impl Default for ShovelConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            poll_interval: default_poll_interval(),
            source_id: default_source_id(),
        }
    }
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level filter (overridden by RUST_LOG)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON-formatted logs
    #[serde(default = "default_true")]
    pub json_logs: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: GatewayConfig = serde_json::from_str("{}").unwrap();
        assert!(config.handler.await_produce);
        assert_eq!(config.shovel.batch_size, 100);
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn durations_parse_from_humantime() {
        let config: ShovelConfig =
            serde_json::from_str(r#"{"poll_interval": "2s"}"#).unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(2));
    }
}
