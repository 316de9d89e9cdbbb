//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the edge gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Backend services, each reachable under its own path prefix.
    pub services: Vec<ServiceConfig>,

    /// Per-backend circuit breaker settings.
    pub breaker: BreakerConfig,

    /// Reroute tracker settings.
    pub reroute: RerouteConfig,

    /// The single cacheable read route.
    pub cache: CacheConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request size limits.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            services: vec![
                ServiceConfig {
                    name: "user".to_string(),
                    prefix: "/user".to_string(),
                    url: "http://user_management_service:5000".to_string(),
                },
                ServiceConfig {
                    name: "competition".to_string(),
                    prefix: "/competition".to_string(),
                    url: "http://competition_service:5001".to_string(),
                },
            ],
            breaker: BreakerConfig::default(),
            reroute: RerouteConfig::default(),
            cache: CacheConfig::default(),
            timeouts: TimeoutConfig::default(),
            limits: LimitsConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// A backend service and the path prefix it is mounted under.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Logical service name, also the breaker name.
    pub name: String,

    /// Path prefix to match, e.g. "/user".
    pub prefix: String,

    /// Base URL the registry is seeded with.
    pub url: String,
}

/// Circuit breaker configuration, shared by every backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Deadline for a single backend call in milliseconds. Expiry counts as a failure.
    pub call_timeout_ms: u64,

    /// Error rate (percent of calls in the rolling window) at which the breaker opens.
    pub error_threshold_percentage: u8,

    /// Minimum number of calls in the rolling window before the error rate is evaluated.
    pub volume_threshold: u32,

    /// Length of the rolling statistics window in milliseconds.
    pub rolling_window_ms: u64,

    /// Number of buckets the rolling window is divided into.
    pub rolling_buckets: u32,

    /// Time spent in OPEN before trial calls are allowed, in milliseconds.
    pub reset_timeout_ms: u64,

    /// Maximum concurrent trial calls in HALF_OPEN.
    pub half_open_max_trials: u32,

    /// Trial successes required to close again.
    pub half_open_success_threshold: u32,
}

impl BreakerConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn rolling_window(&self) -> Duration {
        Duration::from_millis(self.rolling_window_ms)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 2000,
            error_threshold_percentage: 50,
            volume_threshold: 3,
            rolling_window_ms: 10_000,
            rolling_buckets: 10,
            reset_timeout_ms: 10_000,
            half_open_max_trials: 1,
            half_open_success_threshold: 1,
        }
    }
}

/// Reroute tracker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RerouteConfig {
    /// Reroutes within one window that force-trip the breaker.
    pub threshold: u32,

    /// Fixed window length in milliseconds. The count resets on every tick.
    pub window_ms: u64,
}

impl RerouteConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for RerouteConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            window_ms: 5000,
        }
    }
}

/// Response cache configuration for the one cacheable read route.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the cache.
    pub enabled: bool,

    /// Service the cacheable route belongs to.
    pub service: String,

    /// HTTP method of the cacheable route.
    pub method: String,

    /// Path (after prefix stripping) of the cacheable route.
    pub path: String,

    /// Path requested from the backend on a miss. Defaults to `path` when unset.
    pub upstream_path: Option<String>,

    /// Cache key the response is stored under.
    pub key: String,

    /// Time-to-live in seconds.
    pub ttl_secs: u64,

    /// Interval of the expired-entry sweep in seconds.
    pub purge_interval_secs: u64,

    /// Largest response body stored; bigger responses are relayed uncached.
    pub max_entry_bytes: usize,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service: "competition".to_string(),
            method: "GET".to_string(),
            path: "/active".to_string(),
            upstream_path: Some("/competitions".to_string()),
            key: "activeCompetitions".to_string(),
            ttl_secs: 3600,
            purge_interval_secs: 60,
            max_entry_bytes: 1024 * 1024,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Ceiling for the whole inbound request in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request and buffered response body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error), used when RUST_LOG is unset.
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_gateway_layout() {
        let config = GatewayConfig::default();
        assert_eq!(config.services.len(), 2);
        assert_eq!(config.services[0].prefix, "/user");
        assert_eq!(config.breaker.call_timeout(), Duration::from_millis(2000));
        assert_eq!(config.reroute.threshold, 5);
        assert_eq!(config.reroute.window(), Duration::from_secs(5));
        assert_eq!(config.cache.ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [breaker]
            reset_timeout_ms = 500

            [[services]]
            name = "user"
            prefix = "/user"
            url = "http://127.0.0.1:5000"
            "#,
        )
        .unwrap();

        assert_eq!(config.breaker.reset_timeout_ms, 500);
        assert_eq!(config.breaker.error_threshold_percentage, 50);
        assert_eq!(config.services.len(), 1);
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
    }
}
