//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (cache route references an existing service)
//! - Validate value ranges (timeouts > 0, percentages within 1..=100)
//! - Detect conflicting prefixes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::registry::parse_base_url;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid bind address '{0}'")]
    BindAddress(String),

    #[error("no services configured")]
    NoServices,

    #[error("duplicate service name '{0}'")]
    DuplicateService(String),

    #[error("duplicate prefix '{0}'")]
    DuplicatePrefix(String),

    #[error("service '{service}': prefix '{prefix}' must start with '/' and name a path segment")]
    InvalidPrefix { service: String, prefix: String },

    #[error("service '{service}': invalid url '{url}'")]
    InvalidUrl { service: String, url: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("breaker.error_threshold_percentage must be within 1..=100, got {0}")]
    ThresholdPercentage(u8),

    #[error("breaker.rolling_buckets ({buckets}) must not exceed breaker.rolling_window_ms ({window_ms})")]
    RollingBuckets { buckets: u32, window_ms: u64 },

    #[error("cache route references unknown service '{0}'")]
    UnknownCacheService(String),

    #[error("cache method '{0}' is not a valid HTTP method")]
    CacheMethod(String),

    #[error("cache path '{0}' must start with '/'")]
    CachePath(String),

    #[error("observability.log_format must be 'pretty' or 'json', got '{0}'")]
    LogFormat(String),
}

/// Check a parsed configuration, collecting every violation.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    if config.services.is_empty() {
        errors.push(ValidationError::NoServices);
    }

    let mut names = HashSet::new();
    let mut prefixes = HashSet::new();
    for service in &config.services {
        if !names.insert(service.name.as_str()) {
            errors.push(ValidationError::DuplicateService(service.name.clone()));
        }
        if !prefixes.insert(service.prefix.as_str()) {
            errors.push(ValidationError::DuplicatePrefix(service.prefix.clone()));
        }
        if !is_valid_prefix(&service.prefix) {
            errors.push(ValidationError::InvalidPrefix {
                service: service.name.clone(),
                prefix: service.prefix.clone(),
            });
        }
        if !is_valid_base_url(&service.url) {
            errors.push(ValidationError::InvalidUrl {
                service: service.name.clone(),
                url: service.url.clone(),
            });
        }
    }

    let breaker = &config.breaker;
    for (field, value) in [
        ("breaker.call_timeout_ms", breaker.call_timeout_ms),
        ("breaker.rolling_window_ms", breaker.rolling_window_ms),
        ("breaker.reset_timeout_ms", breaker.reset_timeout_ms),
        ("breaker.rolling_buckets", breaker.rolling_buckets as u64),
        ("breaker.half_open_max_trials", breaker.half_open_max_trials as u64),
        ("breaker.half_open_success_threshold", breaker.half_open_success_threshold as u64),
        ("reroute.threshold", config.reroute.threshold as u64),
        ("reroute.window_ms", config.reroute.window_ms),
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("limits.max_body_bytes", config.limits.max_body_bytes as u64),
    ] {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    if !(1..=100).contains(&breaker.error_threshold_percentage) {
        errors.push(ValidationError::ThresholdPercentage(breaker.error_threshold_percentage));
    }

    // Each bucket must span at least one millisecond.
    if u64::from(breaker.rolling_buckets) > breaker.rolling_window_ms {
        errors.push(ValidationError::RollingBuckets {
            buckets: breaker.rolling_buckets,
            window_ms: breaker.rolling_window_ms,
        });
    }

    let cache = &config.cache;
    if cache.enabled {
        if !names.contains(cache.service.as_str()) {
            errors.push(ValidationError::UnknownCacheService(cache.service.clone()));
        }
        if cache.method.parse::<axum::http::Method>().is_err() {
            errors.push(ValidationError::CacheMethod(cache.method.clone()));
        }
        if !cache.path.starts_with('/') {
            errors.push(ValidationError::CachePath(cache.path.clone()));
        }
        if let Some(upstream) = &cache.upstream_path {
            if !upstream.starts_with('/') {
                errors.push(ValidationError::CachePath(upstream.clone()));
            }
        }
        for (field, value) in [
            ("cache.ttl_secs", cache.ttl_secs),
            ("cache.purge_interval_secs", cache.purge_interval_secs),
            ("cache.max_entry_bytes", cache.max_entry_bytes as u64),
        ] {
            if value == 0 {
                errors.push(ValidationError::Zero { field });
            }
        }
    }

    if !matches!(config.observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::LogFormat(config.observability.log_format.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_valid_prefix(prefix: &str) -> bool {
    prefix.len() > 1 && prefix.starts_with('/') && !prefix.ends_with('/')
}

fn is_valid_base_url(raw: &str) -> bool {
    parse_base_url(raw).is_some()
}
