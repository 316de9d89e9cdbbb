//! Request and response size limits.
//!
//! # Responsibilities
//! - Reject inbound bodies over `limits.max_body_bytes` (413 Payload Too Large)
//! - Bound how much of an upstream response the gateway buffers
//!
//! # Design Decisions
//! - Inbound limit enforced by middleware before the handler reads the body
//! - Upstream bodies are buffered so they can be cached and classified

use axum::body::{Body, Bytes};
use tower_http::limit::RequestBodyLimitLayer;

use crate::config::LimitsConfig;

pub fn body_limit_layer(config: &LimitsConfig) -> RequestBodyLimitLayer {
    RequestBodyLimitLayer::new(config.max_body_bytes)
}

/// Collect a body, failing once it grows past `limit` bytes.
pub async fn buffer_body(body: Body, limit: usize) -> Result<Bytes, axum::Error> {
    axum::body::to_bytes(body, limit).await
}
