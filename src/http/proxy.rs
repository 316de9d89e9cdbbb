//! Request forwarding.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → routing (prefix → service, strip prefix)
//!     → cache (cacheable route only; a hit skips everything below)
//!     → registry (service → base URL)
//!     → security (buffer body, filter headers)
//!     → resilience (breaker admission + deadline around the backend call)
//!     → response (verbatim on success, opaque 503 on failure)
//! ```
//!
//! # Design Decisions
//! - Upstream 5xx counts against the breaker and as a reroute, but the backend's
//!   response still reaches the client unchanged
//! - Upstream 4xx is a success as far as the breaker is concerned
//! - Fast-fail rejections are not reroutes
//! - Only the cacheable route is buffered, and only a request without a query
//!   string is cacheable; every other response streams through
//! - The call deadline covers the response head; a buffered cacheable body is
//!   read inside it as well

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Request, Uri};
use axum::response::{IntoResponse, Response};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use thiserror::Error;
use url::Url;

use crate::cache::{CachedResponse, ResponseCache};
use crate::config::{CacheConfig, GatewayConfig};
use crate::error::GatewayError;
use crate::http::request::request_id;
use crate::http::response::{buffer_response, relay_response, Buffered};
use crate::observability::metrics;
use crate::registry::BackendRegistry;
use crate::resilience::{CallError, ServiceGuard};
use crate::routing::Router;
use crate::security::headers::forwardable_headers;
use crate::security::limits::buffer_body;

pub type HttpClient = Client<HttpConnector, Body>;

/// The single route whose successful responses are cached.
#[derive(Debug, Clone)]
pub struct CacheRoute {
    pub service: String,
    pub method: Method,
    /// Path after prefix stripping.
    pub path: String,
    /// Backend path to fetch instead of `path`, if different.
    pub upstream_path: Option<String>,
    pub key: String,
    pub ttl: Duration,
}

impl CacheRoute {
    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let method = match Method::from_bytes(config.method.to_ascii_uppercase().as_bytes()) {
            Ok(method) => method,
            Err(_) => {
                tracing::warn!(method = %config.method, "Invalid cache method, caching disabled");
                return None;
            }
        };
        Some(Self {
            service: config.service.clone(),
            method,
            path: config.path.clone(),
            upstream_path: config.upstream_path.clone(),
            key: config.key.clone(),
            ttl: config.ttl(),
        })
    }

    fn matches(&self, service: &str, method: &Method, path: &str) -> bool {
        self.service == service && &self.method == method && self.path == path
    }
}

/// Why an admitted backend call failed.
#[derive(Debug, Error)]
enum InvokeError {
    #[error("transport error: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),

    #[error("failed reading backend response: {0}")]
    Body(#[from] axum::Error),

    #[error("backend answered {}", .0.status())]
    ServerError(Response),
}

/// A backend answer that did not fail the call.
enum Reply {
    /// Cacheable route, body fully read.
    Buffered(CachedResponse),
    Streamed(Response),
}

/// A request ready to be sent, with everything the backend is allowed to see.
struct Outbound {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
}

/// Forwards requests to backends through their breakers.
#[derive(Debug, Clone)]
pub struct Forwarder {
    routes: Arc<Router>,
    registry: BackendRegistry,
    guards: Arc<HashMap<String, ServiceGuard>>,
    cache: ResponseCache,
    cache_route: Option<CacheRoute>,
    client: HttpClient,
    max_body_bytes: usize,
    max_entry_bytes: usize,
}

impl Forwarder {
    pub fn new(
        config: &GatewayConfig,
        registry: BackendRegistry,
        guards: Arc<HashMap<String, ServiceGuard>>,
        cache: ResponseCache,
        client: HttpClient,
    ) -> Self {
        Self {
            routes: Arc::new(Router::from_config(&config.services)),
            registry,
            guards,
            cache,
            cache_route: CacheRoute::from_config(&config.cache),
            client,
            max_body_bytes: config.limits.max_body_bytes,
            max_entry_bytes: config.cache.max_entry_bytes,
        }
    }

    pub fn cache_route(&self) -> Option<&CacheRoute> {
        self.cache_route.as_ref()
    }

    /// Forward one request and render the outcome.
    pub async fn forward(&self, request: Request<Body>) -> Response {
        let start = Instant::now();
        let method = request.method().clone();
        let request_id = request_id(&request);

        let (service, result) = self.dispatch(request, &request_id).await;
        let response = result.unwrap_or_else(IntoResponse::into_response);

        metrics::record_request(
            method.as_str(),
            response.status().as_u16(),
            service.as_deref().unwrap_or("none"),
            start,
        );
        response
    }

    async fn dispatch(
        &self,
        request: Request<Body>,
        request_id: &str,
    ) -> (Option<String>, Result<Response, GatewayError>) {
        let path = request.uri().path().to_string();
        let Some(route) = self.routes.match_path(&path) else {
            tracing::warn!(request_id = %request_id, path = %path, "No route matched");
            return (None, Err(GatewayError::UnknownRoute { path: path.clone() }));
        };
        let service = route.service.to_string();
        let forward_path = route.forward_path.to_string();

        let result = self.forward_to(&service, &forward_path, request, request_id).await;
        (Some(service), result)
    }

    async fn forward_to(
        &self,
        service: &str,
        forward_path: &str,
        request: Request<Body>,
        request_id: &str,
    ) -> Result<Response, GatewayError> {
        // Requests carrying a query string never read or populate the cache.
        let cache_route = self.cache_route.as_ref().filter(|route| {
            request.uri().query().is_none() && route.matches(service, request.method(), forward_path)
        });

        if let Some(route) = cache_route {
            let hit = self.cache.get(&route.key);
            metrics::record_cache_lookup(hit.is_some());
            if let Some(cached) = hit {
                tracing::debug!(request_id = %request_id, service, key = %route.key, "Served from cache");
                return Ok(cached.into_response());
            }
        }

        let guard = self.guards.get(service).ok_or_else(|| GatewayError::BackendUnreachable {
            service: service.to_string(),
            reason: "no circuit breaker configured".into(),
        })?;
        let base = self.registry.resolve(service).ok_or_else(|| {
            tracing::warn!(request_id = %request_id, service, "Service not registered");
            GatewayError::BackendUnreachable {
                service: service.to_string(),
                reason: "service not registered".into(),
            }
        })?;

        let (parts, body) = request.into_parts();
        let body = buffer_body(body, self.max_body_bytes)
            .await
            .map_err(|e| GatewayError::BadRequest(e.to_string()))?;

        let target_path = cache_route
            .and_then(|route| route.upstream_path.as_deref())
            .unwrap_or(forward_path);
        let uri = upstream_uri(&base, target_path, parts.uri.query())
            .map_err(|e| GatewayError::BadRequest(e.to_string()))?;

        let outbound = Outbound {
            method: parts.method,
            uri,
            headers: forwardable_headers(&parts.headers, !body.is_empty()),
            body,
        };

        match guard.breaker.call(self.invoke(outbound, cache_route.is_some())).await {
            Ok(Reply::Streamed(response)) => Ok(response),
            Ok(Reply::Buffered(response)) => {
                if let Some(route) = cache_route {
                    if response.is_success() {
                        self.cache.set(route.key.clone(), response.clone(), route.ttl);
                        tracing::debug!(request_id = %request_id, service, key = %route.key, "Cached response");
                    }
                }
                Ok(response.into_response())
            }
            Err(CallError::Open) => {
                tracing::warn!(
                    request_id = %request_id,
                    service,
                    state = %guard.breaker.state(),
                    "Circuit breaker open, failing fast"
                );
                Err(GatewayError::BreakerOpen {
                    service: service.to_string(),
                })
            }
            Err(err) => {
                let state = guard.breaker.state();
                guard.reroutes.record_reroute();
                match err {
                    CallError::Inner(InvokeError::ServerError(response)) => {
                        tracing::warn!(
                            request_id = %request_id,
                            service,
                            state = %state,
                            status = response.status().as_u16(),
                            "Backend returned server error"
                        );
                        Err(GatewayError::UpstreamError {
                            service: service.to_string(),
                            response,
                        })
                    }
                    other => {
                        tracing::error!(
                            request_id = %request_id,
                            service,
                            state = %state,
                            error = %other,
                            "Backend call failed"
                        );
                        Err(GatewayError::BackendUnreachable {
                            service: service.to_string(),
                            reason: other.to_string(),
                        })
                    }
                }
            }
        }
    }

    async fn invoke(&self, outbound: Outbound, cacheable: bool) -> Result<Reply, InvokeError> {
        let mut request = Request::new(Body::from(outbound.body));
        *request.method_mut() = outbound.method;
        *request.uri_mut() = outbound.uri;
        *request.headers_mut() = outbound.headers;

        let response = self.client.request(request).await?;
        if response.status().is_server_error() {
            return Err(InvokeError::ServerError(relay_response(response)));
        }
        if !cacheable {
            return Ok(Reply::Streamed(relay_response(response)));
        }

        match buffer_response(response, self.max_entry_bytes).await? {
            Buffered::Complete(response) => Ok(Reply::Buffered(response)),
            Buffered::Oversized(response) => {
                tracing::debug!(limit = self.max_entry_bytes, "Cacheable response too large, relaying uncached");
                Ok(Reply::Streamed(response))
            }
        }
    }
}

/// Join a base URL with a stripped path and the original query string.
fn upstream_uri(base: &Url, path: &str, query: Option<&str>) -> Result<Uri, axum::http::uri::InvalidUri> {
    let mut target = base.as_str().trim_end_matches('/').to_string();
    if !path.starts_with('/') {
        target.push('/');
    }
    target.push_str(path);
    if let Some(query) = query {
        target.push('?');
        target.push_str(query);
    }
    target.parse()
}
