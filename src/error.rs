//! Request-path errors and their client-facing rendering.
//!
//! `BackendUnreachable` and `BreakerOpen` render identically so a client can't
//! tell a tripped breaker from a dead backend.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

pub const UNAVAILABLE_MESSAGE: &str = "Something went wrong. Please try again later.";
pub const NOT_FOUND_MESSAGE: &str = "No matching route found";

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Network error, call timeout, or no registered address.
    #[error("backend '{service}' unreachable: {reason}")]
    BackendUnreachable { service: String, reason: String },

    /// Rejected by the breaker without contacting the backend.
    #[error("circuit breaker for '{service}' is open")]
    BreakerOpen { service: String },

    /// The backend answered with an error status; passed through verbatim.
    #[error("backend '{service}' answered {}", .response.status())]
    UpstreamError { service: String, response: Response },

    #[error("no route for '{path}'")]
    UnknownRoute { path: String },

    #[error("request body rejected: {0}")]
    BadRequest(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::BackendUnreachable { .. } | GatewayError::BreakerOpen { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::UpstreamError { response, .. } => response.status(),
            GatewayError::UnknownRoute { .. } => StatusCode::NOT_FOUND,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            GatewayError::BackendUnreachable { .. } | GatewayError::BreakerOpen { .. } => {
                (status, Json(json!({ "error": UNAVAILABLE_MESSAGE }))).into_response()
            }
            GatewayError::UpstreamError { response, .. } => response,
            GatewayError::UnknownRoute { .. } => {
                (status, Json(json!({ "error": NOT_FOUND_MESSAGE }))).into_response()
            }
            GatewayError::BadRequest(message) => (status, Json(json!({ "error": message }))).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::http::header;

    use crate::cache::CachedResponse;

    async fn body_of(response: Response) -> Bytes {
        axum::body::to_bytes(response.into_body(), 1024).await.unwrap()
    }

    #[tokio::test]
    async fn test_open_and_unreachable_look_the_same() {
        let open = GatewayError::BreakerOpen { service: "user".into() }.into_response();
        let down = GatewayError::BackendUnreachable {
            service: "user".into(),
            reason: "connection refused".into(),
        }
        .into_response();

        assert_eq!(open.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(down.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_of(open).await, body_of(down).await);
    }

    #[tokio::test]
    async fn test_upstream_error_passes_through() {
        let response = GatewayError::UpstreamError {
            service: "user".into(),
            response: CachedResponse {
                status: 500,
                content_type: Some("text/plain".into()),
                body: Bytes::from_static(b"db down"),
            }
            .into_response(),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
        assert_eq!(body_of(response).await, "db down");
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let response = GatewayError::UnknownRoute { path: "/foo/bar".into() }.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
