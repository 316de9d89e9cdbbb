//! Operational endpoints served by the gateway itself.
//!
//! These routes are matched before the forwarding fallback, so they shadow any
//! backend path with the same name.

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};

use self::handlers::*;
use crate::http::server::AppState;

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/status", get(get_status))
        .route("/breaker-status", get(get_breaker_status))
        .route("/breakers/{service}/reset", post(reset_breaker))
        .route("/services", get(get_services))
        .route("/register", post(register_service))
        .route("/deregister", post(deregister_service))
}
