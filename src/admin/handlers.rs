use std::collections::BTreeMap;
use std::time::SystemTime;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::http::server::AppState;
use crate::resilience::BreakerSnapshot;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub services: usize,
    pub cache_entries: usize,
}

#[derive(Serialize)]
pub struct BreakerStatus {
    #[serde(flatten)]
    pub breaker: BreakerSnapshot,
    pub reroute_count: u32,
}

#[derive(Serialize)]
pub struct BreakerStatusReport {
    pub breakers: BTreeMap<String, BreakerStatus>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(alias = "serviceName")]
    pub service_name: String,
    #[serde(alias = "serviceUrl")]
    pub service_url: String,
}

#[derive(Debug, Deserialize)]
pub struct DeregisterRequest {
    #[serde(rename = "serviceName", alias = "service_name")]
    pub service_name: String,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let uptime_secs = SystemTime::now()
        .duration_since(state.started_at)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs,
        services: state.registry.snapshot().len(),
        cache_entries: state.cache.len(),
    })
}

pub async fn get_breaker_status(State(state): State<AppState>) -> Json<BreakerStatusReport> {
    let breakers = state
        .guards
        .iter()
        .map(|(name, guard)| {
            let status = BreakerStatus {
                breaker: guard.breaker.snapshot(),
                reroute_count: guard.reroutes.count(),
            };
            (name.clone(), status)
        })
        .collect();

    Json(BreakerStatusReport { breakers })
}

pub async fn get_services(State(state): State<AppState>) -> Json<BTreeMap<String, String>> {
    Json(state.registry.snapshot())
}

pub async fn register_service(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return bad_request(rejection.body_text()),
    };

    match state.registry.register(&request.service_name, &request.service_url) {
        Ok(_) => (
            StatusCode::CREATED,
            Json(json!({
                "message": "Service registered",
                "service": request.service_name.trim(),
            })),
        )
            .into_response(),
        Err(err) => bad_request(err.to_string()),
    }
}

pub async fn deregister_service(
    State(state): State<AppState>,
    payload: Result<Json<DeregisterRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return bad_request(rejection.body_text()),
    };

    match state.registry.deregister(&request.service_name) {
        Ok(_) => Json(json!({
            "message": "Service deregistered",
            "service": request.service_name,
        }))
        .into_response(),
        Err(err) => bad_request(err.to_string()),
    }
}

pub async fn reset_breaker(State(state): State<AppState>, Path(service): Path<String>) -> Response {
    let Some(guard) = state.guards.get(&service) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no circuit breaker for '{service}'") })),
        )
            .into_response();
    };

    guard.breaker.reset();
    guard.reroutes.reset_window();
    Json(json!({
        "service": service,
        "state": guard.breaker.state(),
    }))
    .into_response()
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}
