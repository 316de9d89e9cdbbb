//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → circuit_breaker.rs (admit, fail fast when open)
//!     → timeouts.rs (enforce the per-call deadline)
//!     → circuit_breaker.rs (record outcome, maybe transition)
//!     → On failure: reroute.rs (count, force-trip breaker past threshold)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every backend call has a deadline
//! - No retries: a failed call is answered with a fallback and counted as a reroute
//! - Circuit breaker prevents cascading failures

pub mod circuit_breaker;
pub mod reroute;
pub mod timeouts;

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{BreakerConfig, RerouteConfig, ServiceConfig};

pub use circuit_breaker::{BreakerEvent, BreakerEventKind, BreakerSnapshot, BreakerState, CallError, CircuitBreaker};
pub use reroute::RerouteTracker;

/// The breaker and reroute tracker protecting one backend.
#[derive(Debug, Clone)]
pub struct ServiceGuard {
    pub breaker: Arc<CircuitBreaker>,
    pub reroutes: Arc<RerouteTracker>,
}

impl ServiceGuard {
    pub fn new(service: &str, breaker: &BreakerConfig, reroute: &RerouteConfig) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(service, breaker.clone()));
        let reroutes = Arc::new(RerouteTracker::new(breaker.clone(), reroute));
        Self { breaker, reroutes }
    }
}

/// One guard per configured service, fixed for the process lifetime.
pub fn build_guards(
    services: &[ServiceConfig],
    breaker: &BreakerConfig,
    reroute: &RerouteConfig,
) -> HashMap<String, ServiceGuard> {
    services
        .iter()
        .map(|s| (s.name.clone(), ServiceGuard::new(&s.name, breaker, reroute)))
        .collect()
}
