//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router: admin routes first, everything else forwarded
//! - Wire up middleware (tracing, limits, request ID, request timeout)
//! - Own the shared state (registry, breakers, cache)
//! - Start and stop the background tasks tied to that state
//! - Apply configuration reloads

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, Request},
    response::Response,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin::admin_router;
use crate::cache::ResponseCache;
use crate::config::GatewayConfig;
use crate::http::proxy::Forwarder;
use crate::http::request::{MakeRequestUuid, X_REQUEST_ID};
use crate::observability::events::log_breaker_events;
use crate::registry::BackendRegistry;
use crate::resilience::{build_guards, ServiceGuard};
use crate::security::limits::body_limit_layer;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub forwarder: Forwarder,
    pub registry: BackendRegistry,
    pub guards: Arc<HashMap<String, ServiceGuard>>,
    pub cache: ResponseCache,
    pub started_at: SystemTime,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: GatewayConfig) -> Self {
        let registry = BackendRegistry::from_config(&config.services);
        let guards = Arc::new(build_guards(&config.services, &config.breaker, &config.reroute));
        let cache = ResponseCache::new();

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.breaker.call_timeout()));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        let forwarder = Forwarder::new(&config, registry.clone(), guards.clone(), cache.clone(), client);

        let state = AppState {
            forwarder,
            registry,
            guards,
            cache,
            started_at: SystemTime::now(),
        };

        let router = Self::build_router(&config, state.clone());
        Self { router, config, state }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let request_id = HeaderName::from_static(X_REQUEST_ID);

        admin_router()
            .fallback(proxy_handler)
            .with_state(state)
            .layer(body_limit_layer(&config.limits))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::new(request_id.clone()))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
    }

    /// The fully layered router, for driving requests in-process.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Background tasks (reroute windows, breaker event logging, cache purge,
    /// config reloads) live exactly as long as the server.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            services = self.state.guards.len(),
            "HTTP server starting"
        );

        self.spawn_background_tasks(&shutdown, config_updates);

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    fn spawn_background_tasks(
        &self,
        shutdown: &broadcast::Receiver<()>,
        config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
    ) {
        for guard in self.state.guards.values() {
            tokio::spawn(guard.reroutes.clone().run_window(shutdown.resubscribe()));
            tokio::spawn(log_breaker_events(guard.breaker.subscribe(), shutdown.resubscribe()));
        }

        if self.config.cache.enabled {
            let interval = Duration::from_secs(self.config.cache.purge_interval_secs);
            tokio::spawn(self.state.cache.clone().run_purge(interval, shutdown.resubscribe()));
        }

        tokio::spawn(apply_config_updates(
            self.state.registry.clone(),
            config_updates,
            shutdown.resubscribe(),
        ));
    }
}

/// Re-seed backend URLs from every reloaded config.
async fn apply_config_updates(
    registry: BackendRegistry,
    mut updates: mpsc::UnboundedReceiver<GatewayConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(config) => {
                    registry.seed(&config.services);
                    tracing::info!(services = config.services.len(), "Applied configuration reload");
                }
                None => break,
            },
            _ = shutdown.recv() => break,
        }
    }
}

/// Every request not claimed by an admin route.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    state.forwarder.forward(request).await
}
