//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the Axum router (API, WebSocket, health, admin)
//! - Wire up middleware (request id, tracing, timeout, limits, rate limits)
//! - Apply validated config reloads to the shared config
//! - Serve over plain TCP or rustls until shutdown, then drain

use axum::http::StatusCode;
use axum::{middleware, routing::get, Router};
use axum_server::tls_rustls::RustlsConfig;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::admin;
use crate::config::validation::validate_config;
use crate::config::{CrmConfig, SharedConfig};
use crate::http::handlers;
use crate::http::middleware::track_metrics;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::lifecycle::Shutdown;
use crate::observability::tracing::make_request_span;
use crate::security::headers::with_security_headers;
use crate::security::limits::{cors_layer, json_body_limit};
use crate::security::{rate_limit_middleware, ConnectionTracker, RateLimiter};
use crate::services::Crm;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub crm: Crm,
    pub config: SharedConfig,
    pub limiter: Arc<RateLimiter>,
    pub connections: Arc<ConnectionTracker>,
    pub shutdown: Shutdown,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(crm: Crm, shutdown: Shutdown) -> Self {
        let config = crm.config.clone();
        Self {
            limiter: Arc::new(RateLimiter::new(config.clone())),
            connections: Arc::new(ConnectionTracker::new()),
            crm,
            config,
            shutdown,
            started_at: Instant::now(),
        }
    }
}

/// HTTP server for the CRM API.
pub struct HttpServer {
    state: AppState,
    router: Router,
}

impl HttpServer {
    pub fn new(crm: Crm, shutdown: Shutdown) -> Self {
        let state = AppState::new(crm, shutdown);
        let router = build_router(state.clone());
        Self { state, router }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve on `listener` until shutdown, applying config reloads meanwhile.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<CrmConfig>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");
        spawn_config_reloader(self.state.clone(), config_updates);

        let shutdown = self.state.shutdown.clone();
        let grace = self.grace_period();
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let serve = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.wait())
            .into_future();

        let deadline = {
            let wait = shutdown.wait();
            async move {
                wait.await;
                tokio::time::sleep(grace).await;
            }
        };

        tokio::select! {
            result = serve => result?,
            _ = deadline => {
                tracing::warn!(grace_secs = grace.as_secs(), "Grace period elapsed, dropping open connections");
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Serve over TLS until shutdown.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        config_updates: mpsc::UnboundedReceiver<CrmConfig>,
    ) -> Result<(), std::io::Error> {
        tracing::info!(address = %addr, "HTTPS server starting");
        spawn_config_reloader(self.state.clone(), config_updates);

        let handle = axum_server::Handle::new();
        let grace = self.grace_period();
        let wait = self.state.shutdown.wait();
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            wait.await;
            shutdown_handle.graceful_shutdown(Some(grace));
        });

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(self.router.into_make_service_with_connect_info::<SocketAddr>())
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }

    fn grace_period(&self) -> Duration {
        Duration::from_secs(self.state.config.load().timeouts.shutdown_grace_secs)
    }
}

/// Build the Axum router with all middleware layers.
pub fn build_router(state: AppState) -> Router {
    let config = state.config.load_full();

    let api = handlers::api_routes(&config).layer(middleware::from_fn_with_state(
        state.clone(),
        rate_limit_middleware,
    ));

    let mut app = Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1", api);
    if config.admin.enabled {
        app = app.nest("/admin", admin::router(state.clone()));
    }

    let mut app = app
        .route_layer(middleware::from_fn(track_metrics))
        .layer(json_body_limit(&config));
    if config.security.enable_headers {
        app = with_security_headers(app);
    }
    if let Some(cors) = cors_layer(&config) {
        app = app.layer(cors);
    }

    app.with_state(state)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.timeouts.request_secs),
        ))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
        .layer(propagate_request_id_layer())
        .layer(set_request_id_layer())
}

/// Swap in validated config updates until shutdown.
fn spawn_config_reloader(state: AppState, mut updates: mpsc::UnboundedReceiver<CrmConfig>) {
    let mut shutdown = state.shutdown.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                update = updates.recv() => match update {
                    Some(new_config) => {
                        apply_config(&state.config, new_config);
                    }
                    None => break,
                },
                _ = shutdown.recv() => break,
            }
        }
    });
}

/// Store `new_config` if it validates; keep the current one otherwise.
pub fn apply_config(shared: &SharedConfig, new_config: CrmConfig) -> bool {
    match validate_config(&new_config) {
        Ok(()) => {
            shared.store(Arc::new(new_config));
            tracing::info!("Configuration reloaded");
            true
        }
        Err(errors) => {
            for error in &errors {
                tracing::error!(%error, "Rejected config reload");
            }
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::shared;

    #[test]
    fn test_invalid_reload_is_ignored() {
        let config = shared(CrmConfig::default());

        let mut bad = CrmConfig::default();
        bad.retries.max_attempts = 0;
        assert!(!apply_config(&config, bad));
        assert_eq!(config.load().retries.max_attempts, 5);

        let mut good = CrmConfig::default();
        good.rate_limit.requests_per_second = 7;
        assert!(apply_config(&config, good));
        assert_eq!(config.load().rate_limit.requests_per_second, 7);
    }
}
