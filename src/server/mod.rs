//! Server Module
//!
//! HTTP server hosting the admin routes, the guarded API and request
//! instrumentation.

mod config;
mod handler;

pub use config::{Config, HttpCheckConfig};
pub use handler::api_router;

use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::error::ServerError;
use crate::metrics::track_requests;
use crate::observability::{
    admin_router, http_check, register_default_metrics, AdminState, Dependency,
    HealthAggregator, MetricsRegistry,
};
use crate::security::TokenVerifier;

/// Assemble the full application router
pub fn router(
    health: Arc<HealthAggregator>,
    metrics: Arc<MetricsRegistry>,
    verifier: Arc<TokenVerifier>,
) -> Router {
    Router::new()
        .merge(admin_router(AdminState::new(health, metrics.clone())))
        .merge(api_router(verifier))
        .route_layer(from_fn_with_state(metrics, track_requests))
}

/// VIGIL server
pub struct Server {
    config: Config,
    health: HealthAggregator,
    metrics: Arc<MetricsRegistry>,
    verifier: Arc<TokenVerifier>,
}

impl Server {
    /// Create a new server with the given configuration
    pub fn new(config: Config) -> Result<Self, ServerError> {
        if config.auth.uses_dev_secret() {
            warn!("JWT secret not configured, using the built-in development secret");
        }

        let mut health = HealthAggregator::new(&config.service_name, &config.version);
        for check in &config.http_checks {
            health.register(http_check(&check.name, &check.url, check.critical)?);
        }

        let metrics = Arc::new(MetricsRegistry::with_histogram_capacity(
            config.histogram_capacity,
        ));
        register_default_metrics(&metrics);

        Ok(Self {
            verifier: Arc::new(TokenVerifier::new(config.auth.clone())),
            config,
            health,
            metrics,
        })
    }

    /// Register an additional dependency check before serving
    pub fn register(&mut self, dependency: Dependency) {
        self.health.register(dependency);
    }

    /// Get metrics reference
    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn verifier(&self) -> &Arc<TokenVerifier> {
        &self.verifier
    }

    pub fn into_router(self) -> Router {
        router(Arc::new(self.health), self.metrics, self.verifier)
    }

    /// Bind the configured address and serve until ctrl-c
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.config.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        info!(
            "{} v{} listening on {}",
            self.config.service_name,
            self.config.version,
            listener.local_addr()?
        );
        let app = self.into_router();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
