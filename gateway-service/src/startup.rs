//! Application startup and lifecycle management.

use crate::config::Config;
use crate::handlers::{self, health, proxy};
use crate::services::{metrics::init_metrics, DataServiceClient};
use axum::{routing::get, Router};
use service_core::error::AppError;
use service_core::lifecycle::{
    serve_until_shutdown, Lifecycle, ManagedResource, ShutdownOutcome, ShutdownPolicy,
};
use service_core::middleware::with_service_layers;
use service_core::observability::metrics_handler;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Shared application state. The gateway holds no data of its own.
#[derive(Clone)]
pub struct AppState {
    pub client: Arc<DataServiceClient>,
    pub config: Config,
    pub lifecycle: Lifecycle,
}

pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/health/live", get(health::live).fallback(handlers::not_found))
        .route(
            "/health/ready",
            get(health::ready).fallback(handlers::not_found),
        )
        .route("/metrics", get(metrics_handler).fallback(handlers::not_found))
        .route(
            "/api/records",
            get(proxy::forward)
                .post(proxy::forward)
                .fallback(handlers::not_found),
        )
        .route(
            "/api/records/:id",
            get(proxy::forward)
                .delete(proxy::forward)
                .fallback(handlers::not_found),
        )
        .fallback(handlers::not_found)
        .with_state(state);

    with_service_layers(router)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
    state: AppState,
}

impl Application {
    pub async fn build(config: Config) -> Result<Self, AppError> {
        init_metrics().map_err(|e| AppError::InternalError(anyhow::anyhow!(e)))?;

        let client = DataServiceClient::new(config.forward.clone()).map_err(|e| {
            tracing::error!("Failed to build data service client: {}", e);
            AppError::InternalError(e.into())
        })?;

        let state = AppState {
            client: Arc::new(client),
            config: config.clone(),
            lifecycle: Lifecycle::new(),
        };
        let router = build_router(state.clone());

        let addr = config.server.bind_address();
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            service = %config.service_name,
            port,
            data_service = %config.forward.base_url,
            "Gateway listening"
        );

        Ok(Self {
            port,
            listener,
            router,
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.state.lifecycle.clone()
    }

    /// Serve until `shutdown` resolves, then drain and close the client.
    pub async fn run_until_stopped<F>(self, shutdown: F) -> ShutdownOutcome
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let policy = ShutdownPolicy {
            hard_timeout: self.state.config.server.shutdown_timeout(),
        };
        let resources: Vec<Arc<dyn ManagedResource>> = vec![self.state.client.clone()];

        serve_until_shutdown(
            self.listener,
            self.router,
            self.state.lifecycle,
            resources,
            policy,
            shutdown,
        )
        .await
    }
}
