//! Application startup and lifecycle management.

use crate::config::{Config, StoreBackend};
use crate::handlers::{self, health, records};
use crate::services::{metrics::init_metrics, KvStore, MemoryStore, RecordRepository, RedisStore};
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

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub repository: RecordRepository,
    pub store: Arc<dyn KvStore>,
    pub config: Config,
    pub lifecycle: Lifecycle,
}

pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/health", get(health::ready).fallback(handlers::not_found))
        .route("/health/live", get(health::live).fallback(handlers::not_found))
        .route(
            "/health/ready",
            get(health::ready).fallback(handlers::not_found),
        )
        .route("/metrics", get(metrics_handler).fallback(handlers::not_found))
        .route(
            "/records",
            get(records::list_records)
                .post(records::create_record)
                .fallback(handlers::not_found),
        )
        .route(
            "/records/:id",
            get(records::get_record)
                .delete(records::delete_record)
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
    resources: Vec<Arc<dyn ManagedResource>>,
}

impl Application {
    /// Build the application with the store selected by configuration.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        match config.store.backend {
            StoreBackend::Redis => {
                let redis = Arc::new(RedisStore::new(&config.store).await?);
                let resource: Arc<dyn ManagedResource> = redis.clone();
                Self::build_with_store(config, redis, vec![resource]).await
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory store, records are not persisted");
                Self::build_with_store(config, Arc::new(MemoryStore::new()), Vec::new()).await
            }
        }
    }

    /// Build around an existing store. `resources` are closed in reverse
    /// order once the listener has drained.
    pub async fn build_with_store(
        config: Config,
        store: Arc<dyn KvStore>,
        resources: Vec<Arc<dyn ManagedResource>>,
    ) -> Result<Self, AppError> {
        init_metrics().map_err(|e| AppError::InternalError(anyhow::anyhow!(e)))?;

        let repository = RecordRepository::new(store.clone());

        // Seed before accepting traffic; a store outage leaves us degraded, not down.
        match repository.ensure_seeded().await {
            Ok(true) => tracing::info!("Sample records written"),
            Ok(false) => {}
            Err(e) => tracing::warn!(
                error = %e,
                "Failed to seed records, continuing without sample data"
            ),
        }

        let state = AppState {
            repository,
            store,
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

        tracing::info!(service = %config.service_name, port, "Data service listening");

        Ok(Self {
            port,
            listener,
            router,
            state,
            resources,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.state.lifecycle.clone()
    }

    /// Serve until `shutdown` resolves, then drain and close the store.
    pub async fn run_until_stopped<F>(self, shutdown: F) -> ShutdownOutcome
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let policy = ShutdownPolicy {
            hard_timeout: self.state.config.server.shutdown_timeout(),
        };
        serve_until_shutdown(
            self.listener,
            self.router,
            self.state.lifecycle,
            self.resources,
            policy,
            shutdown,
        )
        .await
    }
}
