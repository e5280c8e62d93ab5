//! Cross-service workflow integration tests library.
//!
//! Runs the data service and the gateway in-process, wired together over
//! real sockets, so tests exercise the full client → gateway → data service
//! path. The data service uses the in-memory store, whose availability
//! switch stands in for a store outage.

use anyhow::{anyhow, Result};
use data_service::config::{Config as DataConfig, StoreBackend, StoreConfig};
use data_service::services::MemoryStore;
use gateway_service::config::{Config as GatewayConfig, ForwardConfig};
use gateway_service::services::RetryConfig;
use service_core::config::Config as CoreConfig;
use service_core::lifecycle::{Lifecycle, ShutdownOutcome};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,workflow_tests=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// A running service plus the handle that stops it.
pub struct RunningService {
    pub address: String,
    pub lifecycle: Lifecycle,
    shutdown: Option<oneshot::Sender<()>>,
    server: JoinHandle<ShutdownOutcome>,
}

impl RunningService {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Trigger shutdown and wait for the outcome.
    pub async fn stop(mut self) -> Result<ShutdownOutcome> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.server
            .await
            .map_err(|e| anyhow!("service task failed: {}", e))
    }
}

fn server_config() -> CoreConfig {
    CoreConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        log_level: "debug".to_string(),
        shutdown_timeout_secs: 5,
        otlp_endpoint: None,
    }
}

/// Gateway and data service running side by side.
pub struct RecordStack {
    pub store: Arc<MemoryStore>,
    pub data_service: RunningService,
    pub gateway: RunningService,
    client: reqwest::Client,
}

impl RecordStack {
    pub async fn spawn() -> Result<Self> {
        init_tracing();

        let store = Arc::new(MemoryStore::new());
        let data_config = DataConfig {
            server: server_config(),
            store: StoreConfig {
                backend: StoreBackend::Memory,
                ping_timeout: Duration::from_millis(200),
                ..StoreConfig::default()
            },
            service_name: "data-service".to_string(),
        };
        let data_app =
            data_service::Application::build_with_store(data_config, store.clone(), Vec::new())
                .await
                .map_err(|e| anyhow!("Failed to build data service: {}", e))?;
        let data_address = format!("http://127.0.0.1:{}", data_app.port());
        let data_lifecycle = data_app.lifecycle();
        let (data_tx, data_rx) = oneshot::channel::<()>();
        let data_server = tokio::spawn(data_app.run_until_stopped(async move {
            let _ = data_rx.await;
        }));

        let gateway_config = GatewayConfig {
            server: server_config(),
            forward: ForwardConfig {
                base_url: data_address.clone(),
                request_timeout: Duration::from_secs(2),
                connect_timeout: Duration::from_millis(500),
                health_timeout: Duration::from_millis(500),
                health_path: "/health".to_string(),
                retry: RetryConfig::default(),
            },
            service_name: "gateway-service".to_string(),
        };
        let gateway_app = gateway_service::Application::build(gateway_config)
            .await
            .map_err(|e| anyhow!("Failed to build gateway: {}", e))?;
        let gateway_address = format!("http://127.0.0.1:{}", gateway_app.port());
        let gateway_lifecycle = gateway_app.lifecycle();
        let (gateway_tx, gateway_rx) = oneshot::channel::<()>();
        let gateway_server = tokio::spawn(gateway_app.run_until_stopped(async move {
            let _ = gateway_rx.await;
        }));

        let stack = Self {
            store,
            data_service: RunningService {
                address: data_address,
                lifecycle: data_lifecycle,
                shutdown: Some(data_tx),
                server: data_server,
            },
            gateway: RunningService {
                address: gateway_address,
                lifecycle: gateway_lifecycle,
                shutdown: Some(gateway_tx),
                server: gateway_server,
            },
            client: reqwest::Client::new(),
        };

        stack
            .wait_until_ready(Duration::from_secs(10))
            .await?;
        Ok(stack)
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn gateway_url(&self, path: &str) -> String {
        self.gateway.url(path)
    }

    /// Poll the gateway readiness endpoint, which in turn probes the data
    /// service and its store.
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<()> {
        let url = self.gateway_url("/health/ready");
        let start = std::time::Instant::now();

        loop {
            match self.client.get(&url).timeout(Duration::from_secs(2)).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => tracing::debug!(status = %resp.status(), "Stack not ready yet"),
                Err(e) => tracing::debug!(error = %e, "Stack not reachable yet"),
            }

            if start.elapsed() > timeout {
                return Err(anyhow!("Timeout waiting for the stack to become ready"));
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Stop the gateway first, then the data service, as an orchestrator would.
    pub async fn stop(self) -> Result<(ShutdownOutcome, ShutdownOutcome)> {
        let gateway = self.gateway.stop().await?;
        let data_service = self.data_service.stop().await?;
        Ok((gateway, data_service))
    }
}
