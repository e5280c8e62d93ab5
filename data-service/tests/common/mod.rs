#![allow(dead_code)]

use data_service::config::{Config, StoreBackend, StoreConfig};
use data_service::services::MemoryStore;
use data_service::Application;
use service_core::config::Config as CoreConfig;
use service_core::lifecycle::{Lifecycle, ShutdownOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub struct TestApp {
    pub address: String,
    pub store: Arc<MemoryStore>,
    pub lifecycle: Lifecycle,
    shutdown: Option<oneshot::Sender<()>>,
    server: JoinHandle<ShutdownOutcome>,
}

pub fn test_config() -> Config {
    Config {
        server: CoreConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            log_level: "debug".to_string(),
            shutdown_timeout_secs: 5,
            otlp_endpoint: None,
        },
        store: StoreConfig {
            backend: StoreBackend::Memory,
            ping_timeout: Duration::from_millis(200),
            ..StoreConfig::default()
        },
        service_name: "data-service-test".to_string(),
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_store(Arc::new(MemoryStore::new())).await
    }

    pub async fn spawn_with_store(store: Arc<MemoryStore>) -> Self {
        let app = Application::build_with_store(test_config(), store.clone(), Vec::new())
            .await
            .expect("Failed to build test application");

        let address = format!("http://127.0.0.1:{}", app.port());
        let lifecycle = app.lifecycle();
        let (tx, rx) = oneshot::channel::<()>();

        let server = tokio::spawn(app.run_until_stopped(async move {
            let _ = rx.await;
        }));

        // Wait for the listener by polling liveness
        let client = reqwest::Client::new();
        let health_url = format!("{}/health/live", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        TestApp {
            address,
            store,
            lifecycle,
            shutdown: Some(tx),
            server,
        }
    }

    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::new()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Trigger shutdown and wait for the outcome.
    pub async fn stop(mut self) -> ShutdownOutcome {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.server.await.expect("server task panicked")
    }
}
