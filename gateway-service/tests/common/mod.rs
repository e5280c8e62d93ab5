#![allow(dead_code)]

use gateway_service::config::{Config, ForwardConfig};
use gateway_service::services::RetryConfig;
use gateway_service::Application;
use service_core::config::Config as CoreConfig;
use service_core::lifecycle::{Lifecycle, ShutdownOutcome};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub struct TestApp {
    pub address: String,
    pub lifecycle: Lifecycle,
    shutdown: Option<oneshot::Sender<()>>,
    server: JoinHandle<ShutdownOutcome>,
}

pub fn forward_config(data_service_url: &str) -> ForwardConfig {
    ForwardConfig {
        base_url: data_service_url.trim_end_matches('/').to_string(),
        request_timeout: Duration::from_millis(500),
        connect_timeout: Duration::from_millis(200),
        health_timeout: Duration::from_millis(300),
        health_path: "/health".to_string(),
        retry: RetryConfig::default(),
    }
}

impl TestApp {
    pub async fn spawn(data_service_url: &str) -> Self {
        Self::spawn_with(forward_config(data_service_url)).await
    }

    pub async fn spawn_with(forward: ForwardConfig) -> Self {
        let config = Config {
            server: CoreConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                log_level: "debug".to_string(),
                shutdown_timeout_secs: 5,
                otlp_endpoint: None,
            },
            forward,
            service_name: "gateway-service-test".to_string(),
        };

        let app = Application::build(config)
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

    pub async fn stop(mut self) -> ShutdownOutcome {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.server.await.expect("server task panicked")
    }
}

/// An address nothing listens on.
pub async fn unused_address() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    address
}
