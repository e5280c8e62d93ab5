//! Startup/shutdown coordination shared by both services.
//!
//! State moves strictly forward: `starting → serving → draining → stopped`.
//! On the shutdown trigger the listener stops accepting, in-flight requests
//! finish, then owned resources are closed. A hard ceiling bounds the whole
//! drain so orchestrators with a kill grace period get a deterministic exit.

use async_trait::async_trait;
use axum::Router;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Starting,
    Serving,
    Draining,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Serving => "serving",
            LifecycleState::Draining => "draining",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Shared handle on a process's lifecycle state.
#[derive(Clone)]
pub struct Lifecycle {
    sender: Arc<watch::Sender<LifecycleState>>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(LifecycleState::Starting);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.sender.borrow()
    }

    pub fn is_serving(&self) -> bool {
        self.state() == LifecycleState::Serving
    }

    /// Move to `next` if it lies ahead of the current state.
    ///
    /// Returns `false` (and changes nothing) for backward or repeated moves.
    pub fn advance(&self, next: LifecycleState) -> bool {
        let mut from = LifecycleState::Starting;
        let moved = self.sender.send_if_modified(|state| {
            if next > *state {
                from = *state;
                *state = next;
                true
            } else {
                false
            }
        });
        if moved {
            info!(from = %from, to = %next, "Lifecycle transition");
        }
        moved
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.sender.subscribe()
    }

    /// Resolve once the state has reached `target` or beyond.
    pub async fn reached(&self, target: LifecycleState) {
        let mut receiver = self.subscribe();
        let reached = receiver.wait_for(|state| *state >= target).await.is_ok();
        if !reached {
            // The sender lives as long as `self`, so this cannot happen.
            std::future::pending::<()>().await;
        }
    }
}

/// A dependency owned by the process and released during drain.
#[async_trait]
pub trait ManagedResource: Send + Sync {
    fn name(&self) -> &str;

    async fn close(&self) -> anyhow::Result<()>;
}

/// Close every resource in reverse acquisition order.
///
/// A failure is logged and does not stop the remaining resources from being
/// released. Returns `true` when all of them closed cleanly.
pub async fn close_resources(resources: &[Arc<dyn ManagedResource>]) -> bool {
    let mut clean = true;
    for resource in resources.iter().rev() {
        match resource.close().await {
            Ok(()) => info!(resource = resource.name(), "Resource closed"),
            Err(e) => {
                clean = false;
                error!(resource = resource.name(), error = %e, "Failed to close resource");
            }
        }
    }
    clean
}

#[derive(Debug, Clone)]
pub struct ShutdownPolicy {
    /// Ceiling on drain + resource close, measured from the shutdown trigger.
    pub hard_timeout: Duration,
}

impl Default for ShutdownPolicy {
    fn default() -> Self {
        Self {
            hard_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Clean,
    ServerError,
    DependencyCloseFailed,
    TimedOut,
}

impl ShutdownOutcome {
    pub fn is_clean(&self) -> bool {
        *self == ShutdownOutcome::Clean
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.is_clean() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}

/// Serve `router` on `listener` until `shutdown` resolves, then drain.
///
/// The lifecycle moves to `serving` immediately, to `draining` when the
/// trigger fires and to `stopped` once the outcome is known.
pub async fn serve_until_shutdown<F>(
    listener: TcpListener,
    router: Router,
    lifecycle: Lifecycle,
    resources: Vec<Arc<dyn ManagedResource>>,
    policy: ShutdownPolicy,
    shutdown: F,
) -> ShutdownOutcome
where
    F: Future<Output = ()> + Send + 'static,
{
    lifecycle.advance(LifecycleState::Serving);

    let trigger_lifecycle = lifecycle.clone();
    let trigger = async move {
        shutdown.await;
        trigger_lifecycle.advance(LifecycleState::Draining);
        info!("Shutdown requested, no longer accepting connections");
    };

    let work = async move {
        let listener_ok = match axum::serve(listener, router)
            .with_graceful_shutdown(trigger)
            .await
        {
            Ok(()) => {
                info!("Listener closed, in-flight requests drained");
                true
            }
            Err(e) => {
                error!(error = %e, "HTTP server error");
                false
            }
        };
        let resources_ok = close_resources(&resources).await;
        (listener_ok, resources_ok)
    };
    tokio::pin!(work);

    let finished = tokio::select! {
        result = &mut work => Some(result),
        _ = lifecycle.reached(LifecycleState::Draining) => None,
    };

    let result = match finished {
        Some(result) => result,
        None => match tokio::time::timeout(policy.hard_timeout, &mut work).await {
            Ok(result) => result,
            Err(_) => {
                lifecycle.advance(LifecycleState::Stopped);
                error!(
                    timeout_secs = policy.hard_timeout.as_secs_f64(),
                    "Graceful shutdown exceeded hard timeout, abandoning in-flight work"
                );
                return ShutdownOutcome::TimedOut;
            }
        },
    };

    lifecycle.advance(LifecycleState::Stopped);

    match result {
        (false, _) => ShutdownOutcome::ServerError,
        (true, false) => {
            warn!("Shutdown completed but some resources failed to close");
            ShutdownOutcome::DependencyCloseFailed
        }
        (true, true) => {
            info!("Shutdown complete");
            ShutdownOutcome::Clean
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::{Notify, oneshot};

    struct CountingResource {
        name: &'static str,
        fail: bool,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ManagedResource for CountingResource {
        fn name(&self) -> &str {
            self.name
        }

        async fn close(&self) -> anyhow::Result<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("{} refused to close", self.name);
            }
            Ok(())
        }
    }

    fn slow_router(delay: Duration, started: Arc<Notify>) -> Router {
        Router::new().route(
            "/slow",
            get(move || {
                let started = started.clone();
                async move {
                    started.notify_one();
                    tokio::time::sleep(delay).await;
                    "done"
                }
            }),
        )
    }

    async fn bind() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("http://{}", listener.local_addr().unwrap());
        (listener, address)
    }

    #[test]
    fn transitions_only_move_forward() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), LifecycleState::Starting);

        assert!(lifecycle.advance(LifecycleState::Serving));
        assert!(lifecycle.is_serving());
        assert!(lifecycle.advance(LifecycleState::Draining));

        assert!(!lifecycle.advance(LifecycleState::Serving));
        assert!(!lifecycle.advance(LifecycleState::Draining));
        assert_eq!(lifecycle.state(), LifecycleState::Draining);

        assert!(lifecycle.advance(LifecycleState::Stopped));
        assert!(!lifecycle.advance(LifecycleState::Starting));
    }

    #[tokio::test]
    async fn all_resources_are_closed_even_when_one_fails() {
        let closed = Arc::new(AtomicUsize::new(0));
        let resources: Vec<Arc<dyn ManagedResource>> = vec![
            Arc::new(CountingResource {
                name: "store",
                fail: false,
                closed: closed.clone(),
            }),
            Arc::new(CountingResource {
                name: "client",
                fail: true,
                closed: closed.clone(),
            }),
        ];

        assert!(!close_resources(&resources).await);
        assert_eq!(closed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn in_flight_request_completes_before_clean_exit() {
        let (listener, address) = bind().await;
        let started = Arc::new(Notify::new());
        let router = slow_router(Duration::from_millis(300), started.clone());
        let lifecycle = Lifecycle::new();
        let closed = Arc::new(AtomicUsize::new(0));
        let resources: Vec<Arc<dyn ManagedResource>> = vec![Arc::new(CountingResource {
            name: "store",
            fail: false,
            closed: closed.clone(),
        })];
        let (trigger_tx, trigger_rx) = oneshot::channel::<()>();

        let server = tokio::spawn(serve_until_shutdown(
            listener,
            router,
            lifecycle.clone(),
            resources,
            ShutdownPolicy {
                hard_timeout: Duration::from_secs(5),
            },
            async move {
                let _ = trigger_rx.await;
            },
        ));

        let request = tokio::spawn(async move {
            reqwest::get(format!("{}/slow", address))
                .await
                .unwrap()
                .text()
                .await
                .unwrap()
        });

        started.notified().await;
        trigger_tx.send(()).unwrap();

        assert_eq!(request.await.unwrap(), "done");
        assert_eq!(server.await.unwrap(), ShutdownOutcome::Clean);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn hard_timeout_abandons_slow_drain() {
        let (listener, address) = bind().await;
        let started = Arc::new(Notify::new());
        let router = slow_router(Duration::from_secs(10), started.clone());
        let (trigger_tx, trigger_rx) = oneshot::channel::<()>();

        let server = tokio::spawn(serve_until_shutdown(
            listener,
            router,
            Lifecycle::new(),
            Vec::new(),
            ShutdownPolicy {
                hard_timeout: Duration::from_millis(200),
            },
            async move {
                let _ = trigger_rx.await;
            },
        ));

        let _request = tokio::spawn(async move { reqwest::get(format!("{}/slow", address)).await });

        started.notified().await;
        let triggered_at = std::time::Instant::now();
        trigger_tx.send(()).unwrap();

        let outcome = server.await.unwrap();
        assert_eq!(outcome, ShutdownOutcome::TimedOut);
        assert!(triggered_at.elapsed() < Duration::from_secs(5));
        assert_eq!(outcome.exit_code(), ExitCode::FAILURE);
    }

    #[tokio::test]
    async fn failed_resource_close_is_not_a_clean_exit() {
        let (listener, _) = bind().await;
        let resources: Vec<Arc<dyn ManagedResource>> = vec![Arc::new(CountingResource {
            name: "store",
            fail: true,
            closed: Arc::new(AtomicUsize::new(0)),
        })];

        let outcome = serve_until_shutdown(
            listener,
            Router::new(),
            Lifecycle::new(),
            resources,
            ShutdownPolicy::default(),
            async {},
        )
        .await;

        assert_eq!(outcome, ShutdownOutcome::DependencyCloseFailed);
    }
}
