//! Liveness and readiness building blocks shared by both services.
//!
//! Liveness never touches a dependency. Readiness is computed per request by
//! probing each dependency under a deadline; nothing is cached.

use crate::lifecycle::LifecycleState;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Reachability of a single dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyStatus {
    Up,
    Down,
}

/// Run `check` under `timeout`. Failures and timeouts are logged with a
/// classification and reported as `Down`; this never returns an error.
pub async fn probe<F, E>(dependency: &str, timeout: Duration, check: F) -> DependencyStatus
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    match tokio::time::timeout(timeout, check).await {
        Ok(Ok(())) => DependencyStatus::Up,
        Ok(Err(e)) => {
            tracing::warn!(
                dependency,
                error = %e,
                classification = "unavailable",
                "Dependency probe failed"
            );
            DependencyStatus::Down
        }
        Err(_) => {
            tracing::warn!(
                dependency,
                timeout_ms = timeout.as_millis() as u64,
                classification = "timeout",
                "Dependency probe timed out"
            );
            DependencyStatus::Down
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReadinessReport {
    pub status: &'static str,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<LifecycleState>,
    pub checks: BTreeMap<String, DependencyStatus>,
}

impl ReadinessReport {
    /// Report built from probe results; ready only when every check is up.
    pub fn from_checks<I, K>(service: &str, checks: I) -> Self
    where
        I: IntoIterator<Item = (K, DependencyStatus)>,
        K: Into<String>,
    {
        let checks: BTreeMap<String, DependencyStatus> =
            checks.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let ready = checks.values().all(|s| *s == DependencyStatus::Up);

        Self {
            status: if ready { "ready" } else { "not ready" },
            service: service.to_string(),
            lifecycle: None,
            checks,
        }
    }

    /// Report for a process that is not in the `serving` state.
    pub fn not_serving(service: &str, state: LifecycleState) -> Self {
        Self {
            status: "not ready",
            service: service.to_string(),
            lifecycle: Some(state),
            checks: BTreeMap::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == "ready"
    }
}

impl IntoResponse for ReadinessReport {
    fn into_response(self) -> Response {
        let status = if self.is_ready() {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        (status, Json(self)).into_response()
    }
}

/// Liveness body: answers as long as the process can run a handler.
pub fn liveness_response(service: &str, version: &str) -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "alive",
            "service": service,
            "version": version,
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn probe_reports_up_on_success() {
        let status = probe("store", Duration::from_millis(100), async {
            Ok::<(), String>(())
        })
        .await;
        assert_eq!(status, DependencyStatus::Up);
    }

    #[tokio::test]
    async fn probe_reports_down_on_error() {
        let status = probe("store", Duration::from_millis(100), async {
            Err::<(), _>("connection refused")
        })
        .await;
        assert_eq!(status, DependencyStatus::Down);
    }

    #[tokio::test]
    async fn probe_reports_down_on_timeout() {
        let started = std::time::Instant::now();
        let status = probe("store", Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<(), String>(())
        })
        .await;

        assert_eq!(status, DependencyStatus::Down);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn report_is_ready_only_when_all_checks_up() {
        let ready = ReadinessReport::from_checks("svc", [("store", DependencyStatus::Up)]);
        assert!(ready.is_ready());

        let degraded = ReadinessReport::from_checks(
            "svc",
            [("store", DependencyStatus::Up), ("cache", DependencyStatus::Down)],
        );
        assert!(!degraded.is_ready());
        assert_eq!(degraded.status, "not ready");
    }

    #[test]
    fn not_serving_report_is_unavailable() {
        let report = ReadinessReport::not_serving("svc", LifecycleState::Draining);
        let response = report.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
