use axum::{http::StatusCode, response::IntoResponse};
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::{Mutex, OnceLock};

static REGISTRY: OnceLock<Registry> = OnceLock::new();
static HTTP_METRICS: OnceLock<HttpMetrics> = OnceLock::new();
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Per-request metrics recorded by `metrics_middleware`.
pub struct HttpMetrics {
    pub requests_total: IntCounterVec,
    pub request_duration_seconds: HistogramVec,
}

/// Process-wide registry; services register their own collectors here.
pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Initialize `cell` exactly once, even when several callers race.
///
/// Registration is serialized so a collector is never registered twice.
pub fn init_once<T>(
    cell: &'static OnceLock<T>,
    init: impl FnOnce() -> Result<T, prometheus::Error>,
) -> Result<&'static T, prometheus::Error> {
    if let Some(value) = cell.get() {
        return Ok(value);
    }
    let _guard = INIT_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(value) = cell.get() {
        return Ok(value);
    }
    let value = init()?;
    Ok(cell.get_or_init(|| value))
}

/// Register the shared HTTP metrics. Calling it again is a no-op.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    init_once(&HTTP_METRICS, build_http_metrics)?;
    Ok(())
}

fn build_http_metrics() -> Result<HttpMetrics, prometheus::Error> {
    let requests_total = IntCounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests"),
        &["method", "path", "status"],
    )?;
    let request_duration_seconds = HistogramVec::new(
        HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request duration in seconds",
        ),
        &["method", "path", "status"],
    )?;

    registry().register(Box::new(requests_total.clone()))?;
    registry().register(Box::new(request_duration_seconds.clone()))?;

    Ok(HttpMetrics {
        requests_total,
        request_duration_seconds,
    })
}

/// `None` until `init_metrics` has run; recording is skipped in that case.
pub fn http_metrics() -> Option<&'static HttpMetrics> {
    HTTP_METRICS.get()
}

/// Create and register a labelled counter on the shared registry.
pub fn register_counter_vec(
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<IntCounterVec, prometheus::Error> {
    let counter = IntCounterVec::new(Opts::new(name, help), labels)?;
    registry().register(Box::new(counter.clone()))?;
    Ok(counter)
}

pub fn get_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return format!("# Failed to encode metrics: {}\n", e);
    }

    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to convert metrics to UTF-8: {}", e);
            format!("# Failed to convert metrics to UTF-8: {}\n", e)
        }
    }
}

/// Prometheus scrape endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        get_metrics(),
    )
}
