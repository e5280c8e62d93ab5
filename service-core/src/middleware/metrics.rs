use crate::observability::metrics::http_metrics;
use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

/// Record request count and latency per route template.
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    // Route template rather than raw path keeps label cardinality bounded.
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    if let Some(metrics) = http_metrics() {
        let status = response.status().as_u16().to_string();
        let labels = [method.as_str(), path.as_str(), status.as_str()];

        metrics.requests_total.with_label_values(&labels).inc();
        metrics
            .request_duration_seconds
            .with_label_values(&labels)
            .observe(start.elapsed().as_secs_f64());
    }

    response
}
