pub mod metrics;
pub mod tracing;

use axum::{
    Json, Router,
    body::Body,
    http::StatusCode,
    middleware::from_fn,
    response::{IntoResponse, Response},
};
use std::any::Any;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

/// Apply the layer stack every service shares, innermost first: metrics,
/// request id, request span and finally panic recovery.
pub fn with_service_layers(router: Router) -> Router {
    router
        .layer(from_fn(metrics::metrics_middleware))
        .layer(from_fn(tracing::request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(tracing::make_request_span::<Body>))
        .layer(CatchPanicLayer::custom(panic_response))
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    ::tracing::error!(panic = detail, classification = "panic", "Handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": "Internal server error" })),
    )
        .into_response()
}
