pub mod health;
pub mod proxy;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// Fallback for unmatched routes.
pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" })))
}
