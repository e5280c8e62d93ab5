pub mod health;
pub mod records;

use crate::services::RepositoryError;
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use service_core::error::AppError;

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(_) => AppError::NotFound(anyhow::anyhow!("Record not found")),
            RepositoryError::Conflict(_) => {
                AppError::Conflict(anyhow::anyhow!("A record with this email already exists"))
            }
            RepositoryError::Validation(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            RepositoryError::StoreUnavailable(e) => AppError::StoreUnavailable(e.into()),
            RepositoryError::Corrupt(e) => AppError::InternalError(e.into()),
        }
    }
}

/// Fallback for unmatched routes.
pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" })))
}
