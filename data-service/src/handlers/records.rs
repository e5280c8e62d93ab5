use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::{CreateRecordRequest, ListResponse},
    models::Record,
    services::metrics::record_operation,
    startup::AppState,
};

fn observe<T>(operation: &str, result: &Result<T, AppError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) if e.status().is_client_error() => "rejected",
        Err(_) => "error",
    };
    record_operation(operation, outcome);
}

pub async fn list_records(State(state): State<AppState>) -> Result<Json<ListResponse>, AppError> {
    let result = state
        .repository
        .list()
        .await
        .map(|records| Json(ListResponse::from(records)))
        .map_err(AppError::from);
    observe("list", &result);
    result
}

pub async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Record>, AppError> {
    let result = state
        .repository
        .get_by_id(&id)
        .await
        .map(Json)
        .map_err(AppError::from);
    observe("get", &result);
    result
}

pub async fn create_record(
    State(state): State<AppState>,
    payload: Result<Json<CreateRecordRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Record>), AppError> {
    let result = create(&state, payload).await;
    observe("create", &result);
    result
}

async fn create(
    state: &AppState,
    payload: Result<Json<CreateRecordRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Record>), AppError> {
    let Json(payload) = payload.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Rejected malformed request body");
        AppError::BadRequest(anyhow::anyhow!("Invalid JSON body"))
    })?;
    payload.validate()?;

    let record = state
        .repository
        .create(&payload.name, &payload.email, payload.role)
        .await?;

    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn delete_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let result = state
        .repository
        .delete_by_id(&id)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(AppError::from);
    observe("delete", &result);
    result
}
