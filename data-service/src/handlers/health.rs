use axum::{extract::State, response::Response};
use service_core::health::{liveness_response, probe, ReadinessReport};

use crate::startup::AppState;

pub async fn live(State(state): State<AppState>) -> Response {
    liveness_response(&state.config.service_name, env!("CARGO_PKG_VERSION"))
}

/// Probes the store on every call. Also served on `/health`, which the
/// gateway polls.
pub async fn ready(State(state): State<AppState>) -> ReadinessReport {
    let service = &state.config.service_name;
    let lifecycle = state.lifecycle.state();
    if !state.lifecycle.is_serving() {
        return ReadinessReport::not_serving(service, lifecycle);
    }

    let store = probe(
        "store",
        state.config.store.ping_timeout,
        state.store.ping(),
    )
    .await;

    ReadinessReport::from_checks(service, [("store", store)])
}
