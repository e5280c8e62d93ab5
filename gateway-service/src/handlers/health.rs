use axum::{extract::State, response::Response};
use service_core::health::{liveness_response, probe, ReadinessReport};

use crate::startup::AppState;

pub async fn live(State(state): State<AppState>) -> Response {
    liveness_response(&state.config.service_name, env!("CARGO_PKG_VERSION"))
}

/// Ready only while serving and while the data service reports healthy.
pub async fn ready(State(state): State<AppState>) -> ReadinessReport {
    let service = &state.config.service_name;
    if !state.lifecycle.is_serving() {
        return ReadinessReport::not_serving(service, state.lifecycle.state());
    }

    let timeout = state.config.forward.health_timeout;
    let data_service = probe("data-service", timeout, state.client.probe_health()).await;

    ReadinessReport::from_checks(service, [("data-service", data_service)])
}
