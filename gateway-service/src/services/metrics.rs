use prometheus::IntCounterVec;
use service_core::observability::metrics::{
    init_metrics as init_http_metrics, init_once, register_counter_vec,
};
use std::sync::OnceLock;

static UPSTREAM_FAILURES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

pub fn init_metrics() -> Result<(), prometheus::Error> {
    init_http_metrics()?;
    init_once(&UPSTREAM_FAILURES_TOTAL, || {
        register_counter_vec(
            "gateway_upstream_failures_total",
            "Failed calls to the data service by failure kind",
            &["kind"],
        )
    })?;
    Ok(())
}

pub fn record_upstream_failure(kind: &str) {
    if let Some(counter) = UPSTREAM_FAILURES_TOTAL.get() {
        counter.with_label_values(&[kind]).inc();
    }
}
