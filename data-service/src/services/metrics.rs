use prometheus::IntCounterVec;
use service_core::observability::metrics::{
    init_metrics as init_http_metrics, init_once, register_counter_vec,
};
use std::sync::OnceLock;

static RECORD_OPERATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Register HTTP and record metrics. Safe to call more than once.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    init_http_metrics()?;
    init_once(&RECORD_OPERATIONS_TOTAL, || {
        register_counter_vec(
            "records_operations_total",
            "Record repository operations by operation and outcome",
            &["operation", "outcome"],
        )
    })?;
    Ok(())
}

pub fn record_operation(operation: &str, outcome: &str) {
    if let Some(counter) = RECORD_OPERATIONS_TOTAL.get() {
        counter.with_label_values(&[operation, outcome]).inc();
    }
}
