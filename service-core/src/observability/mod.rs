pub mod logging;
pub mod metrics;
pub mod trace_context;

pub use logging::init_tracing;
pub use metrics::{get_metrics, init_metrics, metrics_handler, register_counter_vec};
pub use trace_context::{
    REQUEST_ID_HEADER, TRACEPARENT_HEADER, TRACESTATE_HEADER, extract_request_id,
    extract_trace_context, inject_trace_context, inject_trace_headers,
};
