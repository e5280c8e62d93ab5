pub mod data_client;
pub mod metrics;
pub mod retry;

pub use data_client::{DataServiceClient, ForwardError, UpstreamResponse};
pub use retry::RetryConfig;
