//! Common test utilities for workflow integration tests.

use workflow_tests::RecordStack;

/// Bring up both services and wait until the gateway reports ready.
pub async fn setup() -> RecordStack {
    RecordStack::spawn()
        .await
        .expect("Failed to start gateway and data service")
}
