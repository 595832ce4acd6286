//! Helpers for tests that run against a local mock server.

use std::time::Duration;

use crate::{Client, Config, WorkflowOptions};

/// Client whose queue, run and storage bases all point at `base_url`.
pub fn test_client(base_url: &str) -> Client {
    Client::new(Config {
        api_key: Some("test-key".to_string()),
        queue_url: Some(base_url.to_string()),
        run_url: Some(base_url.to_string()),
        storage_url: Some(base_url.to_string()),
        timeout: Some(Duration::from_secs(5)),
        ..Default::default()
    })
    .expect("client")
}

/// Workflow options with a short real polling interval.
pub fn fast_options(polling_ms: u64, timeout_ms: u64) -> WorkflowOptions {
    WorkflowOptions {
        polling_interval: Duration::from_millis(polling_ms),
        timeout: Duration::from_millis(timeout_ms),
    }
}
