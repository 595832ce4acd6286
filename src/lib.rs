//! Async job orchestration for fal.ai models.
//!
//! Uploads binary inputs to fal storage, submits model runs to the queue, polls
//! their status at a fixed interval under a timeout, and fetches the output.
//! [`node::execute`] wraps this in the item loop an automation host drives.
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(clippy::result_large_err)]

/// Default queue API base URL.
pub const DEFAULT_QUEUE_URL: &str = "https://queue.fal.run";

/// Default synchronous run API base URL.
pub const DEFAULT_RUN_URL: &str = "https://fal.run";

/// Default storage API base URL.
pub const DEFAULT_STORAGE_URL: &str = "https://rest.alpha.fal.ai";

/// Default User-Agent header value.
pub(crate) const DEFAULT_CLIENT_HEADER: &str =
    concat!("fal-queue-rust/", env!("CARGO_PKG_VERSION"));

/// Default connection timeout (5 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Default request timeout (60 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

/// HTTP header carrying the fal request id.
pub const REQUEST_ID_HEADER: &str = "x-fal-request-id";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "FAL_KEY";

/// Environment variable holding the key id of a split credential.
pub const API_KEY_ID_ENV: &str = "FAL_KEY_ID";

/// Environment variable holding the key secret of a split credential.
pub const API_KEY_SECRET_ENV: &str = "FAL_KEY_SECRET";

mod api;
mod assets;
mod client;
mod errors;
mod http;
mod identifiers;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod models;
pub mod node;
mod queue;
mod storage;
mod telemetry;
#[doc(hidden)]
pub mod testing;
mod types;
mod workflow;

pub use api::InferenceApi;
pub use assets::{resolve_mime_type, sniff_mime_type, BinaryAsset, FALLBACK_MIME_TYPE};
pub use client::{Client, Config};
pub use errors::{
    APIError, Error, Result, TransportError, TransportErrorKind, ValidationError, WorkflowError,
};
pub use identifiers::{ModelId, RequestId};
#[cfg(feature = "mock")]
pub use mock::{MockApi, MockCall, MockConfig};
pub use models::ModelsClient;
pub use queue::QueueClient;
pub use storage::StorageClient;
pub use telemetry::{HttpRequestMetrics, JobPollMetrics, MetricsCallbacks, RequestContext};
pub use types::{JobHandle, JobStatus, JobSubmission, JsonMap, StatusReport, UploadedAsset};
pub use workflow::{
    FileInput, Orchestrator, WorkflowOptions, WorkflowRequest, DEFAULT_FILE_FIELD,
    DEFAULT_POLLING_INTERVAL, DEFAULT_WORKFLOW_TIMEOUT,
};
