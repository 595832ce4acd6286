use std::time::Duration;

use thiserror::Error;

use crate::types::{JobHandle, JobStatus};

/// Input rejected before any remote call was made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}{message}", .field.as_deref().map(|f| format!("{f}: ")).unwrap_or_default())]
pub struct ValidationError {
    pub message: String,
    /// Name of the offending parameter, when there is one.
    pub field: Option<String>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

/// Non-2xx answer from a fal endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{status}: {message}")]
pub struct APIError {
    pub status: u16,
    /// Best human-readable message found in the body, else the status reason.
    pub message: String,
    /// Value of the request id response header, if fal sent one.
    pub request_id: Option<String>,
    pub raw_body: Option<String>,
}

impl APIError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            request_id: None,
            raw_body: None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The request never produced an HTTP response.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    #[source]
    pub source: Option<reqwest::Error>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Request,
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TransportErrorKind::Timeout => "request timed out",
            TransportErrorKind::Connect => "connection failed",
            TransportErrorKind::Request => "request error",
            TransportErrorKind::Other => "transport error",
        })
    }
}

/// Failure of a single client call.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Api(#[from] APIError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Failure of one orchestrated model workflow, tagged with the step that failed.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("invalid input: {0}")]
    InvalidInput(ValidationError),

    #[error("upload failed: {source}")]
    UploadFailed {
        #[source]
        source: Error,
    },

    #[error("submit failed for {model}: {source}")]
    SubmitFailed {
        model: String,
        #[source]
        source: Error,
    },

    #[error("status poll failed for {handle}: {source}")]
    StatusFailed {
        handle: JobHandle,
        #[source]
        source: Error,
    },

    #[error("timeout waiting for model result: {handle} still pending after {elapsed:?} (limit {timeout:?})")]
    Timeout {
        handle: JobHandle,
        elapsed: Duration,
        timeout: Duration,
    },

    #[error("model run failed: {status} ({handle})")]
    JobFailed { handle: JobHandle, status: JobStatus },

    #[error("result fetch failed for {handle}: {source}")]
    ResultFetchFailed {
        handle: JobHandle,
        #[source]
        source: Error,
    },
}

impl WorkflowError {
    /// The job handle the failure relates to, once a job was submitted.
    pub fn handle(&self) -> Option<&JobHandle> {
        match self {
            WorkflowError::StatusFailed { handle, .. }
            | WorkflowError::Timeout { handle, .. }
            | WorkflowError::JobFailed { handle, .. }
            | WorkflowError::ResultFetchFailed { handle, .. } => Some(handle),
            WorkflowError::InvalidInput(_)
            | WorkflowError::UploadFailed { .. }
            | WorkflowError::SubmitFailed { .. } => None,
        }
    }
}

impl From<ValidationError> for WorkflowError {
    fn from(err: ValidationError) -> Self {
        WorkflowError::InvalidInput(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_formats_with_field() {
        let err = ValidationError::new("is required").with_field("model_id");
        assert_eq!(err.to_string(), "model_id: is required");
    }

    #[test]
    fn validation_error_without_field() {
        assert_eq!(ValidationError::new("bad input").to_string(), "bad input");
    }

    #[test]
    fn api_error_keeps_status_and_body() {
        let api_err = APIError {
            status: 422,
            message: "prompt is required".into(),
            request_id: Some("req_123".into()),
            raw_body: Some("{\"detail\":\"prompt is required\"}".into()),
        };

        assert_eq!(api_err.to_string(), "422: prompt is required");
        assert!(api_err.raw_body.is_some());
    }

    #[test]
    fn job_failed_reports_status_and_handle() {
        let handle = JobHandle::new("fal-ai/flux/dev", "req-9");
        let err = WorkflowError::JobFailed {
            handle: handle.clone(),
            status: JobStatus::Cancelled,
        };
        assert_eq!(
            err.to_string(),
            "model run failed: CANCELLED (fal-ai/flux/dev#req-9)"
        );
        assert_eq!(err.handle(), Some(&handle));
    }

    #[test]
    fn submit_failure_has_no_handle() {
        let err = WorkflowError::SubmitFailed {
            model: "fal-ai/flux/dev".into(),
            source: Error::Config("boom".into()),
        };
        assert!(err.handle().is_none());
        assert!(err.to_string().contains("fal-ai/flux/dev"));
    }
}
