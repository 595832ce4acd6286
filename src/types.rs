use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    errors::ValidationError,
    identifiers::{ModelId, RequestId},
};

/// JSON object passed through to a model untouched.
pub type JsonMap = serde_json::Map<String, Value>;

/// A model invocation ready to be queued.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSubmission {
    model_id: ModelId,
    input: JsonMap,
}

impl JobSubmission {
    pub fn new(
        model_id: impl Into<ModelId>,
        input: JsonMap,
    ) -> std::result::Result<Self, ValidationError> {
        let model_id = model_id.into();
        if model_id.is_empty() {
            return Err(ValidationError::new("model id is required").with_field("model_id"));
        }
        Ok(Self { model_id, input })
    }

    pub fn model_id(&self) -> &ModelId {
        &self.model_id
    }

    pub fn input(&self) -> &JsonMap {
        &self.input
    }
}

/// Key for every status/result call of one queued job.
///
/// A request id is only meaningful under the model it was issued for, so the
/// two always travel together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHandle {
    pub model_id: ModelId,
    pub request_id: RequestId,
}

impl JobHandle {
    pub fn new(model_id: impl Into<ModelId>, request_id: impl Into<RequestId>) -> Self {
        Self {
            model_id: model_id.into(),
            request_id: request_id.into(),
        }
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.model_id, self.request_id)
    }
}

/// Queue state of a job as reported by fal.
///
/// Unrecognised values are kept verbatim in [`JobStatus::Other`] and treated as
/// still running.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    Other(String),
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Queued => "IN_QUEUE",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
            JobStatus::Other(raw) => raw.as_str(),
        }
    }
}

impl From<String> for JobStatus {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "IN_QUEUE" | "QUEUED" => JobStatus::Queued,
            "IN_PROGRESS" => JobStatus::InProgress,
            "COMPLETED" => JobStatus::Completed,
            "FAILED" => JobStatus::Failed,
            "CANCELLED" | "CANCELED" => JobStatus::Cancelled,
            _ => JobStatus::Other(value),
        }
    }
}

impl From<&str> for JobStatus {
    fn from(value: &str) -> Self {
        JobStatus::from(value.to_string())
    }
}

impl From<JobStatus> for String {
    fn from(value: JobStatus) -> Self {
        match value {
            JobStatus::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status response: the parsed state plus every other field fal returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: JobStatus,
    #[serde(flatten)]
    pub metadata: JsonMap,
}

impl StatusReport {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            metadata: JsonMap::new(),
        }
    }

    pub fn queue_position(&self) -> Option<u64> {
        self.metadata.get("queue_position").and_then(|v| v.as_u64())
    }
}

impl From<JobStatus> for StatusReport {
    fn from(status: JobStatus) -> Self {
        StatusReport::new(status)
    }
}

/// Where an uploaded binary payload can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedAsset {
    pub url: String,
}
