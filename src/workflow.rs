//! Upload, submit, poll and fetch composed into one model workflow.
//!
//! ```rust,ignore
//! use fal_queue::{Client, Orchestrator, WorkflowRequest};
//!
//! let orchestrator = Orchestrator::new(Client::from_api_key(key)?);
//! let output = orchestrator
//!     .run(WorkflowRequest::new("fal-ai/flux/dev", input))
//!     .await?;
//! ```
//!
//! ## Timeout boundary
//!
//! Elapsed time is checked only after a poll returns a non-terminal status, and
//! only strictly exceeding the timeout fails. A job can therefore run for up to
//! one extra polling interval past the timeout before [`WorkflowError::Timeout`]
//! fires, and a terminal status observed on that last poll still wins.

use std::time::Duration;

use serde_json::Value;
use tokio::time::{sleep, Instant};

use crate::{
    api::InferenceApi,
    assets::{resolve_mime_type, BinaryAsset},
    errors::{ValidationError, WorkflowError},
    identifiers::ModelId,
    telemetry::{JobPollMetrics, MetricsCallbacks, Telemetry},
    types::{JobHandle, JobStatus, JobSubmission, JsonMap, StatusReport, UploadedAsset},
};

/// Payload field that receives the uploaded file URL unless overridden.
pub const DEFAULT_FILE_FIELD: &str = "file_url";

/// Default pause between status polls (5 seconds).
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(5);

/// Default limit on time spent polling (300 seconds).
pub const DEFAULT_WORKFLOW_TIMEOUT: Duration = Duration::from_secs(300);

/// Polling cadence and time limit of one workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowOptions {
    pub polling_interval: Duration,
    pub timeout: Duration,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self {
            polling_interval: DEFAULT_POLLING_INTERVAL,
            timeout: DEFAULT_WORKFLOW_TIMEOUT,
        }
    }
}

fn positive_secs(value: f64, field: &str) -> Result<Duration, ValidationError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ValidationError::new(format!(
            "must be a positive number of seconds (got {value})"
        ))
        .with_field(field));
    }
    Duration::try_from_secs_f64(value)
        .map_err(|err| ValidationError::new(err.to_string()).with_field(field))
}

impl WorkflowOptions {
    /// Options from host-provided second counts.
    pub fn from_secs(polling_interval: f64, timeout: f64) -> Result<Self, ValidationError> {
        Ok(Self {
            polling_interval: positive_secs(polling_interval, "polling_interval")?,
            timeout: positive_secs(timeout, "timeout")?,
        })
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.polling_interval.is_zero() {
            return Err(ValidationError::new("must be positive").with_field("polling_interval"));
        }
        if self.timeout.is_zero() {
            return Err(ValidationError::new("must be positive").with_field("timeout"));
        }
        Ok(())
    }
}

/// A binary payload to upload before submitting, and where to put its URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInput {
    pub asset: BinaryAsset,
    /// MIME type given by the caller; loses to a sniffed type.
    pub declared_mime_type: Option<String>,
    pub field_name: String,
}

impl FileInput {
    pub fn new(asset: BinaryAsset) -> Self {
        Self {
            asset,
            declared_mime_type: None,
            field_name: DEFAULT_FILE_FIELD.to_string(),
        }
    }

    pub fn with_field_name(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = field_name.into();
        self
    }

    pub fn with_declared_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.declared_mime_type = Some(mime_type.into());
        self
    }
}

/// Everything one model workflow needs.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowRequest {
    pub model_id: ModelId,
    pub input: JsonMap,
    pub file: Option<FileInput>,
    pub options: WorkflowOptions,
}

impl WorkflowRequest {
    pub fn new(model_id: impl Into<ModelId>, input: JsonMap) -> Self {
        Self {
            model_id: model_id.into(),
            input,
            file: None,
            options: WorkflowOptions::default(),
        }
    }

    pub fn with_file(mut self, file: FileInput) -> Self {
        self.file = Some(file);
        self
    }

    pub fn with_options(mut self, options: WorkflowOptions) -> Self {
        self.options = options;
        self
    }
}

/// Drives model invocations to completion or a bounded failure.
///
/// Holds no per-job state, so one orchestrator can serve any number of
/// concurrent workflows.
#[derive(Clone)]
pub struct Orchestrator<A> {
    api: A,
    telemetry: Telemetry,
}

impl<A: InferenceApi> Orchestrator<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            telemetry: Telemetry::default(),
        }
    }

    /// Report each status poll to `callbacks.job_poll`.
    pub fn with_metrics(mut self, callbacks: MetricsCallbacks) -> Self {
        self.telemetry = Telemetry::new(Some(callbacks));
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Upload (optional), submit, poll until terminal, then fetch the result.
    pub async fn run(&self, req: WorkflowRequest) -> Result<Value, WorkflowError> {
        req.options.validate()?;
        let WorkflowRequest {
            model_id,
            mut input,
            file,
            options,
        } = req;
        if model_id.is_empty() {
            return Err(ValidationError::new("model id is required")
                .with_field("model_id")
                .into());
        }

        if let Some(file) = &file {
            let field = file.field_name.trim();
            if field.is_empty() {
                return Err(ValidationError::new("file input field name is required")
                    .with_field("file_input_name")
                    .into());
            }
            let uploaded = self.upload_file(file).await?;
            input.insert(field.to_string(), Value::String(uploaded.url));
        }

        let submission = JobSubmission::new(model_id, input)?;
        let handle = self.submit(&submission).await?;
        self.wait_for_completion(&handle, &options).await?;
        self.fetch_result(&handle).await
    }

    /// Upload a file input with its resolved MIME type.
    pub async fn upload_file(&self, file: &FileInput) -> Result<UploadedAsset, WorkflowError> {
        let content_type = resolve_mime_type(&file.asset, file.declared_mime_type.as_deref());
        #[cfg(feature = "tracing")]
        tracing::debug!(
            bytes = file.asset.len(),
            content_type = %content_type,
            field = %file.field_name,
            "uploading file input"
        );
        self.api
            .upload(&file.asset, &content_type)
            .await
            .map_err(|source| WorkflowError::UploadFailed { source })
    }

    pub async fn submit(&self, submission: &JobSubmission) -> Result<JobHandle, WorkflowError> {
        let model_id = submission.model_id();
        let request_id = self
            .api
            .submit(model_id, submission.input())
            .await
            .map_err(|source| WorkflowError::SubmitFailed {
                model: model_id.to_string(),
                source,
            })?;
        let handle = JobHandle::new(model_id.clone(), request_id);
        #[cfg(feature = "tracing")]
        tracing::debug!(handle = %handle, "job submitted");
        Ok(handle)
    }

    /// Poll until the job reaches a terminal state.
    ///
    /// Sleeps before every poll. Returns the COMPLETED report; FAILED and
    /// CANCELLED become [`WorkflowError::JobFailed`].
    pub async fn wait_for_completion(
        &self,
        handle: &JobHandle,
        options: &WorkflowOptions,
    ) -> Result<StatusReport, WorkflowError> {
        let started = Instant::now();
        let mut attempt: u32 = 0;
        loop {
            sleep(options.polling_interval).await;
            attempt += 1;

            let report =
                self.api
                    .status(handle)
                    .await
                    .map_err(|source| WorkflowError::StatusFailed {
                        handle: handle.clone(),
                        source,
                    })?;
            let elapsed = started.elapsed();

            #[cfg(feature = "tracing")]
            tracing::debug!(
                handle = %handle,
                status = %report.status,
                attempt,
                elapsed_ms = elapsed.as_millis() as u64,
                "job status"
            );
            self.telemetry.record_poll(JobPollMetrics {
                handle: handle.clone(),
                status: report.status.clone(),
                attempt,
                elapsed,
            });

            match report.status {
                JobStatus::Completed => return Ok(report),
                JobStatus::Failed | JobStatus::Cancelled => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(handle = %handle, status = %report.status, "job ended without output");
                    return Err(WorkflowError::JobFailed {
                        handle: handle.clone(),
                        status: report.status,
                    });
                }
                _ => {}
            }

            if elapsed > options.timeout {
                #[cfg(feature = "tracing")]
                tracing::warn!(handle = %handle, elapsed_ms = elapsed.as_millis() as u64, "job timed out");
                return Err(WorkflowError::Timeout {
                    handle: handle.clone(),
                    elapsed,
                    timeout: options.timeout,
                });
            }
        }
    }

    pub async fn fetch_result(&self, handle: &JobHandle) -> Result<Value, WorkflowError> {
        self.api
            .result(handle)
            .await
            .map_err(|source| WorkflowError::ResultFetchFailed {
                handle: handle.clone(),
                source,
            })
    }
}
