//! In-memory [`InferenceApi`] for offline tests.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{
    api::InferenceApi,
    assets::BinaryAsset,
    errors::{Error, Result},
    identifiers::{ModelId, RequestId},
    types::{JobHandle, JobStatus, JobSubmission, JsonMap, StatusReport, UploadedAsset},
};

/// Remote operation observed by a [`MockApi`], in call order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockCall {
    Upload,
    Submit,
    Status,
    Result,
    Run,
}

/// Scripted remote behaviour.
///
/// Status reports are served in order and the last one repeats forever, so an
/// unchanged remote keeps answering with the same state.
pub struct MockConfig {
    pub request_id: String,
    pub statuses: Vec<StatusReport>,
    pub result: Value,
    pub run_output: Value,
    pub upload_url: String,
    pub submit_error: Option<Error>,
    pub status_error: Option<Error>,
    pub result_error: Option<Error>,
    pub upload_error: Option<Error>,
    pub run_error: Option<Error>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            request_id: "mock-request".to_string(),
            statuses: Vec::new(),
            result: json!({}),
            run_output: json!({}),
            upload_url: "https://mock.fal.media/files/upload.bin".to_string(),
            submit_error: None,
            status_error: None,
            result_error: None,
            upload_error: None,
            run_error: None,
        }
    }
}

impl MockConfig {
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_statuses(mut self, statuses: Vec<JobStatus>) -> Self {
        self.statuses = statuses.into_iter().map(StatusReport::new).collect();
        self
    }

    pub fn with_status_reports(mut self, reports: Vec<StatusReport>) -> Self {
        self.statuses = reports;
        self
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = result;
        self
    }

    pub fn with_run_output(mut self, output: Value) -> Self {
        self.run_output = output;
        self
    }

    pub fn with_upload_url(mut self, url: impl Into<String>) -> Self {
        self.upload_url = url.into();
        self
    }

    pub fn with_submit_error(mut self, err: Error) -> Self {
        self.submit_error = Some(err);
        self
    }

    pub fn with_status_error(mut self, err: Error) -> Self {
        self.status_error = Some(err);
        self
    }

    pub fn with_result_error(mut self, err: Error) -> Self {
        self.result_error = Some(err);
        self
    }

    pub fn with_upload_error(mut self, err: Error) -> Self {
        self.upload_error = Some(err);
        self
    }

    pub fn with_run_error(mut self, err: Error) -> Self {
        self.run_error = Some(err);
        self
    }
}

struct MockState {
    cfg: MockConfig,
    next_status: usize,
    calls: Vec<MockCall>,
    submissions: Vec<JobSubmission>,
    status_calls: Vec<JobHandle>,
    result_calls: Vec<JobHandle>,
    uploads: Vec<(String, usize)>,
}

/// Cloneable mock; clones share state so tests can inspect calls afterwards.
#[derive(Clone)]
pub struct MockApi {
    inner: Arc<Mutex<MockState>>,
}

impl MockApi {
    pub fn new(cfg: MockConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockState {
                cfg,
                next_status: 0,
                calls: Vec::new(),
                submissions: Vec::new(),
                status_calls: Vec::new(),
                result_calls: Vec::new(),
                uploads: Vec::new(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the calls it recorded.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    pub fn submissions(&self) -> Vec<JobSubmission> {
        self.state().submissions.clone()
    }

    pub fn status_calls(&self) -> Vec<JobHandle> {
        self.state().status_calls.clone()
    }

    pub fn result_calls(&self) -> Vec<JobHandle> {
        self.state().result_calls.clone()
    }

    /// `(content_type, byte_len)` of every upload.
    pub fn uploads(&self) -> Vec<(String, usize)> {
        self.state().uploads.clone()
    }
}

#[async_trait]
impl InferenceApi for MockApi {
    async fn submit(&self, model: &ModelId, input: &JsonMap) -> Result<RequestId> {
        let mut state = self.state();
        state.calls.push(MockCall::Submit);
        if let Some(err) = state.cfg.submit_error.take() {
            return Err(err);
        }
        let submission = JobSubmission::new(model.clone(), input.clone())?;
        state.submissions.push(submission);
        Ok(RequestId::new(state.cfg.request_id.clone()))
    }

    async fn status(&self, handle: &JobHandle) -> Result<StatusReport> {
        let mut state = self.state();
        state.calls.push(MockCall::Status);
        state.status_calls.push(handle.clone());
        if let Some(err) = state.cfg.status_error.take() {
            return Err(err);
        }
        let report = match state.cfg.statuses.len() {
            0 => StatusReport::new(JobStatus::Completed),
            len => state.cfg.statuses[state.next_status.min(len - 1)].clone(),
        };
        state.next_status += 1;
        Ok(report)
    }

    async fn result(&self, handle: &JobHandle) -> Result<Value> {
        let mut state = self.state();
        state.calls.push(MockCall::Result);
        state.result_calls.push(handle.clone());
        if let Some(err) = state.cfg.result_error.take() {
            return Err(err);
        }
        Ok(state.cfg.result.clone())
    }

    async fn upload(&self, asset: &BinaryAsset, content_type: &str) -> Result<UploadedAsset> {
        let mut state = self.state();
        state.calls.push(MockCall::Upload);
        state.uploads.push((content_type.to_string(), asset.len()));
        if let Some(err) = state.cfg.upload_error.take() {
            return Err(err);
        }
        Ok(UploadedAsset {
            url: state.cfg.upload_url.clone(),
        })
    }

    async fn run(&self, _model: &ModelId, _input: &JsonMap) -> Result<Value> {
        let mut state = self.state();
        state.calls.push(MockCall::Run);
        if let Some(err) = state.cfg.run_error.take() {
            return Err(err);
        }
        Ok(state.cfg.run_output.clone())
    }
}
