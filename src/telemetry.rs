use std::{fmt, sync::Arc, time::Duration};

use crate::{
    identifiers::ModelId,
    types::{JobHandle, JobStatus},
};

/// User-provided callbacks for emitting metrics without taking on a tracing dependency.
#[derive(Clone, Default)]
pub struct MetricsCallbacks {
    pub http_request: Option<Arc<dyn Fn(HttpRequestMetrics) + Send + Sync>>,
    pub job_poll: Option<Arc<dyn Fn(JobPollMetrics) + Send + Sync>>,
}

impl fmt::Debug for MetricsCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsCallbacks")
            .field(
                "http_request",
                &self.http_request.as_ref().map(|_| "callback"),
            )
            .field("job_poll", &self.job_poll.as_ref().map(|_| "callback"))
            .finish()
    }
}

/// Common request metadata shared by HTTP telemetry events.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    pub model: Option<ModelId>,
    pub request_id: Option<String>,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        if let Some(id) = request_id {
            if !id.trim().is_empty() {
                self.request_id = Some(id);
            }
        }
        self
    }

    pub fn with_model(mut self, model: Option<ModelId>) -> Self {
        self.model = model;
        self
    }
}

/// HTTP request latency and outcome.
#[derive(Clone, Debug)]
pub struct HttpRequestMetrics {
    pub latency: Duration,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub context: RequestContext,
}

/// One observed status poll of a queued job.
#[derive(Clone, Debug)]
pub struct JobPollMetrics {
    pub handle: JobHandle,
    pub status: JobStatus,
    /// 1-indexed poll number for this job.
    pub attempt: u32,
    /// Time since the job was submitted.
    pub elapsed: Duration,
}

/// Internal helper that owns the registered callbacks (if any).
#[derive(Clone, Default)]
pub(crate) struct Telemetry {
    callbacks: MetricsCallbacks,
}

impl Telemetry {
    pub fn new(callbacks: Option<MetricsCallbacks>) -> Self {
        Self {
            callbacks: callbacks.unwrap_or_default(),
        }
    }

    pub fn http_enabled(&self) -> bool {
        self.callbacks.http_request.is_some()
    }

    pub fn record_http(&self, metrics: HttpRequestMetrics) {
        if let Some(cb) = &self.callbacks.http_request {
            cb(metrics);
        }
    }

    pub fn record_poll(&self, metrics: JobPollMetrics) {
        if let Some(cb) = &self.callbacks.job_poll {
            cb(metrics);
        }
    }
}
