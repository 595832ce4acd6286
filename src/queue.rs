//! Queue API client: submit, status and result for asynchronous model runs.

use std::sync::Arc;

use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    client::ClientInner,
    errors::{Error, Result, ValidationError},
    identifiers::{ModelId, RequestId},
    types::{JobHandle, JsonMap, StatusReport},
};

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    request_id: RequestId,
}

/// Client for queue operations.
///
/// ```rust,ignore
/// let queue = client.queue();
/// let request_id = queue.submit(&"fal-ai/flux/dev".into(), &input).await?;
/// let handle = JobHandle::new("fal-ai/flux/dev", request_id);
/// let report = queue.status(&handle).await?;
/// ```
#[derive(Clone)]
pub struct QueueClient {
    pub(crate) inner: Arc<ClientInner>,
}

fn validate_handle(handle: &JobHandle) -> Result<()> {
    if handle.model_id.is_empty() {
        return Err(Error::Validation(
            ValidationError::new("model id is required").with_field("model_id"),
        ));
    }
    if handle.request_id.is_empty() {
        return Err(Error::Validation(
            ValidationError::new("request id is required").with_field("request_id"),
        ));
    }
    Ok(())
}

impl QueueClient {
    /// Queue a model run and return the request id fal issued for it.
    pub async fn submit(&self, model: &ModelId, input: &JsonMap) -> Result<RequestId> {
        if model.is_empty() {
            return Err(Error::Validation(
                ValidationError::new("model id is required").with_field("model_id"),
            ));
        }
        let path = format!("/{}", model.as_str().trim_matches('/'));
        let builder = self
            .inner
            .request(Method::POST, &self.inner.queue_url, &path)?
            .json(input);
        let builder = self.inner.authorized(builder);
        let ctx = self.inner.make_context(&Method::POST, &path, Some(model));
        let resp: SubmitResponse = self.inner.execute_json(builder, ctx).await?;
        if resp.request_id.is_empty() {
            return Err(Error::Validation(
                ValidationError::new("submit response carried an empty request id")
                    .with_field("request_id"),
            ));
        }
        Ok(resp.request_id)
    }

    /// Current queue state of a job. Read-only on the remote side.
    pub async fn status(&self, handle: &JobHandle) -> Result<StatusReport> {
        validate_handle(handle)?;
        let path = format!(
            "/{}/requests/{}/status",
            handle.model_id.app_root(),
            handle.request_id
        );
        self.get_json(&path, handle).await
    }

    /// Output of a completed job, passed through as opaque JSON.
    pub async fn result(&self, handle: &JobHandle) -> Result<Value> {
        validate_handle(handle)?;
        let path = format!(
            "/{}/requests/{}",
            handle.model_id.app_root(),
            handle.request_id
        );
        self.get_json(&path, handle).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        handle: &JobHandle,
    ) -> Result<T> {
        let builder = self
            .inner
            .request(Method::GET, &self.inner.queue_url, path)?;
        let builder = self.inner.authorized(builder);
        let ctx = self
            .inner
            .make_context(&Method::GET, path, Some(&handle.model_id))
            .with_request_id(Some(handle.request_id.to_string()));
        self.inner.execute_json(builder, ctx).await
    }
}
