//! Synchronous model runs.

use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;

use crate::{
    client::ClientInner,
    errors::{Error, Result, ValidationError},
    identifiers::ModelId,
    types::JsonMap,
};

/// Client for direct (non-queued) model runs.
#[derive(Clone)]
pub struct ModelsClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl ModelsClient {
    /// Run a model and wait for its output in the same HTTP request.
    ///
    /// Long-running models may exceed the request timeout; use the queue for those.
    pub async fn run(&self, model: &ModelId, input: &JsonMap) -> Result<Value> {
        if model.is_empty() {
            return Err(Error::Validation(
                ValidationError::new("model id is required").with_field("model_id"),
            ));
        }
        let path = format!("/{}", model.as_str().trim_matches('/'));
        let builder = self
            .inner
            .request(Method::POST, &self.inner.run_url, &path)?
            .json(input);
        let builder = self.inner.authorized(builder);
        let ctx = self.inner.make_context(&Method::POST, &path, Some(model));
        self.inner.execute_json(builder, ctx).await
    }
}
