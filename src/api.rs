//! The remote operations the orchestrator composes.
//!
//! [`Client`] implements [`InferenceApi`] against the fal REST API; tests and
//! hosts with their own transport can supply any other implementation.

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    assets::BinaryAsset,
    client::Client,
    errors::Result,
    identifiers::{ModelId, RequestId},
    types::{JobHandle, JsonMap, StatusReport, UploadedAsset},
};

#[async_trait]
pub trait InferenceApi: Send + Sync {
    /// Queue a model run.
    async fn submit(&self, model: &ModelId, input: &JsonMap) -> Result<RequestId>;

    /// Current state of a queued job. Must not change remote state.
    async fn status(&self, handle: &JobHandle) -> Result<StatusReport>;

    /// Output of a completed job.
    async fn result(&self, handle: &JobHandle) -> Result<Value>;

    /// Stage a binary payload in object storage.
    async fn upload(&self, asset: &BinaryAsset, content_type: &str) -> Result<UploadedAsset>;

    /// Run a model synchronously.
    async fn run(&self, model: &ModelId, input: &JsonMap) -> Result<Value>;
}

#[async_trait]
impl InferenceApi for Client {
    async fn submit(&self, model: &ModelId, input: &JsonMap) -> Result<RequestId> {
        self.queue().submit(model, input).await
    }

    async fn status(&self, handle: &JobHandle) -> Result<StatusReport> {
        self.queue().status(handle).await
    }

    async fn result(&self, handle: &JobHandle) -> Result<Value> {
        self.queue().result(handle).await
    }

    async fn upload(&self, asset: &BinaryAsset, content_type: &str) -> Result<UploadedAsset> {
        self.storage().upload(asset, content_type).await
    }

    async fn run(&self, model: &ModelId, input: &JsonMap) -> Result<Value> {
        self.models().run(model, input).await
    }
}

#[async_trait]
impl<T: InferenceApi + ?Sized> InferenceApi for std::sync::Arc<T> {
    async fn submit(&self, model: &ModelId, input: &JsonMap) -> Result<RequestId> {
        (**self).submit(model, input).await
    }

    async fn status(&self, handle: &JobHandle) -> Result<StatusReport> {
        (**self).status(handle).await
    }

    async fn result(&self, handle: &JobHandle) -> Result<Value> {
        (**self).result(handle).await
    }

    async fn upload(&self, asset: &BinaryAsset, content_type: &str) -> Result<UploadedAsset> {
        (**self).upload(asset, content_type).await
    }

    async fn run(&self, model: &ModelId, input: &JsonMap) -> Result<Value> {
        (**self).run(model, input).await
    }
}
