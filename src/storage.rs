//! Storage API client: stages binary payloads on the fal CDN.

use std::sync::Arc;

use reqwest::{header::CONTENT_TYPE, Method};
use serde::{Deserialize, Serialize};

use crate::{
    assets::{BinaryAsset, FALLBACK_MIME_TYPE},
    client::ClientInner,
    errors::{Error, Result, ValidationError},
    types::UploadedAsset,
};

const INITIATE_PATH: &str = "/storage/upload/initiate?storage_type=fal-cdn-v3";

#[derive(Debug, Serialize)]
struct InitiateUploadRequest<'a> {
    content_type: &'a str,
    file_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct InitiateUploadResponse {
    upload_url: String,
    file_url: String,
}

/// Client for storage operations.
#[derive(Clone)]
pub struct StorageClient {
    pub(crate) inner: Arc<ClientInner>,
}

/// File name sent with the upload when the host did not supply one.
fn default_file_name(content_type: &str) -> String {
    let ext = content_type
        .split('/')
        .nth(1)
        .map(|sub| sub.split([';', '+']).next().unwrap_or(sub).trim())
        .filter(|sub| !sub.is_empty() && content_type != FALLBACK_MIME_TYPE)
        .unwrap_or("bin");
    format!("upload.{ext}")
}

/// Final path component of the asset's name, so local directories never leave the host.
fn upload_file_name(name: Option<&str>, content_type: &str) -> String {
    name.and_then(|n| n.rsplit(['/', '\\']).next())
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| default_file_name(content_type))
}

impl StorageClient {
    /// Upload `asset` with the given content type and return its public URL.
    ///
    /// Two calls: an initiate request that reserves a signed upload URL, then a
    /// `PUT` of the raw bytes to that URL.
    pub async fn upload(&self, asset: &BinaryAsset, content_type: &str) -> Result<UploadedAsset> {
        if content_type.trim().is_empty() {
            return Err(Error::Validation(
                ValidationError::new("content type is required").with_field("content_type"),
            ));
        }
        let file_name = upload_file_name(asset.file_name.as_deref(), content_type);

        let builder = self
            .inner
            .request(Method::POST, &self.inner.storage_url, INITIATE_PATH)?
            .json(&InitiateUploadRequest {
                content_type,
                file_name: &file_name,
            });
        let builder = self.inner.authorized(builder);
        let ctx = self
            .inner
            .make_context(&Method::POST, "/storage/upload/initiate", None);
        let initiated: InitiateUploadResponse = self.inner.execute_json(builder, ctx).await?;

        // The signed URL carries its own authorization.
        let builder = self
            .inner
            .request(Method::PUT, &self.inner.storage_url, &initiated.upload_url)?
            .header(CONTENT_TYPE, content_type)
            .body(asset.data.clone());
        let builder = self.inner.with_timeout(builder);
        let ctx = self
            .inner
            .make_context(&Method::PUT, "/storage/upload", None);
        self.inner.send(builder, ctx).await?;

        Ok(UploadedAsset {
            url: initiated.file_url,
        })
    }
}
