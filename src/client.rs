use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use reqwest::{
    header::{HeaderMap, ACCEPT, AUTHORIZATION, USER_AGENT},
    Method,
};
use serde::de::DeserializeOwned;

use crate::{
    errors::{Error, Result, TransportError, TransportErrorKind},
    http::{parse_api_error_parts, request_id_from_headers},
    identifiers::ModelId,
    models::ModelsClient,
    queue::QueueClient,
    storage::StorageClient,
    telemetry::{HttpRequestMetrics, MetricsCallbacks, RequestContext, Telemetry},
    API_KEY_ENV, API_KEY_ID_ENV, API_KEY_SECRET_ENV, DEFAULT_CLIENT_HEADER,
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_QUEUE_URL, DEFAULT_REQUEST_TIMEOUT, DEFAULT_RUN_URL,
    DEFAULT_STORAGE_URL,
};

#[derive(Clone, Debug, Default)]
pub struct Config {
    pub api_key: Option<String>,
    /// Queue API base (defaults to `https://queue.fal.run`).
    pub queue_url: Option<String>,
    /// Synchronous run API base (defaults to `https://fal.run`).
    pub run_url: Option<String>,
    /// Storage API base (defaults to `https://rest.alpha.fal.ai`).
    pub storage_url: Option<String>,
    pub client_header: Option<String>,
    pub http_client: Option<reqwest::Client>,
    /// Override the connect timeout (defaults to 5s).
    pub connect_timeout: Option<Duration>,
    /// Override the per-request timeout (defaults to 60s).
    pub timeout: Option<Duration>,
    /// Default extra headers applied to all requests.
    pub default_headers: Option<HeaderMap>,
    /// Optional metrics callbacks (HTTP latency/outcome).
    pub metrics: Option<MetricsCallbacks>,
}

impl Config {
    /// Config with the given credential and every other setting defaulted.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Default::default()
        }
    }

    /// Reads the credential from `FAL_KEY`, or from `FAL_KEY_ID` + `FAL_KEY_SECRET`.
    pub fn from_env() -> Result<Self> {
        let non_empty = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
        };
        let api_key = match non_empty(API_KEY_ENV) {
            Some(key) => key,
            None => match (non_empty(API_KEY_ID_ENV), non_empty(API_KEY_SECRET_ENV)) {
                (Some(id), Some(secret)) => format!("{id}:{secret}"),
                _ => {
                    return Err(Error::Config(format!(
                        "{API_KEY_ENV} (or {API_KEY_ID_ENV} and {API_KEY_SECRET_ENV}) must be set"
                    )))
                }
            },
        };
        Ok(Self::with_api_key(api_key))
    }
}

/// Handle to the fal REST API. Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    pub(crate) queue_url: String,
    pub(crate) run_url: String,
    pub(crate) storage_url: String,
    api_key: String,
    client_header: String,
    http: reqwest::Client,
    request_timeout: Duration,
    default_headers: Option<HeaderMap>,
    telemetry: Telemetry,
}

fn normalize_base(source: Option<String>, default: &str, label: &str) -> Result<String> {
    let base = source
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
        .trim()
        .trim_end_matches('/')
        .to_string();
    reqwest::Url::parse(&base)
        .map_err(|err| Error::Config(format!("invalid {label} url: {err}")))?;
    Ok(base)
}

impl Client {
    pub fn new(cfg: Config) -> Result<Self> {
        let api_key = cfg
            .api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Config("api key is required".to_string()))?;

        let queue_url = normalize_base(cfg.queue_url, DEFAULT_QUEUE_URL, "queue")?;
        let run_url = normalize_base(cfg.run_url, DEFAULT_RUN_URL, "run")?;
        let storage_url = normalize_base(cfg.storage_url, DEFAULT_STORAGE_URL, "storage")?;

        let connect_timeout = cfg.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let request_timeout = cfg.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let http = match cfg.http_client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .connect_timeout(connect_timeout)
                .build()
                .map_err(|err| TransportError {
                    kind: TransportErrorKind::Connect,
                    message: "failed to build http client".to_string(),
                    source: Some(err),
                })?,
        };

        let client_header = cfg
            .client_header
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CLIENT_HEADER.to_string());

        Ok(Self {
            inner: Arc::new(ClientInner {
                queue_url,
                run_url,
                storage_url,
                api_key,
                client_header,
                http,
                request_timeout,
                default_headers: cfg.default_headers,
                telemetry: Telemetry::new(cfg.metrics),
            }),
        })
    }

    /// Shorthand for `Client::new(Config::with_api_key(key))`.
    pub fn from_api_key(api_key: impl Into<String>) -> Result<Self> {
        Self::new(Config::with_api_key(api_key))
    }

    pub fn queue(&self) -> QueueClient {
        QueueClient {
            inner: self.inner.clone(),
        }
    }

    pub fn storage(&self) -> StorageClient {
        StorageClient {
            inner: self.inner.clone(),
        }
    }

    pub fn models(&self) -> ModelsClient {
        ModelsClient {
            inner: self.inner.clone(),
        }
    }
}

impl ClientInner {
    /// Builds a request against `base`, or against `path` itself when it is absolute.
    pub(crate) fn request(
        &self,
        method: Method,
        base: &str,
        path: &str,
    ) -> Result<reqwest::RequestBuilder> {
        let raw = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", base, path.trim_start_matches('/'))
        };
        let url = reqwest::Url::parse(&raw)
            .map_err(|err| Error::Config(format!("invalid path {raw:?}: {err}")))?;
        Ok(self.http.request(method, url))
    }

    /// JSON request to a fal API: auth, client identification, default headers and timeout.
    pub(crate) fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let mut builder = builder
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, self.client_header.as_str())
            .header(AUTHORIZATION, format!("Key {}", self.api_key));
        if let Some(defaults) = &self.default_headers {
            builder = builder.headers(defaults.clone());
        }
        self.with_timeout(builder)
    }

    pub(crate) fn with_timeout(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.timeout(self.request_timeout)
    }

    pub(crate) fn make_context(
        &self,
        method: &Method,
        path: &str,
        model: Option<&ModelId>,
    ) -> RequestContext {
        RequestContext::new(method.as_str(), path).with_model(model.cloned())
    }

    pub(crate) async fn execute_json<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
        ctx: RequestContext,
    ) -> Result<T> {
        let resp = self.send(builder, ctx).await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|err| self.to_transport_error(err))?;
        let parsed = serde_json::from_slice::<T>(&bytes).map_err(Error::Serialization)?;
        Ok(parsed)
    }

    /// Sends one request. Non-2xx answers become [`Error::Api`]; nothing is retried.
    pub(crate) async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        ctx: RequestContext,
    ) -> Result<reqwest::Response> {
        let start = Instant::now();
        let fut = builder.send();
        #[cfg(feature = "tracing")]
        let fut = tracing::Instrument::instrument(
            fut,
            tracing::debug_span!("fal.http", method = %ctx.method, path = %ctx.path),
        );

        match fut.await {
            Ok(resp) => {
                let status = resp.status();
                let headers = resp.headers().clone();
                let http_ctx = ctx.with_request_id(request_id_from_headers(&headers));
                if status.is_success() {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        path = %http_ctx.path,
                        status = %status,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "request completed"
                    );
                    if self.telemetry.http_enabled() {
                        self.telemetry.record_http(HttpRequestMetrics {
                            latency: start.elapsed(),
                            status: Some(status.as_u16()),
                            error: None,
                            context: http_ctx,
                        });
                    }
                    return Ok(resp);
                }

                #[cfg(feature = "tracing")]
                tracing::warn!(
                    path = %http_ctx.path,
                    status = %status,
                    "request failed; returning error"
                );
                if self.telemetry.http_enabled() {
                    self.telemetry.record_http(HttpRequestMetrics {
                        latency: start.elapsed(),
                        status: Some(status.as_u16()),
                        error: Some(format!("http {}", status.as_u16())),
                        context: http_ctx,
                    });
                }
                let body = resp.text().await.unwrap_or_default();
                Err(parse_api_error_parts(status, &headers, body))
            }
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(path = %ctx.path, error = %err, "transport error");
                if self.telemetry.http_enabled() {
                    self.telemetry.record_http(HttpRequestMetrics {
                        latency: start.elapsed(),
                        status: None,
                        error: Some(err.to_string()),
                        context: ctx,
                    });
                }
                Err(self.to_transport_error(err))
            }
        }
    }

    pub(crate) fn to_transport_error(&self, err: reqwest::Error) -> Error {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_request() {
            TransportErrorKind::Request
        } else {
            TransportErrorKind::Other
        };

        TransportError {
            kind,
            message: err.to_string(),
            source: Some(err),
        }
        .into()
    }
}
