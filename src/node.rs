//! Host-facing item loop.
//!
//! An automation host hands over a batch of items, each with its own resolved
//! [`Operation`]. Every item yields one [`OutputRecord`], or one per element when
//! the remote answers with a JSON array, tagged with the item's index. A failing
//! item either stops the batch with an [`ItemError`] or, with
//! [`ExecuteOptions::continue_on_fail`], becomes an error record.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::{
    api::InferenceApi,
    assets::{resolve_mime_type, BinaryAsset},
    errors::{Error, ValidationError, WorkflowError},
    identifiers::ModelId,
    types::{JobHandle, JsonMap},
    workflow::{
        FileInput, Orchestrator, WorkflowOptions, WorkflowRequest, DEFAULT_FILE_FIELD,
        DEFAULT_POLLING_INTERVAL, DEFAULT_WORKFLOW_TIMEOUT,
    },
};

/// One key/value pair of form-mode input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

impl FormField {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Model input as the host collected it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "data", rename_all = "snake_case")]
pub enum InputData {
    /// JSON text that must decode to an object.
    Raw(String),
    /// Key/value pairs; values are sent as strings, later keys win.
    Form(Vec<FormField>),
}

impl Default for InputData {
    fn default() -> Self {
        InputData::Form(Vec::new())
    }
}

impl InputData {
    pub fn resolve(&self) -> Result<JsonMap, ValidationError> {
        match self {
            InputData::Raw(text) => {
                if text.trim().is_empty() {
                    return Err(ValidationError::new("input JSON is empty")
                        .with_field("input_data_raw"));
                }
                match serde_json::from_str::<Value>(text) {
                    Ok(Value::Object(map)) => Ok(map),
                    Ok(_) => Err(ValidationError::new("input JSON must be an object")
                        .with_field("input_data_raw")),
                    Err(err) => Err(ValidationError::new(format!("invalid input JSON: {err}"))
                        .with_field("input_data_raw")),
                }
            }
            InputData::Form(fields) => {
                let mut map = JsonMap::new();
                for field in fields {
                    let key = field.key.trim();
                    if key.is_empty() {
                        return Err(ValidationError::new("input key must not be empty")
                            .with_field("input_data_form"));
                    }
                    map.insert(key.to_string(), Value::String(field.value.clone()));
                }
                Ok(map)
            }
        }
    }
}

/// Names the binary property of an item to upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInputConfig {
    pub binary_property: String,
    #[serde(default)]
    pub declared_mime_type: Option<String>,
    #[serde(default = "default_file_field")]
    pub field_name: String,
}

fn default_file_field() -> String {
    DEFAULT_FILE_FIELD.to_string()
}

impl FileInputConfig {
    pub fn new(binary_property: impl Into<String>) -> Self {
        Self {
            binary_property: binary_property.into(),
            declared_mime_type: None,
            field_name: default_file_field(),
        }
    }
}

fn default_polling_secs() -> f64 {
    DEFAULT_POLLING_INTERVAL.as_secs_f64()
}

fn default_timeout_secs() -> f64 {
    DEFAULT_WORKFLOW_TIMEOUT.as_secs_f64()
}

/// Settings of the model workflow operation for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowItemConfig {
    pub model_id: String,
    #[serde(default)]
    pub input: InputData,
    #[serde(default)]
    pub file: Option<FileInputConfig>,
    #[serde(default = "default_polling_secs")]
    pub polling_interval_secs: f64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
}

impl WorkflowItemConfig {
    pub fn new(model_id: impl Into<String>, input: InputData) -> Self {
        Self {
            model_id: model_id.into(),
            input,
            file: None,
            polling_interval_secs: default_polling_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Resolves this config against `item` into a ready workflow request.
    pub fn into_request(self, item: &InputItem) -> Result<WorkflowRequest, ValidationError> {
        let options = WorkflowOptions::from_secs(self.polling_interval_secs, self.timeout_secs)?;
        let input = self.input.resolve()?;
        let mut request = WorkflowRequest::new(require_model(&self.model_id)?, input)
            .with_options(options);
        if let Some(file) = self.file {
            let asset = item.binary(&file.binary_property)?.clone();
            let mut file_input = FileInput::new(asset).with_field_name(file.field_name);
            file_input.declared_mime_type = file.declared_mime_type;
            request = request.with_file(file_input);
        }
        Ok(request)
    }
}

/// What to do with one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Operation {
    /// Run a model and wait in the same request.
    RunSync { model_id: String, input: InputData },
    /// Queue a model run; outputs `{"requestId": ...}`.
    Submit { model_id: String, input: InputData },
    GetStatus { model_id: String, request_id: String },
    GetResult { model_id: String, request_id: String },
    /// Upload a binary property; outputs `{"url": ...}`.
    Upload {
        binary_property: String,
        #[serde(default)]
        declared_mime_type: Option<String>,
    },
    /// Upload (optional), submit, poll and fetch.
    ModelWorkflow(WorkflowItemConfig),
}

/// One input item: JSON plus named binary properties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputItem {
    pub json: Value,
    pub binary: HashMap<String, BinaryAsset>,
}

impl InputItem {
    pub fn with_binary(mut self, name: impl Into<String>, asset: BinaryAsset) -> Self {
        self.binary.insert(name.into(), asset);
        self
    }

    pub fn binary(&self, name: &str) -> Result<&BinaryAsset, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::new("binary property name is required")
                .with_field("file"));
        }
        self.binary.get(name).ok_or_else(|| {
            ValidationError::new(format!("item has no binary property {name:?}"))
                .with_field("file")
        })
    }
}

/// An item together with its resolved operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRequest {
    pub item: InputItem,
    pub operation: Operation,
}

impl ItemRequest {
    pub fn new(item: InputItem, operation: Operation) -> Self {
        Self { item, operation }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
    pub continue_on_fail: bool,
}

/// Output row handed back to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputRecord {
    pub json: Value,
    /// Index of the input item that produced this record.
    pub paired_item: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] ValidationError),

    #[error(transparent)]
    Remote(#[from] Error),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

/// Failure of one item, stopping the batch.
#[derive(Debug, Error)]
#[error("item {index}: {source}")]
pub struct ItemError {
    pub index: usize,
    #[source]
    pub source: NodeError,
}

fn require_model(model_id: &str) -> Result<ModelId, ValidationError> {
    let model = ModelId::new(model_id);
    if model.is_empty() {
        return Err(ValidationError::new("model id is required").with_field("model_id"));
    }
    Ok(model)
}

fn require_handle(model_id: &str, request_id: &str) -> Result<JobHandle, ValidationError> {
    let handle = JobHandle::new(require_model(model_id)?, request_id);
    if handle.request_id.is_empty() {
        return Err(ValidationError::new("request id is required").with_field("request_id"));
    }
    Ok(handle)
}

async fn execute_item<A: InferenceApi>(
    orchestrator: &Orchestrator<A>,
    item: &InputItem,
    operation: Operation,
) -> Result<Value, NodeError> {
    let api = orchestrator.api();
    let value = match operation {
        Operation::RunSync { model_id, input } => {
            let model = require_model(&model_id)?;
            api.run(&model, &input.resolve()?).await?
        }
        Operation::Submit { model_id, input } => {
            let model = require_model(&model_id)?;
            let request_id = api.submit(&model, &input.resolve()?).await?;
            json!({ "requestId": request_id })
        }
        Operation::GetStatus {
            model_id,
            request_id,
        } => {
            let handle = require_handle(&model_id, &request_id)?;
            serde_json::to_value(api.status(&handle).await?).map_err(Error::from)?
        }
        Operation::GetResult {
            model_id,
            request_id,
        } => {
            let handle = require_handle(&model_id, &request_id)?;
            api.result(&handle).await?
        }
        Operation::Upload {
            binary_property,
            declared_mime_type,
        } => {
            let asset = item.binary(&binary_property)?;
            let content_type = resolve_mime_type(asset, declared_mime_type.as_deref());
            let uploaded = api.upload(asset, &content_type).await?;
            json!({ "url": uploaded.url })
        }
        Operation::ModelWorkflow(config) => {
            let request = config.into_request(item)?;
            orchestrator.run(request).await?
        }
    };
    Ok(value)
}

fn push_records(out: &mut Vec<OutputRecord>, value: Value, index: usize) {
    match value {
        Value::Array(elements) => out.extend(elements.into_iter().map(|json| OutputRecord {
            json,
            paired_item: index,
            error: None,
        })),
        json => out.push(OutputRecord {
            json,
            paired_item: index,
            error: None,
        }),
    }
}

/// Runs every item in order.
///
/// Items are processed sequentially; a host wanting parallelism runs several
/// batches against a shared (cloned) orchestrator.
pub async fn execute<A: InferenceApi>(
    orchestrator: &Orchestrator<A>,
    requests: Vec<ItemRequest>,
    options: ExecuteOptions,
) -> Result<Vec<OutputRecord>, ItemError> {
    let mut out = Vec::with_capacity(requests.len());
    for (index, ItemRequest { item, operation }) in requests.into_iter().enumerate() {
        match execute_item(orchestrator, &item, operation).await {
            Ok(value) => push_records(&mut out, value, index),
            Err(err) if options.continue_on_fail => {
                #[cfg(feature = "tracing")]
                tracing::warn!(item = index, error = %err, "item failed; continuing");
                let message = err.to_string();
                out.push(OutputRecord {
                    json: json!({ "error": message }),
                    paired_item: index,
                    error: Some(message),
                });
            }
            Err(source) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(item = index, error = %source, "item failed");
                return Err(ItemError { index, source });
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::APIError,
        mock::{MockApi, MockCall, MockConfig},
        types::JobStatus,
    };

    fn workflow(model: &str) -> Operation {
        Operation::ModelWorkflow(WorkflowItemConfig {
            polling_interval_secs: 1.0,
            timeout_secs: 10.0,
            ..WorkflowItemConfig::new(model, InputData::Raw(r#"{"prompt":"hi"}"#.into()))
        })
    }

    #[test]
    fn raw_input_must_be_object() {
        let map = InputData::Raw(r#"{"a":1,"b":[true]}"#.into())
            .resolve()
            .unwrap();
        assert_eq!(map["a"], json!(1));

        assert!(InputData::Raw("[1,2]".into()).resolve().is_err());
        assert!(InputData::Raw("{not json".into()).resolve().is_err());
        assert!(InputData::Raw("".into()).resolve().is_err());
        assert_eq!(
            InputData::Raw("  \n".into()).resolve().unwrap_err().field.as_deref(),
            Some("input_data_raw")
        );
    }

    #[test]
    fn item_config_defaults_follow_workflow_defaults() {
        let cfg = WorkflowItemConfig::new("fal-ai/flux/dev", InputData::default());
        let opts = WorkflowOptions::from_secs(cfg.polling_interval_secs, cfg.timeout_secs).unwrap();
        assert_eq!(opts, WorkflowOptions::default());
    }

    #[tokio::test]
    async fn blank_raw_input_fails_before_submit() {
        let api = MockApi::new(MockConfig::default());
        let orchestrator = Orchestrator::new(api.clone());

        let err = execute(
            &orchestrator,
            vec![ItemRequest::new(
                InputItem::default(),
                Operation::Submit {
                    model_id: "fal-ai/flux/dev".into(),
                    input: InputData::Raw(String::new()),
                },
            )],
            ExecuteOptions::default(),
        )
        .await
        .expect_err("blank raw input");

        assert!(matches!(err.source, NodeError::InvalidInput(_)));
        assert!(api.calls().is_empty());
    }

    #[test]
    fn form_input_keeps_last_value_per_key() {
        let map = InputData::Form(vec![
            FormField::new("prompt", "first"),
            FormField::new("steps", "4"),
            FormField::new("prompt", "second"),
        ])
        .resolve()
        .unwrap();
        assert_eq!(map["prompt"], json!("second"));
        assert_eq!(map["steps"], json!("4"));

        assert!(InputData::Form(vec![FormField::new(" ", "x")])
            .resolve()
            .is_err());
    }

    #[test]
    fn operation_deserializes_from_host_config() {
        let op: Operation = serde_json::from_value(json!({
            "operation": "model_workflow",
            "model_id": "fal-ai/esrgan",
            "input": { "mode": "form", "data": [{ "key": "scale", "value": "2" }] },
            "file": { "binary_property": "data" }
        }))
        .unwrap();
        match op {
            Operation::ModelWorkflow(cfg) => {
                assert_eq!(cfg.polling_interval_secs, 5.0);
                assert_eq!(cfg.timeout_secs, 300.0);
                assert_eq!(cfg.file.unwrap().field_name, "file_url");
            }
            other => panic!("unexpected operation {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn array_results_fan_out_per_element() {
        let api = MockApi::new(
            MockConfig::default()
                .with_statuses(vec![JobStatus::Completed])
                .with_result(json!([{ "n": 1 }, { "n": 2 }])),
        );
        let orchestrator = Orchestrator::new(api);

        let out = execute(
            &orchestrator,
            vec![
                ItemRequest::new(InputItem::default(), workflow("fal-ai/a/b")),
                ItemRequest::new(InputItem::default(), workflow("fal-ai/a/b")),
            ],
            ExecuteOptions::default(),
        )
        .await
        .expect("batch should succeed");

        let tags: Vec<(usize, Value)> = out.into_iter().map(|r| (r.paired_item, r.json)).collect();
        assert_eq!(
            tags,
            vec![
                (0, json!({ "n": 1 })),
                (0, json!({ "n": 2 })),
                (1, json!({ "n": 1 })),
                (1, json!({ "n": 2 })),
            ]
        );
    }

    #[tokio::test]
    async fn failure_stops_batch_with_item_index() {
        let api = MockApi::new(MockConfig::default());
        let orchestrator = Orchestrator::new(api.clone());

        let err = execute(
            &orchestrator,
            vec![
                ItemRequest::new(
                    InputItem::default(),
                    Operation::RunSync {
                        model_id: "fal-ai/fast-sdxl".into(),
                        input: InputData::default(),
                    },
                ),
                ItemRequest::new(
                    InputItem::default(),
                    Operation::RunSync {
                        model_id: "fal-ai/fast-sdxl".into(),
                        input: InputData::Raw("nope".into()),
                    },
                ),
                ItemRequest::new(
                    InputItem::default(),
                    Operation::RunSync {
                        model_id: "fal-ai/fast-sdxl".into(),
                        input: InputData::default(),
                    },
                ),
            ],
            ExecuteOptions::default(),
        )
        .await
        .expect_err("second item should fail");

        assert_eq!(err.index, 1);
        assert!(matches!(err.source, NodeError::InvalidInput(_)));
        assert_eq!(api.calls(), vec![MockCall::Run]);
    }

    #[tokio::test]
    async fn continue_on_fail_emits_error_record() {
        let api = MockApi::new(
            MockConfig::default()
                .with_run_error(Error::Api(APIError::new(500, "model crashed")))
                .with_run_output(json!({ "ok": true })),
        );
        let orchestrator = Orchestrator::new(api);
        let run = || Operation::RunSync {
            model_id: "fal-ai/fast-sdxl".into(),
            input: InputData::default(),
        };

        let out = execute(
            &orchestrator,
            vec![
                ItemRequest::new(InputItem::default(), run()),
                ItemRequest::new(InputItem::default(), run()),
            ],
            ExecuteOptions {
                continue_on_fail: true,
            },
        )
        .await
        .expect("batch should continue");

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].paired_item, 0);
        assert_eq!(out[0].json, json!({ "error": "500: model crashed" }));
        assert_eq!(out[0].error.as_deref(), Some("500: model crashed"));
        assert_eq!(out[1].paired_item, 1);
        assert_eq!(out[1].json, json!({ "ok": true }));
    }

    #[tokio::test]
    async fn queue_and_storage_operations() {
        let api = MockApi::new(
            MockConfig::default()
                .with_request_id("req-42")
                .with_statuses(vec![JobStatus::InProgress])
                .with_upload_url("https://cdn/a.png"),
        );
        let orchestrator = Orchestrator::new(api.clone());
        let item = InputItem::default().with_binary(
            "data",
            BinaryAsset::new(b"hello".to_vec()).with_mime_type("text/plain"),
        );

        let out = execute(
            &orchestrator,
            vec![
                ItemRequest::new(
                    InputItem::default(),
                    Operation::Submit {
                        model_id: "fal-ai/flux/dev".into(),
                        input: InputData::default(),
                    },
                ),
                ItemRequest::new(
                    InputItem::default(),
                    Operation::GetStatus {
                        model_id: "fal-ai/flux/dev".into(),
                        request_id: "req-42".into(),
                    },
                ),
                ItemRequest::new(
                    item,
                    Operation::Upload {
                        binary_property: "data".into(),
                        declared_mime_type: None,
                    },
                ),
            ],
            ExecuteOptions::default(),
        )
        .await
        .expect("batch should succeed");

        assert_eq!(out[0].json, json!({ "requestId": "req-42" }));
        assert_eq!(out[1].json, json!({ "status": "IN_PROGRESS" }));
        assert_eq!(out[2].json, json!({ "url": "https://cdn/a.png" }));
        assert_eq!(api.uploads(), vec![("text/plain".to_string(), 5)]);
    }

    #[tokio::test]
    async fn missing_binary_property_is_invalid_input() {
        let api = MockApi::new(MockConfig::default());
        let orchestrator = Orchestrator::new(api.clone());
        let mut config = WorkflowItemConfig::new("fal-ai/esrgan", InputData::default());
        config.file = Some(FileInputConfig::new("image"));

        let err = execute(
            &orchestrator,
            vec![ItemRequest::new(
                InputItem::default(),
                Operation::ModelWorkflow(config),
            )],
            ExecuteOptions::default(),
        )
        .await
        .expect_err("missing binary");

        assert_eq!(err.index, 0);
        match err.source {
            NodeError::InvalidInput(v) => assert_eq!(v.field.as_deref(), Some("file")),
            other => panic!("expected invalid input, got {other:?}"),
        }
        assert!(api.calls().is_empty());
    }
}
