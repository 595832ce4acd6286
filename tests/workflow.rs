//! End-to-end workflow tests: the orchestrator and the host item loop driving
//! a real `Client` against a wiremock server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use fal_queue::{
    node::{self, ExecuteOptions, InputData, InputItem, ItemRequest, Operation},
    testing::{fast_options, test_client},
    BinaryAsset, FileInput, JobStatus, JsonMap, Orchestrator, WorkflowError, WorkflowRequest,
};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Serves the given templates in order, repeating the last one.
#[derive(Clone)]
struct SequenceResponder {
    templates: Arc<Mutex<Vec<ResponseTemplate>>>,
}

impl SequenceResponder {
    fn new(mut templates: Vec<ResponseTemplate>) -> Self {
        templates.reverse();
        Self {
            templates: Arc::new(Mutex::new(templates)),
        }
    }
}

impl Respond for SequenceResponder {
    fn respond(&self, _req: &Request) -> ResponseTemplate {
        let mut templates = self.templates.lock().expect("mutex should not be poisoned");
        if templates.len() > 1 {
            templates.pop().expect("non-empty")
        } else {
            templates
                .last()
                .cloned()
                .unwrap_or_else(|| ResponseTemplate::new(500))
        }
    }
}

fn status(s: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "status": s }))
}

async fn mount_submit(server: &MockServer, model_path: &str, request_id: &str) {
    Mock::given(method("POST"))
        .and(path(model_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "request_id": request_id })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn upload_submit_poll_fetch() {
    let server = MockServer::start().await;
    let upload_url = format!("{}/signed/u1", server.uri());

    Mock::given(method("POST"))
        .and(path("/storage/upload/initiate"))
        .and(body_json(json!({ "content_type": "image/png", "file_name": "upload.png" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "upload_url": upload_url,
            "file_url": "https://v3.fal.media/files/in.png"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/signed/u1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/fal-ai/esrgan"))
        .and(body_json(json!({
            "img_url": "https://v3.fal.media/files/in.png",
            "scale": 2
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "request_id": "job-1" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fal-ai/esrgan/requests/job-1/status"))
        .respond_with(SequenceResponder::new(vec![
            status("IN_QUEUE"),
            status("IN_PROGRESS"),
            status("COMPLETED"),
        ]))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fal-ai/esrgan/requests/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "image": { "url": "https://v3.fal.media/files/out.png" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let orchestrator = Orchestrator::new(test_client(&server.uri()));
    let png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    let file = FileInput::new(BinaryAsset::new(png))
        .with_declared_mime_type("image/jpeg")
        .with_field_name("img_url");
    let mut input = JsonMap::new();
    input.insert("img_url".into(), json!("https://stale"));
    input.insert("scale".into(), json!(2));

    let output = orchestrator
        .run(
            WorkflowRequest::new("fal-ai/esrgan", input)
                .with_file(file)
                .with_options(fast_options(20, 5_000)),
        )
        .await
        .expect("workflow should succeed");

    assert_eq!(output["image"]["url"], json!("https://v3.fal.media/files/out.png"));
}

#[tokio::test]
async fn failed_job_skips_result_fetch() {
    let server = MockServer::start().await;
    mount_submit(&server, "/fal-ai/flux/dev", "job-2").await;
    Mock::given(method("GET"))
        .and(path("/fal-ai/flux/requests/job-2/status"))
        .respond_with(SequenceResponder::new(vec![
            status("IN_PROGRESS"),
            status("FAILED"),
        ]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fal-ai/flux/requests/job-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let err = Orchestrator::new(test_client(&server.uri()))
        .run(
            WorkflowRequest::new("fal-ai/flux/dev", JsonMap::new())
                .with_options(fast_options(20, 5_000)),
        )
        .await
        .expect_err("job should fail");

    match err {
        WorkflowError::JobFailed { handle, status } => {
            assert_eq!(status, JobStatus::Failed);
            assert_eq!(handle.request_id.as_str(), "job-2");
        }
        other => panic!("expected job failure, got {other:?}"),
    }
}

#[tokio::test]
async fn stuck_job_times_out() {
    let server = MockServer::start().await;
    mount_submit(&server, "/fal-ai/flux/dev", "job-3").await;
    Mock::given(method("GET"))
        .and(path("/fal-ai/flux/requests/job-3/status"))
        .respond_with(status("IN_QUEUE"))
        .mount(&server)
        .await;

    let err = Orchestrator::new(test_client(&server.uri()))
        .run(
            WorkflowRequest::new("fal-ai/flux/dev", JsonMap::new())
                .with_options(fast_options(20, 100)),
        )
        .await
        .expect_err("job should time out");

    match err {
        WorkflowError::Timeout {
            elapsed, timeout, ..
        } => {
            assert_eq!(timeout, Duration::from_millis(100));
            assert!(elapsed > timeout);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn submit_rejection_is_reported_with_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fal-ai/flux/dev"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "detail": "bad key" })))
        .mount(&server)
        .await;

    let err = Orchestrator::new(test_client(&server.uri()))
        .run(WorkflowRequest::new("fal-ai/flux/dev", JsonMap::new()))
        .await
        .expect_err("submit should fail");

    assert!(matches!(err, WorkflowError::SubmitFailed { ref model, .. } if model == "fal-ai/flux/dev"));
    assert!(err.to_string().contains("bad key"));
}

#[tokio::test]
async fn host_batch_mixes_operations_and_continues_on_failure() {
    let server = MockServer::start().await;
    mount_submit(&server, "/fal-ai/flux/dev", "job-4").await;
    Mock::given(method("GET"))
        .and(path("/fal-ai/flux/requests/job-4/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "IN_QUEUE",
            "queue_position": 0
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/fal-ai/fast-sdxl"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "url": "https://a" },
            { "url": "https://b" }
        ])))
        .mount(&server)
        .await;

    let orchestrator = Orchestrator::new(test_client(&server.uri()));
    let requests = vec![
        ItemRequest::new(
            InputItem::default(),
            Operation::Submit {
                model_id: "fal-ai/flux/dev".into(),
                input: InputData::Raw(r#"{"prompt":"fog"}"#.into()),
            },
        ),
        ItemRequest::new(
            InputItem::default(),
            Operation::GetStatus {
                model_id: "fal-ai/flux/dev".into(),
                request_id: "job-4".into(),
            },
        ),
        ItemRequest::new(
            InputItem::default(),
            Operation::Upload {
                binary_property: "missing".into(),
                declared_mime_type: None,
            },
        ),
        ItemRequest::new(
            InputItem::default(),
            Operation::RunSync {
                model_id: "fal-ai/fast-sdxl".into(),
                input: InputData::default(),
            },
        ),
    ];

    let out = node::execute(
        &orchestrator,
        requests,
        ExecuteOptions {
            continue_on_fail: true,
        },
    )
    .await
    .expect("batch should continue past failures");

    assert_eq!(out.len(), 5);
    assert_eq!(out[0].json, json!({ "requestId": "job-4" }));
    assert_eq!(out[1].json, json!({ "status": "IN_QUEUE", "queue_position": 0 }));
    assert_eq!(out[2].paired_item, 2);
    assert!(out[2].error.is_some());
    assert_eq!(
        out[3..].iter().map(|r| r.paired_item).collect::<Vec<_>>(),
        vec![3, 3]
    );
    assert_eq!(out[4].json, json!({ "url": "https://b" }));
}
