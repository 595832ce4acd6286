//! Upscales a local image with a queued fal model.
//!
//! Run with:
//! ```bash
//! FAL_KEY=... RUST_LOG=fal_queue=debug cargo run --example model_workflow -- photo.png
//! ```

use std::{error::Error, path::Path};

use fal_queue::{
    BinaryAsset, Client, Config, FileInput, JsonMap, Orchestrator, WorkflowOptions,
    WorkflowRequest,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let image_path = std::env::args()
        .nth(1)
        .expect("usage: model_workflow <image>");
    let bytes = std::fs::read(&image_path)?;
    let file_name = Path::new(&image_path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.bin".to_string());

    let client = Client::new(Config::from_env()?)?;
    let orchestrator = Orchestrator::new(client);

    let mut input = JsonMap::new();
    input.insert("scale".into(), json!(2));

    let request = WorkflowRequest::new("fal-ai/esrgan", input)
        .with_file(
            FileInput::new(BinaryAsset::new(bytes).with_file_name(file_name))
                .with_field_name("image_url"),
        )
        .with_options(WorkflowOptions::from_secs(2.0, 120.0)?);

    let output = orchestrator.run(request).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
