use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cloud_label::services::api::CloudApiClient;
use cloud_label::{LabelerConfig, LabelerEvent, Orchestrator};

#[derive(Parser)]
#[command(name = "cloud-label")]
#[command(about = "Label images with the cloud detection service and write YOLO label files")]
struct Cli {
    /// Images, or directories of images, to label
    #[arg(value_name = "IMAGE", required = true)]
    inputs: Vec<PathBuf>,

    /// Class names file, one class per line (e.g. obj.names)
    #[arg(short, long, value_name = "FILE")]
    classes: PathBuf,

    /// Prompt override (defaults to CLOUD_LABEL_PROMPT, then the class list)
    #[arg(short, long)]
    prompt: Option<String>,
}

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();

    // Load configuration from environment
    let config = LabelerConfig::from_env().expect("Failed to load configuration from environment");

    describe_metrics();

    let classes = load_classes(&cli.classes).expect("Failed to read class names file");
    let images = collect_images(&cli.inputs).expect("Failed to list input images");
    tracing::info!(images = images.len(), classes = classes.len(), "Inputs loaded");

    let client = CloudApiClient::new(&config.api_base_url, &config.api_key)
        .expect("Failed to initialize detection API client");
    let (orchestrator, mut events) = Orchestrator::new(Arc::new(client), &config);
    let orchestrator = Arc::new(orchestrator);
    orchestrator.set_classes(classes);
    if let Some(prompt) = cli.prompt {
        orchestrator.set_prompt(prompt);
    }

    let reporter = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            log_event(&event);
        }
    });

    let canceller = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                orchestrator.cancel();
            }
        })
    };

    match orchestrator.label_images(images).await {
        Ok(summary) => tracing::info!(
            total = summary.total,
            done = summary.done,
            failed = summary.failed,
            "Run complete"
        ),
        Err(e) if e.is_cancelled() => tracing::warn!("Run cancelled"),
        Err(e) => tracing::error!(error = %e, "Run failed"),
    }

    canceller.abort();
    let _ = canceller.await;
    drop(orchestrator);
    let _ = reporter.await;
}

fn describe_metrics() {
    metrics::describe_counter!(
        "cloud_label_jobs_submitted_total",
        "Jobs created on the detection service"
    );
    metrics::describe_counter!("cloud_label_labels_written_total", "Label files written");
    metrics::describe_counter!(
        "cloud_label_labels_failed_total",
        "Images whose result could not be fetched or written"
    );
    metrics::describe_counter!("cloud_label_retries_total", "Retried submit/fetch requests");
    metrics::describe_histogram!("cloud_label_compute_ms", "Server-side inference time per image");
}

fn log_event(event: &LabelerEvent) {
    match event {
        LabelerEvent::Progress { done, total } => tracing::info!(done, total, "Progress"),
        LabelerEvent::LabelReady {
            image_path,
            detections,
            compute_ms,
        } => tracing::info!(image = %image_path.display(), detections, compute_ms, "Label ready"),
        LabelerEvent::Finished { total } => tracing::info!(total, "Finished"),
        LabelerEvent::Error { message } => tracing::error!(%message, "Error"),
        LabelerEvent::Status { message, .. } => tracing::info!(%message, "Status"),
        LabelerEvent::BusyChanged(busy) => tracing::debug!(busy, "Busy changed"),
    }
}

fn load_classes(path: &Path) -> std::io::Result<Vec<String>> {
    Ok(std::fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Files are taken as given; directories contribute their image files, sorted.
fn collect_images(inputs: &[PathBuf]) -> std::io::Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for input in inputs {
        if !input.is_dir() {
            images.push(input.clone());
            continue;
        }
        let mut found: Vec<PathBuf> = std::fs::read_dir(input)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && image::ImageFormat::from_path(p).is_ok())
            .collect();
        found.sort();
        images.extend(found);
    }
    Ok(images)
}
