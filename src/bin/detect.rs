//! Single-shot detection CLI.
//!
//! Prints a JSON report on stdout so callers can pipe it straight into
//! their own tooling; diagnostics go to stderr via the logger.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use clawwatch::config::DaemonConfig;
use clawwatch::detect::DetectorConfig;
use clawwatch::labels::LabelTable;
use clawwatch::singleshot;

#[derive(Parser, Debug)]
#[command(name = "detect", about = "Run object detection on a single image")]
struct Args {
    /// Image file to analyze.
    image: PathBuf,

    /// ONNX model path, or a stub:// directive.
    #[arg(long, env = "CLAWWATCH_MODEL", default_value = "stub://person")]
    model: String,

    /// Class label file, or stub:// for the built-in COCO table.
    #[arg(long, env = "CLAWWATCH_LABELS", default_value = "stub://coco")]
    labels: String,

    /// Directory the annotated copy is written to.
    #[arg(long, env = "CLAWWATCH_SNAPSHOT_DIR", default_value = "/tmp")]
    snapshot_dir: PathBuf,

    /// Minimum fused confidence for a detection.
    #[arg(long, default_value_t = 0.5)]
    confidence: f32,

    /// IoU threshold for non-maximum suppression.
    #[arg(long, default_value_t = 0.45)]
    iou_threshold: f32,
}

fn run(args: &Args) -> Result<String> {
    let labels = LabelTable::load(&args.labels)
        .with_context(|| format!("failed to load labels from {}", args.labels))?;

    let config = DaemonConfig {
        model_path: args.model.clone(),
        snapshot_dir: args.snapshot_dir.clone(),
        iou_threshold: args.iou_threshold,
        ..DaemonConfig::default()
    };
    let detector_config = DetectorConfig {
        conf_threshold: args.confidence,
        iou_threshold: args.iou_threshold,
    };

    let report = singleshot::run_once(&config, labels, &args.image, &detector_config)?;
    serde_json::to_string_pretty(&report).context("failed to serialize report")
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match run(&args) {
        Ok(report) => {
            println!("{}", report);
            ExitCode::SUCCESS
        }
        Err(err) => {
            let failure = serde_json::json!({
                "success": false,
                "error": format!("{:#}", err),
            });
            println!("{}", failure);
            ExitCode::FAILURE
        }
    }
}
