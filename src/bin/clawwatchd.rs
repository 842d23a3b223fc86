//! Monitor daemon entry point.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use clawwatch::config::DaemonConfig;
use clawwatch::labels::LabelTable;
use clawwatch::monitor::{CancelToken, Monitor};

#[derive(Parser, Debug)]
#[command(name = "clawwatchd", about = "Continuous object-detection monitor")]
struct Args {
    /// Control file polled for monitor on/off and per-cycle settings.
    #[arg(long, env = "CLAWWATCH_CONFIG", default_value = "/tmp/clawwatch-monitor.json")]
    config: PathBuf,

    /// Base directory of the outbound task queue.
    #[arg(long, env = "CLAWWATCH_IPC_BASE", default_value = "data/ipc")]
    ipc_base: PathBuf,

    /// ONNX model path, or a stub:// directive.
    #[arg(long, env = "CLAWWATCH_MODEL", default_value = "stub://person")]
    model: String,

    /// Class label file, or stub:// for the built-in COCO table.
    #[arg(long, env = "CLAWWATCH_LABELS", default_value = "stub://coco")]
    labels: String,

    /// Camera device path, or a stub:// directive.
    #[arg(long, env = "CLAWWATCH_CAMERA", default_value = "stub://camera0")]
    camera: String,

    /// Requested capture width.
    #[arg(long, env = "CLAWWATCH_CAPTURE_WIDTH", default_value_t = 1280)]
    capture_width: u32,

    /// Requested capture height.
    #[arg(long, env = "CLAWWATCH_CAPTURE_HEIGHT", default_value_t = 720)]
    capture_height: u32,

    /// Frames discarded after camera open so auto-exposure settles.
    #[arg(long, env = "CLAWWATCH_WARMUP_FRAMES", default_value_t = 20)]
    warmup_frames: u32,

    /// Directory alert snapshots are written to.
    #[arg(long, env = "CLAWWATCH_SNAPSHOT_DIR", default_value = "/tmp")]
    snapshot_dir: PathBuf,

    /// IoU threshold for non-maximum suppression.
    #[arg(long, env = "CLAWWATCH_IOU_THRESHOLD", default_value_t = 0.45)]
    iou_threshold: f32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let labels = LabelTable::load(&args.labels)
        .with_context(|| format!("failed to load labels from {}", args.labels))?;

    let config = DaemonConfig {
        config_path: args.config,
        ipc_base: args.ipc_base,
        model_path: args.model,
        camera_device: args.camera,
        capture_width: args.capture_width,
        capture_height: args.capture_height,
        warmup_frames: args.warmup_frames,
        snapshot_dir: args.snapshot_dir,
        iou_threshold: args.iou_threshold,
    };

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        log::info!("termination requested, shutting down");
        handler_token.cancel();
    })
    .context("failed to install signal handler")?;

    log::info!(
        "clawwatchd starting: control file {}, model {}, camera {}",
        config.config_path.display(),
        config.model_path,
        config.camera_device
    );

    let mut monitor = Monitor::new(config, labels);
    monitor.run(&cancel);
    Ok(())
}
