//! Single-shot detection on one image file.
//!
//! Runs the full pipeline once over a decoded image and returns a JSON-ready
//! report. Unlike the monitor loop, every failure here is fatal and
//! propagates to the caller.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use crate::config::DaemonConfig;
use crate::detect::{Detection, Detector, DetectorConfig};
use crate::infer::load_engine;
use crate::ingest::Frame;
use crate::labels::LabelTable;
use crate::snapshot;

/// Result of one single-shot run.
#[derive(Debug, Serialize)]
pub struct DetectReport {
    pub success: bool,
    pub count: usize,
    pub detections: Vec<ReportedDetection>,
    /// Path of the annotated copy of the input image.
    pub annotated_image: String,
}

#[derive(Debug, Serialize)]
pub struct ReportedDetection {
    pub label: String,
    /// Fused confidence, rounded to 4 decimals.
    pub confidence: f32,
    /// `[x1, y1, x2, y2]` in input-image pixels, rounded to 1 decimal.
    pub bbox: [f32; 4],
}

impl ReportedDetection {
    fn from_detection(det: &Detection) -> Self {
        Self {
            label: det.label.clone(),
            confidence: round_to(det.confidence, 4),
            bbox: [
                round_to(det.x1, 1),
                round_to(det.y1, 1),
                round_to(det.x2, 1),
                round_to(det.y2, 1),
            ],
        }
    }
}

fn round_to(value: f32, decimals: u32) -> f32 {
    let factor = 10f32.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Decode `image_path`, run one inference pass, and write an annotated
/// snapshot next to the daemon's other snapshots.
pub fn run_once(
    config: &DaemonConfig,
    labels: LabelTable,
    image_path: &Path,
    detector_config: &DetectorConfig,
) -> Result<DetectReport> {
    let img = image::open(image_path)
        .with_context(|| format!("failed to open image {}", image_path.display()))?
        .to_rgb8();
    let frame = Frame {
        width: img.width(),
        height: img.height(),
        pixels: img.into_raw(),
    };

    let mut engine = load_engine(&config.model_path)?;
    let input = frame.to_model_input()?;
    let heads = engine.infer(&input).context("inference failed")?;

    let detector = Detector::new(labels);
    let detections = detector.run(&heads, frame.width, frame.height, detector_config);
    log::info!(
        "single shot: {} detection(s) in {}",
        detections.len(),
        image_path.display()
    );

    let annotated = snapshot::save_snapshot(&frame, Some(&detections), &config.snapshot_dir)?;

    Ok(DetectReport {
        success: true,
        count: detections.len(),
        detections: detections
            .iter()
            .map(ReportedDetection::from_detection)
            .collect(),
        annotated_image: annotated.display().to_string(),
    })
}
