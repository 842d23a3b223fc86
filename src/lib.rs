//! clawwatch — host-side camera monitor with YOLOv5 box decoding and an
//! IPC alert task queue.
//!
//! # Architecture
//!
//! Two entry points share one detection pipeline:
//!
//! - `clawwatchd` runs the monitor state machine: it polls a JSON control
//!   file, owns the camera and the inference session, and writes
//!   `send_image` task files that an external delivery component picks up.
//! - `detect` runs one detection pass over an image file and prints a JSON
//!   report.
//!
//! # Module Structure
//!
//! - `detect`: box decoding, overlap suppression, detection pipeline
//! - `ingest`: camera frame sources (synthetic + V4L2)
//! - `infer`: inference engines (synthetic + tract-onnx)
//! - `config`: monitor control file + immutable daemon configuration
//! - `monitor`: resource-owning monitoring state machine
//! - `alert`: outbound IPC task queue
//! - `labels`, `snapshot`, `singleshot`: thin edges

use anyhow::Result;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod alert;
pub mod config;
pub mod detect;
pub mod infer;
pub mod ingest;
pub mod labels;
pub mod monitor;
pub mod singleshot;
pub mod snapshot;

pub use alert::{AlertTask, TaskQueue};
pub use config::{DaemonConfig, MonitorConfig};
pub use detect::{Candidate, Detection, Detector, DetectorConfig, HeadSpec, HeadTensor};
pub use infer::{load_engine, InferenceEngine, ModelInput, StubEngine};
pub use ingest::{CameraConfig, CameraSource, Frame};
pub use labels::LabelTable;
pub use monitor::{CancelToken, Monitor, MonitorState};
pub use singleshot::{run_once, DetectReport};

/// Milliseconds since the Unix epoch.
///
/// Used to build unique snapshot and task filenames across cycles. Two calls
/// within the same millisecond collide; the monitor emits at most one task
/// per cycle, so this is a documented limitation rather than a handled case.
pub fn epoch_millis() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis() as u64)
}
