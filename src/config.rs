//! Monitor control file and daemon configuration.
//!
//! The control file is a small JSON document written and deleted by an
//! external controller. Its presence switches monitoring on; absence,
//! unreadability, or `"stop": true` switches it off. The monitor re-reads
//! it at the top of every cycle and never caches it across cycles.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Lower bound on the inter-cycle delay; smaller configured intervals are
/// clamped up.
pub const MIN_INTERVAL_SECS: u64 = 3;

/// Per-cycle monitor settings, deserialized from the control file.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorConfig {
    /// Chat the alert images are addressed to.
    pub chat_jid: String,
    /// Seconds between detection cycles.
    pub interval: u64,
    /// Labels that trigger an alert.
    pub detect_labels: HashSet<String>,
    pub confidence_threshold: f32,
    /// Burn detection boxes into the alert snapshot.
    pub send_annotated: bool,
    /// IPC group folder the task file goes to.
    pub group_folder: String,
    pub stop: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            chat_jid: String::new(),
            interval: 10,
            detect_labels: HashSet::from(["person".to_string()]),
            confidence_threshold: 0.5,
            send_annotated: true,
            group_folder: "main".to_string(),
            stop: false,
        }
    }
}

impl MonitorConfig {
    /// Read the control file fresh.
    ///
    /// A missing file, an unreadable or invalid document, and `stop: true`
    /// all mean the same thing: no active configuration.
    pub fn poll(path: &Path) -> Option<Self> {
        let raw = std::fs::read_to_string(path).ok()?;
        let config: MonitorConfig = serde_json::from_str(&raw).ok()?;
        if config.stop {
            return None;
        }
        Some(config)
    }

    /// Configured interval with the minimum applied.
    pub fn effective_interval(&self) -> Duration {
        Duration::from_secs(self.interval.max(MIN_INTERVAL_SECS))
    }
}

/// Immutable daemon configuration, fixed at startup.
///
/// Built from CLI arguments (with env fallbacks) in the binary; the monitor
/// and the pipeline receive it at construction instead of reading globals.
#[derive(Clone, Debug)]
pub struct DaemonConfig {
    /// Path of the control file polled every cycle.
    pub config_path: PathBuf,
    /// Base directory of the IPC task queue.
    pub ipc_base: PathBuf,
    /// Model path; `stub://` selects the synthetic engine.
    pub model_path: String,
    /// Camera device; `stub://` selects the synthetic camera.
    pub camera_device: String,
    pub capture_width: u32,
    pub capture_height: u32,
    /// Frames discarded after camera open so auto-exposure settles.
    pub warmup_frames: u32,
    /// Directory alert snapshots are written to.
    pub snapshot_dir: PathBuf,
    pub iou_threshold: f32,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("/tmp/clawwatch-monitor.json"),
            ipc_base: PathBuf::from("data/ipc"),
            model_path: "stub://person".to_string(),
            camera_device: "stub://camera0".to_string(),
            capture_width: 1280,
            capture_height: 720,
            warmup_frames: 20,
            snapshot_dir: PathBuf::from("/tmp"),
            iou_threshold: 0.45,
        }
    }
}
