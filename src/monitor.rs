//! Continuous monitoring state machine.
//!
//! The monitor exclusively owns the camera and the inference session. It
//! polls the control file, drives capture→infer→decode→filter→alert cycles,
//! and backs off and retries on resource failures. Per-cycle failures skip
//! the cycle; only a cancellation request ends the loop. Nothing here is
//! fatal once the loop is running — failures are visible in the log only.
//!
//! `step` performs exactly one transition or cycle and returns the pause
//! before the next step, so tests can drive the machine without sleeping.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::alert::{build_caption, AlertTask, TaskQueue};
use crate::config::{DaemonConfig, MonitorConfig};
use crate::detect::{Detection, Detector, DetectorConfig};
use crate::infer::{load_engine, InferenceEngine};
use crate::ingest::{CameraConfig, CameraSource, Frame};
use crate::labels::LabelTable;
use crate::snapshot;

/// Poll cadence while no configuration is active.
pub const CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Backoff after a failed camera open or model load.
pub const RESOURCE_RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// Cooperative cancellation flag.
///
/// Checked at loop top and after sleeps only; an in-flight blocking call
/// (camera read, inference) is never preempted, so shutdown latency is
/// bounded by the current cycle's remaining blocking work.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MonitorState {
    /// No active configuration; resources released, polling the control file.
    WaitingForConfig,
    /// Configuration active; opening the camera and loading the model, with
    /// indefinite fixed-backoff retries.
    AcquiringResources,
    /// Both resources held; running detection cycles.
    Detecting,
    /// Terminal; reached only through an external termination request.
    ShuttingDown,
}

pub struct Monitor {
    config: DaemonConfig,
    detector: Detector,
    queue: TaskQueue,
    state: MonitorState,
    camera: Option<CameraSource>,
    engine: Option<Box<dyn InferenceEngine>>,
}

impl Monitor {
    pub fn new(config: DaemonConfig, labels: LabelTable) -> Self {
        let queue = TaskQueue::new(config.ipc_base.clone());
        Self {
            detector: Detector::new(labels),
            queue,
            config,
            state: MonitorState::WaitingForConfig,
            camera: None,
            engine: None,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// True while the camera or the inference session is held.
    pub fn resources_held(&self) -> bool {
        self.camera.is_some() || self.engine.is_some()
    }

    /// Drive the loop until cancelled, then release resources exactly once.
    pub fn run(&mut self, cancel: &CancelToken) {
        while !cancel.is_cancelled() {
            let pause = self.step();
            std::thread::sleep(pause);
        }
        self.shutdown();
    }

    /// One state-machine transition or detection cycle. Returns the pause
    /// before the next step; zero means "continue immediately".
    pub fn step(&mut self) -> Duration {
        match self.state {
            MonitorState::WaitingForConfig => self.wait_for_config(),
            MonitorState::AcquiringResources => self.acquire_resources(),
            MonitorState::Detecting => self.detect_cycle(),
            MonitorState::ShuttingDown => Duration::ZERO,
        }
    }

    /// Terminal transition. Idempotent; releases held resources once.
    pub fn shutdown(&mut self) {
        if self.state != MonitorState::ShuttingDown {
            self.release_resources();
            self.state = MonitorState::ShuttingDown;
            log::info!("monitor stopped");
        }
    }

    fn wait_for_config(&mut self) -> Duration {
        // Idempotent release of anything still held from a previous run.
        self.release_resources();

        if MonitorConfig::poll(&self.config.config_path).is_some() {
            log::info!("monitor config active, acquiring resources");
            self.state = MonitorState::AcquiringResources;
            Duration::ZERO
        } else {
            CONFIG_POLL_INTERVAL
        }
    }

    fn acquire_resources(&mut self) -> Duration {
        if self.camera.is_none() {
            let camera_config = CameraConfig {
                device: self.config.camera_device.clone(),
                width: self.config.capture_width,
                height: self.config.capture_height,
                warmup_frames: self.config.warmup_frames,
            };
            match CameraSource::open(&camera_config) {
                Ok(camera) => {
                    log::info!("camera {} warmed up", self.config.camera_device);
                    self.camera = Some(camera);
                }
                Err(err) => {
                    log::warn!(
                        "camera open failed: {:#}, retrying in {}s",
                        err,
                        RESOURCE_RETRY_BACKOFF.as_secs()
                    );
                    return RESOURCE_RETRY_BACKOFF;
                }
            }
        }

        if self.engine.is_none() {
            // The camera stays open across model-load retries.
            match load_engine(&self.config.model_path) {
                Ok(engine) => {
                    log::info!("inference engine {} ready", engine.name());
                    self.engine = Some(engine);
                }
                Err(err) => {
                    log::warn!(
                        "model load failed: {:#}, retrying in {}s",
                        err,
                        RESOURCE_RETRY_BACKOFF.as_secs()
                    );
                    return RESOURCE_RETRY_BACKOFF;
                }
            }
        }

        self.state = MonitorState::Detecting;
        Duration::ZERO
    }

    fn detect_cycle(&mut self) -> Duration {
        // Configuration is re-read at the top of every cycle; thresholds and
        // targets may change without a state transition.
        let Some(config) = MonitorConfig::poll(&self.config.config_path) else {
            log::info!("monitor config removed or stopped, releasing resources");
            self.state = MonitorState::WaitingForConfig;
            return Duration::ZERO;
        };

        let (Some(camera), Some(engine)) = (self.camera.as_mut(), self.engine.as_mut()) else {
            self.state = MonitorState::AcquiringResources;
            return Duration::ZERO;
        };

        let frame = match camera.read_frame() {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("frame capture failed: {:#}, reopening camera", err);
                self.camera = None;
                self.state = MonitorState::AcquiringResources;
                return CONFIG_POLL_INTERVAL;
            }
        };

        let input = match frame.to_model_input() {
            Ok(input) => input,
            Err(err) => {
                log::warn!("frame preprocessing failed: {:#}, skipping cycle", err);
                return config.effective_interval();
            }
        };

        let heads = match engine.infer(&input) {
            Ok(heads) => heads,
            Err(err) => {
                log::warn!("inference failed: {:#}, skipping cycle", err);
                return config.effective_interval();
            }
        };

        let detector_config = DetectorConfig {
            conf_threshold: config.confidence_threshold,
            iou_threshold: self.config.iou_threshold,
        };
        let detections = self
            .detector
            .run(&heads, frame.width, frame.height, &detector_config);

        let matched: Vec<Detection> = detections
            .into_iter()
            .filter(|d| config.detect_labels.contains(&d.label))
            .collect();

        if !matched.is_empty() {
            if let Err(err) = self.emit_alert(&config, &frame, &matched) {
                log::warn!("alert emit failed: {:#}", err);
            }
        }

        config.effective_interval()
    }

    fn emit_alert(
        &self,
        config: &MonitorConfig,
        frame: &Frame,
        matched: &[Detection],
    ) -> Result<()> {
        let annotations = if config.send_annotated {
            Some(matched)
        } else {
            None
        };
        let image_path = snapshot::save_snapshot(frame, annotations, &self.config.snapshot_dir)?;

        let task = AlertTask::send_image(
            config.chat_jid.clone(),
            image_path.display().to_string(),
            build_caption(matched),
        );
        let task_path = self.queue.emit(&config.group_folder, &task)?;
        log::info!(
            "alert emitted: {} target(s), task {}",
            matched.len(),
            task_path.display()
        );
        Ok(())
    }

    fn release_resources(&mut self) {
        if self.camera.take().is_some() {
            log::info!("camera released");
        }
        if self.engine.take().is_some() {
            log::info!("inference engine released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        config_path: PathBuf,
        ipc_base: PathBuf,
        snapshot_dir: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().expect("temp dir");
            let config_path = dir.path().join("monitor.json");
            let ipc_base = dir.path().join("ipc");
            let snapshot_dir = dir.path().join("snaps");
            fs::create_dir_all(&snapshot_dir).expect("snapshot dir");
            Self {
                _dir: dir,
                config_path,
                ipc_base,
                snapshot_dir,
            }
        }

        fn daemon_config(&self, camera: &str, model: &str) -> DaemonConfig {
            DaemonConfig {
                config_path: self.config_path.clone(),
                ipc_base: self.ipc_base.clone(),
                model_path: model.to_string(),
                camera_device: camera.to_string(),
                capture_width: 64,
                capture_height: 48,
                warmup_frames: 0,
                snapshot_dir: self.snapshot_dir.clone(),
                iou_threshold: 0.45,
            }
        }

        fn write_config(&self, json: &str) {
            fs::write(&self.config_path, json).expect("write control file");
        }

        fn remove_config(&self) {
            let _ = fs::remove_file(&self.config_path);
        }

        fn task_files(&self) -> Vec<PathBuf> {
            let tasks = self.ipc_base.join("main").join("tasks");
            match fs::read_dir(&tasks) {
                Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
                Err(_) => Vec::new(),
            }
        }
    }

    fn monitor(fixture: &Fixture, camera: &str, model: &str) -> Monitor {
        Monitor::new(fixture.daemon_config(camera, model), LabelTable::coco())
    }

    const ACTIVE_CONFIG: &str = r#"{
        "chatJid": "group@g.us",
        "interval": 5,
        "detectLabels": ["person"],
        "confidenceThreshold": 0.5
    }"#;

    fn step_to_detecting(monitor: &mut Monitor) {
        assert_eq!(monitor.step(), Duration::ZERO); // waiting -> acquiring
        assert_eq!(monitor.state(), MonitorState::AcquiringResources);
        assert_eq!(monitor.step(), Duration::ZERO); // acquiring -> detecting
        assert_eq!(monitor.state(), MonitorState::Detecting);
    }

    #[test]
    fn waits_while_config_is_absent() {
        let fixture = Fixture::new();
        let mut monitor = monitor(&fixture, "stub://camera0", "stub://person");

        assert_eq!(monitor.state(), MonitorState::WaitingForConfig);
        assert_eq!(monitor.step(), CONFIG_POLL_INTERVAL);
        assert_eq!(monitor.state(), MonitorState::WaitingForConfig);
        assert!(!monitor.resources_held());
    }

    #[test]
    fn full_cycle_emits_one_alert_task() {
        let fixture = Fixture::new();
        fixture.write_config(ACTIVE_CONFIG);
        let mut monitor = monitor(&fixture, "stub://camera0", "stub://person");

        step_to_detecting(&mut monitor);
        assert!(monitor.resources_held());

        let pause = monitor.step();
        assert_eq!(pause, Duration::from_secs(5));

        let tasks = fixture.task_files();
        assert_eq!(tasks.len(), 1);
        let raw = fs::read_to_string(&tasks[0]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["type"], "send_image");
        assert_eq!(value["chatJid"], "group@g.us");
        assert!(value["caption"]
            .as_str()
            .unwrap()
            .contains("person (90%)"));
        assert!(Path::new(value["imagePath"].as_str().unwrap()).exists());
    }

    #[test]
    fn non_target_detections_do_not_alert() {
        let fixture = Fixture::new();
        fixture.write_config(r#"{"chatJid": "g@g.us", "detectLabels": ["dog"]}"#);
        let mut monitor = monitor(&fixture, "stub://camera0", "stub://person");

        step_to_detecting(&mut monitor);
        monitor.step();
        assert!(fixture.task_files().is_empty());
    }

    #[test]
    fn interval_of_one_is_clamped_to_three() {
        let fixture = Fixture::new();
        fixture.write_config(r#"{"chatJid": "g@g.us", "interval": 1}"#);
        let mut monitor = monitor(&fixture, "stub://camera0", "stub://empty");

        step_to_detecting(&mut monitor);
        assert_eq!(monitor.step(), Duration::from_secs(3));
    }

    #[test]
    fn stop_flag_behaves_like_config_absence() {
        let fixture = Fixture::new();
        fixture.write_config(ACTIVE_CONFIG);
        let mut monitor = monitor(&fixture, "stub://camera0", "stub://empty");

        step_to_detecting(&mut monitor);
        assert!(monitor.resources_held());

        fixture.write_config(r#"{"stop": true}"#);
        assert_eq!(monitor.step(), Duration::ZERO);
        assert_eq!(monitor.state(), MonitorState::WaitingForConfig);

        // The waiting state releases resources idempotently.
        monitor.step();
        assert!(!monitor.resources_held());
    }

    #[test]
    fn config_removal_releases_resources() {
        let fixture = Fixture::new();
        fixture.write_config(ACTIVE_CONFIG);
        let mut monitor = monitor(&fixture, "stub://camera0", "stub://empty");

        step_to_detecting(&mut monitor);
        fixture.remove_config();
        monitor.step();
        assert_eq!(monitor.state(), MonitorState::WaitingForConfig);
        monitor.step();
        assert!(!monitor.resources_held());
    }

    #[test]
    fn camera_open_failure_backs_off_and_retries() {
        let fixture = Fixture::new();
        fixture.write_config(ACTIVE_CONFIG);
        let mut monitor = monitor(&fixture, "stub://fail-open", "stub://empty");

        assert_eq!(monitor.step(), Duration::ZERO);
        assert_eq!(monitor.state(), MonitorState::AcquiringResources);
        assert_eq!(monitor.step(), RESOURCE_RETRY_BACKOFF);
        assert_eq!(monitor.state(), MonitorState::AcquiringResources);
        assert_eq!(monitor.step(), RESOURCE_RETRY_BACKOFF);
    }

    #[test]
    fn model_load_failure_keeps_camera_open() {
        let fixture = Fixture::new();
        fixture.write_config(ACTIVE_CONFIG);
        let mut monitor = monitor(&fixture, "stub://camera0", "stub://fail-load");

        assert_eq!(monitor.step(), Duration::ZERO);
        assert_eq!(monitor.step(), RESOURCE_RETRY_BACKOFF);
        assert_eq!(monitor.state(), MonitorState::AcquiringResources);
        // Camera survives the failed model load.
        assert!(monitor.resources_held());
    }

    #[test]
    fn capture_failure_reacquires_the_camera() {
        let fixture = Fixture::new();
        fixture.write_config(ACTIVE_CONFIG);
        // First read succeeds, the second fails.
        let mut monitor = monitor(&fixture, "stub://fail-after-1", "stub://empty");

        step_to_detecting(&mut monitor);
        monitor.step(); // consumes the one good frame
        assert_eq!(monitor.state(), MonitorState::Detecting);
        monitor.step(); // capture fails
        assert_eq!(monitor.state(), MonitorState::AcquiringResources);
    }

    #[test]
    fn inference_failure_skips_the_cycle() {
        let fixture = Fixture::new();
        fixture.write_config(ACTIVE_CONFIG);
        let mut monitor = monitor(&fixture, "stub://camera0", "stub://fail");

        step_to_detecting(&mut monitor);
        assert_eq!(monitor.step(), Duration::from_secs(5));
        assert_eq!(monitor.state(), MonitorState::Detecting);
        assert!(fixture.task_files().is_empty());
    }

    #[test]
    fn shutdown_is_terminal_and_idempotent() {
        let fixture = Fixture::new();
        fixture.write_config(ACTIVE_CONFIG);
        let mut monitor = monitor(&fixture, "stub://camera0", "stub://empty");

        step_to_detecting(&mut monitor);
        monitor.shutdown();
        assert_eq!(monitor.state(), MonitorState::ShuttingDown);
        assert!(!monitor.resources_held());

        monitor.shutdown();
        assert_eq!(monitor.step(), Duration::ZERO);
        assert_eq!(monitor.state(), MonitorState::ShuttingDown);
    }

    #[test]
    fn cancel_token_trips_once_set() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
