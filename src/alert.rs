//! Outbound alert task queue.
//!
//! One qualifying detection cycle produces one `send_image` task file under
//! `<ipc_base>/<group>/tasks/`. An external delivery component consumes and
//! deletes the files; the emitter is fire-and-forget and never learns the
//! delivery outcome.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::detect::Detection;

/// Alert captions summarize at most this many matches, in detection order.
pub const MAX_CAPTION_LINES: usize = 10;

/// IPC task descriptor, serialized with the delivery component's wire keys.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertTask {
    #[serde(rename = "type")]
    pub kind: String,
    pub chat_jid: String,
    pub image_path: String,
    pub caption: String,
}

impl AlertTask {
    pub fn send_image(chat_jid: String, image_path: String, caption: String) -> Self {
        Self {
            kind: "send_image".to_string(),
            chat_jid,
            image_path,
            caption,
        }
    }
}

/// Task queue rooted at the IPC base directory.
pub struct TaskQueue {
    base: PathBuf,
}

impl TaskQueue {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Durably write one task file into a group's queue.
    ///
    /// The filename carries the current epoch milliseconds, which keeps
    /// rapid cycles apart. Two emits within the same millisecond would
    /// collide; the monitor emits at most one task per cycle and cycles are
    /// seconds long, so this stays a documented limitation.
    pub fn emit(&self, group_folder: &str, task: &AlertTask) -> Result<PathBuf> {
        let tasks_dir = self.base.join(group_folder).join("tasks");
        fs::create_dir_all(&tasks_dir)
            .with_context(|| format!("create task directory {}", tasks_dir.display()))?;

        let path = tasks_dir.join(format!("monitor_{}.json", crate::epoch_millis()?));
        let json = serde_json::to_string(task).context("serialize alert task")?;
        fs::write(&path, json)
            .with_context(|| format!("write task file {}", path.display()))?;
        Ok(path)
    }
}

/// Caption for an alert: a header plus one line per match, capped.
pub fn build_caption(matched: &[Detection]) -> String {
    let lines: Vec<String> = matched
        .iter()
        .take(MAX_CAPTION_LINES)
        .map(|d| format!("• {} ({:.0}%)", d.label, d.confidence * 100.0))
        .collect();
    format!("🚨 Detected {} target(s):\n{}", matched.len(), lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(label: &str, confidence: f32) -> Detection {
        Detection {
            x1: 0.0,
            y1: 0.0,
            x2: 10.0,
            y2: 10.0,
            confidence,
            class_id: 0,
            label: label.to_string(),
        }
    }

    #[test]
    fn emit_writes_task_with_wire_keys() {
        let dir = tempfile::tempdir().unwrap();
        let queue = TaskQueue::new(dir.path());
        let task = AlertTask::send_image(
            "17038709442@s.whatsapp.net".to_string(),
            "/tmp/clawwatch-1.jpg".to_string(),
            "🚨 Detected 1 target(s):\n• person (92%)".to_string(),
        );

        let path = queue.emit("main", &task).unwrap();
        assert!(path.starts_with(dir.path().join("main").join("tasks")));
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("monitor_"));

        let raw = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["type"], "send_image");
        assert_eq!(value["chatJid"], "17038709442@s.whatsapp.net");
        assert_eq!(value["imagePath"], "/tmp/clawwatch-1.jpg");
        assert!(value["caption"].as_str().unwrap().starts_with("🚨"));
    }

    #[test]
    fn caption_caps_at_ten_lines_but_counts_all() {
        let matched: Vec<Detection> = (0..12).map(|_| detection("person", 0.87)).collect();
        let caption = build_caption(&matched);
        assert!(caption.starts_with("🚨 Detected 12 target(s):"));
        assert_eq!(caption.matches('•').count(), 10);
        assert!(caption.contains("person (87%)"));
    }
}
