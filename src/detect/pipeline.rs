//! Detection pipeline: decode every head, merge, suppress, cap.

use crate::detect::decoder::{decode_head, yolov5_head_specs, Candidate, HeadSpec, HeadTensor};
use crate::detect::nms::suppress;
use crate::labels::LabelTable;

/// Hard cap on detections returned per pipeline run.
pub const MAX_DETECTIONS: usize = 50;

/// Per-run thresholds. The monitor rebuilds this every cycle from the
/// control file; the single-shot runner fixes it once.
#[derive(Clone, Copy, Debug)]
pub struct DetectorConfig {
    pub conf_threshold: f32,
    pub iou_threshold: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            conf_threshold: 0.5,
            iou_threshold: 0.45,
        }
    }
}

/// A candidate that survived suppression, with its label resolved.
#[derive(Clone, Debug)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: usize,
    pub label: String,
}

/// Shared detection pipeline consumed by both the monitor and the
/// single-shot runner.
pub struct Detector {
    specs: [HeadSpec; 3],
    labels: LabelTable,
}

impl Detector {
    pub fn new(labels: LabelTable) -> Self {
        Self {
            specs: yolov5_head_specs(),
            labels,
        }
    }

    /// Run decode, suppression, and the result cap over all heads.
    ///
    /// Heads pair positionally with the stride table; extra heads are
    /// ignored. An empty or all-empty input produces an empty result.
    ///
    /// Truncation takes a prefix of the suppression keep order. Keep order
    /// follows descending-confidence processing, so this approximates the
    /// most confident `MAX_DETECTIONS` without being a strict top-N under
    /// ties and greedy interleaving.
    pub fn run(
        &self,
        heads: &[HeadTensor],
        img_w: u32,
        img_h: u32,
        config: &DetectorConfig,
    ) -> Vec<Detection> {
        let mut candidates: Vec<Candidate> = Vec::new();
        for (tensor, spec) in heads.iter().zip(self.specs.iter()) {
            candidates.extend(decode_head(
                tensor,
                spec,
                img_w,
                img_h,
                config.conf_threshold,
            ));
        }
        if candidates.is_empty() {
            return Vec::new();
        }

        suppress(&candidates, config.iou_threshold)
            .into_iter()
            .take(MAX_DETECTIONS)
            .map(|idx| {
                let c = candidates[idx];
                Detection {
                    x1: c.x1,
                    y1: c.y1,
                    x2: c.x2,
                    y2: c.y2,
                    confidence: c.confidence,
                    class_id: c.class_id,
                    label: self.labels.resolve(c.class_id),
                }
            })
            .collect()
    }
}
