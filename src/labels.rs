//! Class label table.
//!
//! One label per non-blank line, indexed by class id. `stub://coco` selects
//! the built-in COCO-80 table so stub deployments need no label file.

use anyhow::{Context, Result};
use std::path::Path;

const COCO80: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

#[derive(Clone, Debug, Default)]
pub struct LabelTable {
    labels: Vec<String>,
}

impl LabelTable {
    /// Load a label table. `stub://` paths map to the built-in COCO table.
    pub fn load(path: &str) -> Result<Self> {
        if path.starts_with("stub://") {
            return Ok(Self::coco());
        }
        let raw = std::fs::read_to_string(Path::new(path))
            .with_context(|| format!("failed to read label file {}", path))?;
        Ok(Self::from_lines(&raw))
    }

    /// The COCO-80 table the stock YOLOv5 models are trained on.
    pub fn coco() -> Self {
        Self::from_vec(COCO80.iter().map(|s| s.to_string()).collect())
    }

    pub fn from_vec(labels: Vec<String>) -> Self {
        Self { labels }
    }

    fn from_lines(raw: &str) -> Self {
        Self {
            labels: raw
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Resolve a class id; out-of-range ids fall back to the id as text.
    pub fn resolve(&self, class_id: usize) -> String {
        self.labels
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| class_id.to_string())
    }
}
