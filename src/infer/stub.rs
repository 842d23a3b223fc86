//! Synthetic inference engine for tests and hardware-free deployments.

use anyhow::Result;

use crate::detect::{HeadTensor, ANCHORS_PER_HEAD};
use crate::infer::{InferenceEngine, ModelInput};

const NUM_CLASSES: usize = 80;
const BOX_CHANNELS: usize = 5;
/// Grid sizes for strides 8/16/32 over the 640 input.
const GRIDS: [usize; 3] = [80, 40, 20];

enum StubMode {
    /// Every pass reports one person at the centre of the stride-8 grid.
    Person,
    /// Every pass comes back empty (all-zero tensors).
    Empty,
    /// Every pass fails.
    Fail,
}

/// Synthetic engine selected by `stub://` model paths.
///
/// Directives: `stub://empty` and `stub://fail` script per-cycle outcomes;
/// anything else behaves like `stub://person`.
pub struct StubEngine {
    mode: StubMode,
}

impl StubEngine {
    pub fn from_directive(directive: &str) -> Self {
        let mode = match directive {
            "empty" => StubMode::Empty,
            "fail" => StubMode::Fail,
            _ => StubMode::Person,
        };
        Self { mode }
    }
}

impl InferenceEngine for StubEngine {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn infer(&mut self, _input: &ModelInput) -> Result<Vec<HeadTensor>> {
        match self.mode {
            StubMode::Fail => anyhow::bail!("synthetic inference failure"),
            StubMode::Empty => synthetic_heads(None),
            StubMode::Person => synthetic_heads(Some(PERSON_CELL)),
        }
    }
}

/// A confident person (class 0) at the centre cell of the stride-8 head,
/// decoding to a box of roughly anchor size at (324, 324) on the 640 input.
const PERSON_CELL: (usize, usize, usize, f32) = (0, 40, 40, 0.9);

/// Build one all-zero tensor per head, optionally writing a single
/// `(anchor_row_0, gy, gx, objectness)` person cell into the first head.
pub fn synthetic_heads(cell: Option<(usize, usize, usize, f32)>) -> Result<Vec<HeadTensor>> {
    let channels = BOX_CHANNELS + NUM_CLASSES;
    let mut heads = Vec::with_capacity(GRIDS.len());

    for (head_idx, grid) in GRIDS.iter().enumerate() {
        let mut data = vec![0.0f32; ANCHORS_PER_HEAD * channels * grid * grid];
        if head_idx == 0 {
            if let Some((head, gy, gx, objectness)) = cell {
                if head == 0 {
                    let idx = |c: usize| (c * grid + gy) * grid + gx;
                    data[idx(0)] = 0.5;
                    data[idx(1)] = 0.5;
                    data[idx(2)] = 0.5;
                    data[idx(3)] = 0.5;
                    data[idx(4)] = objectness;
                    data[idx(BOX_CHANNELS)] = 1.0; // class 0 = person
                }
            }
        }
        heads.push(HeadTensor::from_vec(data, NUM_CLASSES, *grid, *grid)?);
    }

    Ok(heads)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Detector, DetectorConfig};
    use crate::labels::LabelTable;

    fn input() -> ModelInput {
        ModelInput::from_rgb(vec![0u8; 640 * 640 * 3]).unwrap()
    }

    #[test]
    fn person_stub_decodes_to_one_person() {
        let mut engine = StubEngine::from_directive("person");
        let heads = engine.infer(&input()).unwrap();
        assert_eq!(heads.len(), 3);

        let detector = Detector::new(LabelTable::coco());
        let detections = detector.run(&heads, 1280, 720, &DetectorConfig::default());
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label, "person");
        assert!((detections[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn empty_stub_decodes_to_nothing() {
        let mut engine = StubEngine::from_directive("empty");
        let heads = engine.infer(&input()).unwrap();
        let detector = Detector::new(LabelTable::coco());
        assert!(detector
            .run(&heads, 1280, 720, &DetectorConfig::default())
            .is_empty());
    }

    #[test]
    fn fail_stub_errors_every_pass() {
        let mut engine = StubEngine::from_directive("fail");
        assert!(engine.infer(&input()).is_err());
    }
}
