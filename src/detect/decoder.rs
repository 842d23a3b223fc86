//! Score fusion and box decoding for one YOLOv5 output head.
//!
//! Each head covers the model input at a fixed stride with three anchor
//! priors. The engine is expected to hand over tensors with sigmoid
//! activation already applied, so objectness and class scores arrive in
//! [0, 1] and the decoder applies no activation of its own.

use anyhow::{anyhow, Result};
use ndarray::Array4;

/// Model input resolution (square). Frames are resized to this before
/// inference and decoded boxes are rescaled back to the original frame.
pub const MODEL_INPUT: u32 = 640;

/// Anchor rows per head.
pub const ANCHORS_PER_HEAD: usize = 3;

/// Channels preceding the class scores: x, y, w, h, objectness.
const BOX_CHANNELS: usize = 5;

const CH_X: usize = 0;
const CH_Y: usize = 1;
const CH_W: usize = 2;
const CH_H: usize = 3;
const CH_OBJ: usize = 4;

/// Stride and anchor priors for one output head.
#[derive(Clone, Copy, Debug)]
pub struct HeadSpec {
    /// Pixel stride of this head's grid over the model input.
    pub stride: u32,
    /// Anchor (width, height) priors in input pixels, one per anchor row.
    pub anchors: [(f32, f32); ANCHORS_PER_HEAD],
}

/// The fixed YOLOv5 head table: strides 8/16/32 with their anchor priors.
pub fn yolov5_head_specs() -> [HeadSpec; 3] {
    [
        HeadSpec {
            stride: 8,
            anchors: [(10.0, 13.0), (16.0, 30.0), (33.0, 23.0)],
        },
        HeadSpec {
            stride: 16,
            anchors: [(30.0, 61.0), (62.0, 45.0), (59.0, 119.0)],
        },
        HeadSpec {
            stride: 32,
            anchors: [(116.0, 90.0), (156.0, 198.0), (373.0, 326.0)],
        },
    ]
}

/// Raw output of one detection head.
///
/// Logical shape is `(anchor, 5 + num_classes, grid_y, grid_x)`. The tensor
/// is owned by the decoder for the duration of one decode call and is never
/// mutated.
pub struct HeadTensor {
    data: Array4<f32>,
    num_classes: usize,
}

impl HeadTensor {
    /// Wrap a flat channel-major buffer as a head tensor.
    ///
    /// The buffer length must equal `3 * (5 + num_classes) * grid_h * grid_w`.
    pub fn from_vec(
        data: Vec<f32>,
        num_classes: usize,
        grid_h: usize,
        grid_w: usize,
    ) -> Result<Self> {
        let shape = (ANCHORS_PER_HEAD, BOX_CHANNELS + num_classes, grid_h, grid_w);
        let data = Array4::from_shape_vec(shape, data)
            .map_err(|e| anyhow!("head tensor does not match shape {:?}: {}", shape, e))?;
        Ok(Self { data, num_classes })
    }

    pub fn grid_h(&self) -> usize {
        self.data.dim().2
    }

    pub fn grid_w(&self) -> usize {
        self.data.dim().3
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn at(&self, anchor: usize, channel: usize, gy: usize, gx: usize) -> f32 {
        self.data[[anchor, channel, gy, gx]]
    }
}

/// One decoded box in original-image pixel coordinates.
///
/// `confidence` is objectness fused with the best class score. Coordinates
/// are not clamped to the image; boxes near the border may extend past it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: usize,
}

/// Decode one head into candidates above `conf_threshold`.
///
/// An anchor row whose maximum objectness is below the threshold is skipped
/// without touching its class scores. For the remaining cells the fused
/// score is `objectness * class_score`, with the per-cell maximum and its
/// argmax becoming the candidate's confidence and class id.
pub fn decode_head(
    tensor: &HeadTensor,
    spec: &HeadSpec,
    img_w: u32,
    img_h: u32,
    conf_threshold: f32,
) -> Vec<Candidate> {
    let (grid_h, grid_w) = (tensor.grid_h(), tensor.grid_w());
    let num_classes = tensor.num_classes();
    let scale_x = img_w as f32 / MODEL_INPUT as f32;
    let scale_y = img_h as f32 / MODEL_INPUT as f32;
    let stride = spec.stride as f32;

    let mut candidates = Vec::new();

    for anchor in 0..ANCHORS_PER_HEAD {
        // Cheap rejection: nothing in this anchor row can clear the bar.
        let mut max_obj = f32::NEG_INFINITY;
        for gy in 0..grid_h {
            for gx in 0..grid_w {
                max_obj = max_obj.max(tensor.at(anchor, CH_OBJ, gy, gx));
            }
        }
        if max_obj < conf_threshold {
            continue;
        }

        let (anchor_w, anchor_h) = spec.anchors[anchor];

        for gy in 0..grid_h {
            for gx in 0..grid_w {
                let objectness = tensor.at(anchor, CH_OBJ, gy, gx);

                let mut best_score = 0.0f32;
                let mut best_class = 0usize;
                for class in 0..num_classes {
                    let fused = objectness * tensor.at(anchor, BOX_CHANNELS + class, gy, gx);
                    if fused > best_score {
                        best_score = fused;
                        best_class = class;
                    }
                }
                if best_score <= conf_threshold {
                    continue;
                }

                let bx = tensor.at(anchor, CH_X, gy, gx);
                let by = tensor.at(anchor, CH_Y, gy, gx);
                let bw = tensor.at(anchor, CH_W, gy, gx);
                let bh = tensor.at(anchor, CH_H, gy, gx);

                let cx = (bx * 2.0 - 0.5 + gx as f32) * stride;
                let cy = (by * 2.0 - 0.5 + gy as f32) * stride;
                let w = (bw * 2.0).powi(2) * anchor_w;
                let h = (bh * 2.0).powi(2) * anchor_h;

                candidates.push(Candidate {
                    x1: (cx - w / 2.0) * scale_x,
                    y1: (cy - h / 2.0) * scale_y,
                    x2: (cx + w / 2.0) * scale_x,
                    y2: (cy + h / 2.0) * scale_y,
                    confidence: best_score,
                    class_id: best_class,
                });
            }
        }
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    const NUM_CLASSES: usize = 80;

    fn zero_tensor(grid: usize) -> HeadTensor {
        let len = ANCHORS_PER_HEAD * (BOX_CHANNELS + NUM_CLASSES) * grid * grid;
        HeadTensor::from_vec(vec![0.0; len], NUM_CLASSES, grid, grid).unwrap()
    }

    /// Writes one cell of anchor row 0 into an otherwise all-zero tensor.
    fn tensor_with_cell(
        grid: usize,
        gy: usize,
        gx: usize,
        bbox: [f32; 4],
        objectness: f32,
        class_id: usize,
        class_score: f32,
    ) -> HeadTensor {
        let channels = BOX_CHANNELS + NUM_CLASSES;
        let mut data = vec![0.0f32; ANCHORS_PER_HEAD * channels * grid * grid];
        let idx = |c: usize| (c * grid + gy) * grid + gx;
        data[idx(CH_X)] = bbox[0];
        data[idx(CH_Y)] = bbox[1];
        data[idx(CH_W)] = bbox[2];
        data[idx(CH_H)] = bbox[3];
        data[idx(CH_OBJ)] = objectness;
        data[idx(BOX_CHANNELS + class_id)] = class_score;
        HeadTensor::from_vec(data, NUM_CLASSES, grid, grid).unwrap()
    }

    fn stride8_spec() -> HeadSpec {
        yolov5_head_specs()[0]
    }

    #[test]
    fn all_zero_tensor_yields_no_candidates() {
        let tensor = zero_tensor(80);
        let out = decode_head(&tensor, &stride8_spec(), 640, 640, 0.5);
        assert!(out.is_empty());
    }

    #[test]
    fn known_cell_decodes_to_hand_computed_box() {
        // (bx,by,bw,bh) = (0.5,0.5,0.5,0.5), stride 8, anchor (10,13), cell (0,0):
        // cx = (0.5*2 - 0.5 + 0) * 8 = 4, w = (0.5*2)^2 * 10 = 10, h = 13.
        let tensor = tensor_with_cell(80, 0, 0, [0.5; 4], 0.9, 0, 1.0);
        let out = decode_head(&tensor, &stride8_spec(), 640, 640, 0.5);
        assert_eq!(out.len(), 1);
        let c = out[0];
        assert!((c.x1 - (4.0 - 5.0)).abs() < 1e-4);
        assert!((c.x2 - (4.0 + 5.0)).abs() < 1e-4);
        assert!((c.y1 - (4.0 - 6.5)).abs() < 1e-4);
        assert!((c.y2 - (4.0 + 6.5)).abs() < 1e-4);
        assert!((c.confidence - 0.9).abs() < 1e-6);
        assert_eq!(c.class_id, 0);
    }

    #[test]
    fn boxes_rescale_to_original_image_per_axis() {
        let tensor = tensor_with_cell(80, 40, 40, [0.5; 4], 0.9, 0, 1.0);
        let square = decode_head(&tensor, &stride8_spec(), 640, 640, 0.5);
        let wide = decode_head(&tensor, &stride8_spec(), 1280, 720, 0.5);
        assert_eq!(square.len(), 1);
        assert_eq!(wide.len(), 1);
        assert!((wide[0].x1 - square[0].x1 * 2.0).abs() < 1e-3);
        assert!((wide[0].y1 - square[0].y1 * (720.0 / 640.0)).abs() < 1e-3);
    }

    #[test]
    fn fused_confidence_never_below_threshold() {
        // Objectness clears the bar but the fused score does not.
        let tensor = tensor_with_cell(40, 3, 7, [0.5; 4], 0.6, 2, 0.5);
        let out = decode_head(&tensor, &stride8_spec(), 640, 640, 0.5);
        assert!(out.is_empty(), "0.6 * 0.5 = 0.3 must not pass threshold 0.5");

        let tensor = tensor_with_cell(40, 3, 7, [0.5; 4], 0.9, 2, 0.9);
        let out = decode_head(&tensor, &stride8_spec(), 640, 640, 0.5);
        assert_eq!(out.len(), 1);
        assert!(out[0].confidence >= 0.5);
        assert_eq!(out[0].class_id, 2);
    }

    #[test]
    fn anchor_row_below_objectness_threshold_is_skipped() {
        // High class score cannot rescue a row whose objectness stays low.
        let tensor = tensor_with_cell(40, 0, 0, [0.5; 4], 0.2, 0, 1.0);
        let out = decode_head(&tensor, &stride8_spec(), 640, 640, 0.5);
        assert!(out.is_empty());
    }

    #[test]
    fn coordinates_are_not_clamped_to_image_bounds() {
        // A large box decoded at the grid edge extends past the frame.
        let tensor = tensor_with_cell(80, 0, 0, [0.5, 0.5, 1.0, 1.0], 0.9, 0, 1.0);
        let out = decode_head(&tensor, &stride8_spec(), 640, 640, 0.5);
        assert_eq!(out.len(), 1);
        assert!(out[0].x1 < 0.0);
        assert!(out[0].y1 < 0.0);
    }

    #[test]
    fn tensor_shape_mismatch_is_rejected() {
        assert!(HeadTensor::from_vec(vec![0.0; 10], NUM_CLASSES, 80, 80).is_err());
    }
}
