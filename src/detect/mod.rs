//! Detection core: box decoding, overlap suppression, and the pipeline
//! that ties both together.
//!
//! Decoding and suppression are pure functions of their inputs. They never
//! fail; an empty result is a valid outcome, not an error.

mod decoder;
mod nms;
mod pipeline;

pub use decoder::{
    decode_head, yolov5_head_specs, Candidate, HeadSpec, HeadTensor, ANCHORS_PER_HEAD, MODEL_INPUT,
};
pub use nms::{iou, suppress};
pub use pipeline::{Detection, Detector, DetectorConfig, MAX_DETECTIONS};
