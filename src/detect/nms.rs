//! Greedy non-maximum suppression.
//!
//! Suppression is class-agnostic: two boxes of different classes that
//! overlap heavily still suppress each other. Worst case is O(N²), with N
//! bounded by the per-cycle candidate count.

use std::cmp::Ordering;

use crate::detect::decoder::Candidate;

/// Guards the IoU division against degenerate zero-area boxes.
const IOU_EPSILON: f32 = 1e-6;

/// Intersection-over-union of two boxes.
pub fn iou(a: &Candidate, b: &Candidate) -> f32 {
    let inter_w = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let inter_h = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter = inter_w * inter_h;
    inter / (area(a) + area(b) - inter + IOU_EPSILON)
}

fn area(c: &Candidate) -> f32 {
    (c.x2 - c.x1) * (c.y2 - c.y1)
}

/// Returns the indices of kept candidates, in descending-confidence
/// processing order.
///
/// Greedy pass: take the highest remaining confidence, keep it, discard
/// every remaining box whose IoU with it exceeds `iou_threshold`. The sort
/// is stable, so equal confidences keep their original index order.
pub fn suppress(candidates: &[Candidate], iou_threshold: f32) -> Vec<usize> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| {
        candidates[b]
            .confidence
            .partial_cmp(&candidates[a].confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; candidates.len()];

    for (rank, &idx) in order.iter().enumerate() {
        if suppressed[idx] {
            continue;
        }
        keep.push(idx);
        for &other in &order[rank + 1..] {
            if !suppressed[other] && iou(&candidates[idx], &candidates[other]) > iou_threshold {
                suppressed[other] = true;
            }
        }
    }

    keep
}
