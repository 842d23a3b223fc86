//! JPEG snapshots of captured frames.

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::detect::Detection;
use crate::ingest::Frame;

const JPEG_QUALITY: u8 = 92;
const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Write the frame as a JPEG under `dir`, optionally with detection boxes
/// burned in. Returns the snapshot path (unique per millisecond).
pub fn save_snapshot(
    frame: &Frame,
    annotations: Option<&[Detection]>,
    dir: &Path,
) -> Result<PathBuf> {
    let mut img = frame.to_rgb_image()?;
    if let Some(detections) = annotations {
        draw_boxes(&mut img, detections);
    }

    let path = dir.join(format!("clawwatch-{}.jpg", crate::epoch_millis()?));
    let file = File::create(&path)
        .with_context(|| format!("create snapshot file {}", path.display()))?;
    let mut encoder = JpegEncoder::new_with_quality(BufWriter::new(file), JPEG_QUALITY);
    encoder.encode_image(&img).context("encode snapshot jpeg")?;
    Ok(path)
}

/// Hollow 2px rectangles. Detection coordinates may extend past the frame
/// (the decoder does not clamp), so clamp here for drawing only.
fn draw_boxes(img: &mut RgbImage, detections: &[Detection]) {
    let max_x = img.width().saturating_sub(1) as f32;
    let max_y = img.height().saturating_sub(1) as f32;

    for det in detections {
        let x1 = det.x1.clamp(0.0, max_x);
        let y1 = det.y1.clamp(0.0, max_y);
        let x2 = det.x2.clamp(0.0, max_x);
        let y2 = det.y2.clamp(0.0, max_y);
        let w = (x2 - x1).max(1.0) as u32;
        let h = (y2 - y1).max(1.0) as u32;

        draw_hollow_rect_mut(img, Rect::at(x1 as i32, y1 as i32).of_size(w, h), BOX_COLOR);
        if w > 4 && h > 4 {
            draw_hollow_rect_mut(
                img,
                Rect::at(x1 as i32 + 1, y1 as i32 + 1).of_size(w - 2, h - 2),
                BOX_COLOR,
            );
        }
    }
}
