//! Camera frame sources.
//!
//! Sources produce RGB `Frame`s. A `stub://` device selects the synthetic
//! camera (deterministic pattern frames, with scriptable failures for
//! tests); real V4L2 devices sit behind the `ingest-v4l2` feature.
//!
//! The source layer only exposes "open at a resolution" and "read one
//! frame"; device-specific configuration stays inside the backend.

use anyhow::Result;
use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::detect::MODEL_INPUT;
use crate::infer::ModelInput;

#[cfg(feature = "ingest-v4l2")]
mod v4l2;

/// One captured RGB frame.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Tightly packed RGB bytes, row-major.
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.pixels.clone()).ok_or_else(|| {
            anyhow::anyhow!(
                "frame buffer does not match {}x{} RGB",
                self.width,
                self.height
            )
        })
    }

    /// Resize to the model input resolution.
    pub fn to_model_input(&self) -> Result<ModelInput> {
        let img = self.to_rgb_image()?;
        let resized = imageops::resize(&img, MODEL_INPUT, MODEL_INPUT, FilterType::Triangle);
        ModelInput::from_rgb(resized.into_raw())
    }
}

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Device path (e.g. "/dev/video0") or a `stub://` directive.
    pub device: String,
    /// Requested capture width.
    pub width: u32,
    /// Requested capture height.
    pub height: u32,
    /// Frames discarded after open so auto-exposure settles.
    pub warmup_frames: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "stub://camera0".to_string(),
            width: 1280,
            height: 720,
            warmup_frames: 20,
        }
    }
}

/// Camera source with a synthetic fallback for `stub://` devices.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "ingest-v4l2")]
    V4l2(v4l2::V4l2Camera),
}

impl CameraSource {
    /// Open the device at the configured resolution and run the warmup.
    ///
    /// The device handle is released when the source is dropped.
    pub fn open(config: &CameraConfig) -> Result<Self> {
        let mut source = if let Some(directive) = config.device.strip_prefix("stub://") {
            if directive == "fail-open" {
                anyhow::bail!("cannot open camera {}", config.device);
            }
            log::info!("camera: opened {} (synthetic)", config.device);
            Self {
                backend: CameraBackend::Synthetic(SyntheticCamera::new(config, directive)),
            }
        } else {
            #[cfg(feature = "ingest-v4l2")]
            {
                Self {
                    backend: CameraBackend::V4l2(v4l2::V4l2Camera::open(config)?),
                }
            }
            #[cfg(not(feature = "ingest-v4l2"))]
            {
                anyhow::bail!(
                    "camera device {} requires the ingest-v4l2 feature",
                    config.device
                );
            }
        };

        for _ in 0..config.warmup_frames {
            source.read_frame()?;
        }
        Ok(source)
    }

    /// Capture one frame, blocking until it is available.
    pub fn read_frame(&mut self) -> Result<Frame> {
        match &mut self.backend {
            CameraBackend::Synthetic(camera) => camera.read_frame(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(camera) => camera.read_frame(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic camera (stub://) for tests and hardware-free deployments
// ----------------------------------------------------------------------------

/// Directives: `stub://<name>` captures forever; `stub://fail-after-N`
/// errors on the (N+1)-th read, warmup reads included.
struct SyntheticCamera {
    width: u32,
    height: u32,
    frames_read: u64,
    fail_after: Option<u64>,
}

impl SyntheticCamera {
    fn new(config: &CameraConfig, directive: &str) -> Self {
        let fail_after = directive
            .strip_prefix("fail-after-")
            .and_then(|n| n.parse().ok());
        Self {
            width: config.width,
            height: config.height,
            frames_read: 0,
            fail_after,
        }
    }

    fn read_frame(&mut self) -> Result<Frame> {
        if let Some(limit) = self.fail_after {
            if self.frames_read >= limit {
                anyhow::bail!("synthetic camera read failure after {} frames", limit);
            }
        }
        self.frames_read += 1;

        // Deterministic gradient mixed with the frame counter.
        let pixel_count = (self.width * self.height * 3) as usize;
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frames_read) % 256) as u8;
        }

        Ok(Frame {
            pixels,
            width: self.width,
            height: self.height,
        })
    }
}
