//! V4L2 camera capture (feature: ingest-v4l2).

use anyhow::{Context, Result};
use ouroboros::self_referencing;

use crate::ingest::{CameraConfig, Frame};

/// A live V4L2 capture stream in RGB3 format.
///
/// Dropping the camera tears down the stream and releases the device node.
pub struct V4l2Camera {
    state: CaptureState,
    width: u32,
    height: u32,
}

#[self_referencing]
struct CaptureState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Camera {
    pub fn open(config: &CameraConfig) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&config.device)
            .with_context(|| format!("open v4l2 device {}", config.device))?;

        let mut format = device.format().context("read v4l2 format")?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        // The driver may adjust the resolution; capture at whatever it granted.
        let format = device
            .set_format(&format)
            .with_context(|| format!("set v4l2 format on {}", config.device))?;
        let (width, height) = (format.width, format.height);

        let state = CaptureStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 capture stream"))
            },
        }
        .try_build()?;

        log::info!("camera: opened {} ({}x{})", config.device, width, height);
        Ok(Self {
            state,
            width,
            height,
        })
    }

    pub fn read_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let pixels = self
            .state
            .with_mut(|fields| fields.stream.next().map(|(buf, _meta)| buf.to_vec()))
            .context("capture v4l2 frame")?;

        Ok(Frame {
            pixels,
            width: self.width,
            height: self.height,
        })
    }
}
