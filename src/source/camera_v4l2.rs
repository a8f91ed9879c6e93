//! V4L2 camera capture.
//!
//! Holds the device and its memory-mapped capture stream together in one
//! self-referencing state, since the stream borrows the device for its whole
//! life. Frames are requested as RGB3; if the driver refuses the format or
//! dimensions, whatever it settled on is reported and used.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use crate::frame::{Frame, RGB_BYTES_PER_PIXEL};

const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;
const CAPTURE_BUFFERS: u32 = 4;

pub(crate) struct V4l2Camera {
    device: String,
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
    pub(crate) fn open(device_path: &str) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(device_path)
            .with_context(|| format!("opening v4l2 device {device_path}"))?;
        let mut format = device.format().context("reading v4l2 format")?;
        format.width = CAPTURE_WIDTH;
        format.height = CAPTURE_HEIGHT;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("CameraSource: failed to set format on {device_path}: {err}");
                device
                    .format()
                    .context("reading v4l2 format after set failure")?
            }
        };
        if &format.fourcc.repr != b"RGB3" {
            return Err(anyhow!(
                "device {} does not capture RGB3 (got {})",
                device_path,
                format.fourcc
            ));
        }

        let width = format.width;
        let height = format.height;
        let state = CaptureStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, CAPTURE_BUFFERS)
                    .map_err(|err| anyhow::Error::new(err).context("creating v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!("CameraSource: connected to {device_path} ({width}x{height})");
        Ok(Self {
            device: device_path.to_string(),
            state,
            width,
            height,
        })
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        use v4l::io::traits::CaptureStream;

        let (buf, _meta) = self
            .state
            .with_mut(|fields| fields.stream.next())
            .with_context(|| format!("capturing frame from {}", self.device))?;

        let expected = self.width as usize * self.height as usize * RGB_BYTES_PER_PIXEL;
        if buf.len() < expected {
            return Err(anyhow!(
                "short capture buffer from {}: {} bytes, expected {}",
                self.device,
                buf.len(),
                expected
            ));
        }
        // drivers may pad the buffer past the frame
        let frame = Frame::from_rgb8(buf[..expected].to_vec(), self.width, self.height)?;
        Ok(Some(frame))
    }
}
