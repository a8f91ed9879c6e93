//! Live camera frame source.
//!
//! Facade over capture backends:
//! - `stub://` synthetic feed, always available, unbounded unless told to
//!   drop (`drop_after=N` query parameter) for exercising device loss
//! - V4L2 devices behind the `source-v4l2` feature
//!
//! Device references: a bare index (`"0"`) maps to `/dev/video0`, anything
//! else is taken as a device path.

use std::fmt;

use anyhow::Result;

use super::{stub_param, synthetic_frame, FrameSource, STUB_SCHEME};
#[cfg(feature = "source-v4l2")]
use super::camera_v4l2::V4l2Camera;
use crate::frame::Frame;

const DEFAULT_STUB_WIDTH: u32 = 640;
const DEFAULT_STUB_HEIGHT: u32 = 480;

pub struct CameraSource {
    backend: CameraBackend,
}

impl fmt::Debug for CameraSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraSource").finish_non_exhaustive()
    }
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "source-v4l2")]
    Device(V4l2Camera),
    Released,
}

impl CameraSource {
    pub fn open(device: &str) -> Result<Self> {
        if device.starts_with(STUB_SCHEME) {
            return Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticCamera::open(device)),
            });
        }
        let path = device_path(device);
        #[cfg(feature = "source-v4l2")]
        {
            Ok(Self {
                backend: CameraBackend::Device(V4l2Camera::open(&path)?),
            })
        }
        #[cfg(not(feature = "source-v4l2"))]
        {
            anyhow::bail!(
                "camera device '{path}' requires the source-v4l2 feature (stub:// cameras work without it)"
            )
        }
    }
}

impl FrameSource for CameraSource {
    fn read(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            CameraBackend::Synthetic(camera) => camera.next_frame(),
            #[cfg(feature = "source-v4l2")]
            CameraBackend::Device(camera) => camera.next_frame(),
            CameraBackend::Released => Ok(None),
        }
    }

    fn release(&mut self) {
        if !matches!(self.backend, CameraBackend::Released) {
            log::info!("CameraSource: released");
        }
        self.backend = CameraBackend::Released;
    }
}

/// `"0"` becomes `/dev/video0`; everything else passes through.
fn device_path(device: &str) -> String {
    match device.trim().parse::<u32>() {
        Ok(index) => format!("/dev/video{index}"),
        Err(_) => device.to_string(),
    }
}

// ----------------------------------------------------------------------------
// Synthetic camera (stub://)
// ----------------------------------------------------------------------------

struct SyntheticCamera {
    width: u32,
    height: u32,
    cursor: u64,
    drop_after: Option<u64>,
}

impl SyntheticCamera {
    fn open(device: &str) -> Self {
        log::info!("CameraSource: synthetic feed {device}");
        Self {
            width: stub_param(device, "width").unwrap_or(DEFAULT_STUB_WIDTH),
            height: stub_param(device, "height").unwrap_or(DEFAULT_STUB_HEIGHT),
            cursor: 0,
            drop_after: stub_param(device, "drop_after"),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(limit) = self.drop_after {
            if self.cursor >= limit {
                anyhow::bail!("synthetic camera dropped after {limit} frames");
            }
        }
        let frame = synthetic_frame(self.width, self.height, self.cursor);
        self.cursor += 1;
        Ok(Some(frame))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
