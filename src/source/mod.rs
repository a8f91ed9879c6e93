//! Frame sources for detection streams.
//!
//! Three source kinds, one trait:
//! - `still`: a single decoded image, yielded once
//! - `video`: finite file playback with container metadata
//! - `camera`: live capture with no natural end
//!
//! Every source yields interleaved RGB8 `Frame`s through `FrameSource`. The
//! `stub://` scheme is always available on all three kinds and produces
//! synthetic frames, so streams run end-to-end with no media files, devices,
//! or native decoders present. Native backends (FFmpeg files, V4L2 devices)
//! sit behind cargo features.

use std::fmt;

use anyhow::Result;
use rand::Rng;

use crate::frame::{Frame, RGB_BYTES_PER_PIXEL};

pub mod camera;
pub mod still;
pub mod video;

#[cfg(feature = "source-v4l2")]
mod camera_v4l2;
#[cfg(feature = "source-ffmpeg")]
mod video_ffmpeg;

pub use camera::CameraSource;
pub use still::StillSource;
pub use video::VideoSource;

/// URL scheme for synthetic sources.
pub const STUB_SCHEME: &str = "stub://";

// ----------------------------------------------------------------------------
// Contract
// ----------------------------------------------------------------------------

/// What a stream session opens: one image, a video file, or a camera.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    Image,
    Video,
    Camera,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Image => "image",
            SourceKind::Video => "video",
            SourceKind::Camera => "camera",
        };
        f.write_str(name)
    }
}

/// Playback metadata reported by finite sources.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frame_count: u64,
}

impl SourceInfo {
    pub fn duration_s(&self) -> f64 {
        if self.fps > 0.0 {
            self.frame_count as f64 / self.fps
        } else {
            0.0
        }
    }

    /// One-line description for status payloads, e.g. `"640x480, 25.0 fps, 3.0 s"`.
    pub fn describe(&self) -> String {
        format!(
            "{}x{}, {:.1} fps, {:.1} s",
            self.width,
            self.height,
            self.fps,
            self.duration_s()
        )
    }
}

/// Pull-based frame supplier.
///
/// `read` returns `Ok(None)` once the source is exhausted and an error when
/// the device or decoder fails mid-stream. Both end the stream; the session
/// layer words the final status differently for each.
pub trait FrameSource: Send {
    fn read(&mut self) -> Result<Option<Frame>>;

    /// Release underlying handles. Further reads yield `Ok(None)`. Idempotent.
    fn release(&mut self);

    /// Stream metadata, when the backend knows it.
    fn info(&self) -> Option<SourceInfo> {
        None
    }
}

/// Open `source` as `kind`.
pub fn open(kind: SourceKind, source: &str) -> Result<Box<dyn FrameSource>> {
    match kind {
        SourceKind::Image => Ok(Box::new(StillSource::open(source)?)),
        SourceKind::Video => Ok(Box::new(VideoSource::open(source)?)),
        SourceKind::Camera => Ok(Box::new(CameraSource::open(source)?)),
    }
}

// ----------------------------------------------------------------------------
// Shared stub machinery
// ----------------------------------------------------------------------------

/// Parse one query parameter out of a `stub://` URL, e.g.
/// `stub://clip?frames=3&fps=25`.
pub(crate) fn stub_param<T: std::str::FromStr>(source: &str, key: &str) -> Option<T> {
    let (_, query) = source.split_once('?')?;
    for pair in query.split('&') {
        if let Some((name, value)) = pair.split_once('=') {
            if name == key {
                return value.parse().ok();
            }
        }
    }
    None
}

/// Synthetic frame: a drifting gradient with low-amplitude noise, so
/// consecutive frames differ and annotations stay visible against it.
pub(crate) fn synthetic_frame(width: u32, height: u32, index: u64) -> Frame {
    let mut frame = Frame::filled(width, height, [0, 0, 0]);
    let mut rng = rand::thread_rng();
    let row = width as usize;
    for (i, px) in frame
        .as_rgb8_mut()
        .chunks_exact_mut(RGB_BYTES_PER_PIXEL)
        .enumerate()
    {
        let x = (i % row) as u64;
        let y = (i / row) as u64;
        let base = ((x + y + index * 3) % 256) as u8;
        px[0] = base;
        px[1] = base.wrapping_add(rng.gen_range(0..8));
        px[2] = 255 - base;
    }
    frame
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_params_parse_by_key() {
        let url = "stub://clip?frames=3&fps=25.5&width=320";
        assert_eq!(stub_param::<u64>(url, "frames"), Some(3));
        assert_eq!(stub_param::<f64>(url, "fps"), Some(25.5));
        assert_eq!(stub_param::<u32>(url, "width"), Some(320));
        assert_eq!(stub_param::<u32>(url, "height"), None);
        assert_eq!(stub_param::<u32>("stub://clip", "frames"), None);
        // unparsable values read as absent
        assert_eq!(stub_param::<u32>("stub://clip?frames=lots", "frames"), None);
    }

    #[test]
    fn source_info_describes_playback() {
        let info = SourceInfo {
            width: 640,
            height: 480,
            fps: 25.0,
            frame_count: 75,
        };
        assert_eq!(info.describe(), "640x480, 25.0 fps, 3.0 s");

        let unknown_rate = SourceInfo { fps: 0.0, ..info };
        assert_eq!(unknown_rate.duration_s(), 0.0);
    }

    #[test]
    fn synthetic_frames_differ_by_index() {
        let a = synthetic_frame(32, 24, 0);
        let b = synthetic_frame(32, 24, 1);
        assert_eq!((a.width(), a.height()), (32, 24));
        assert_ne!(a.as_rgb8(), b.as_rgb8());
    }

    #[test]
    fn open_dispatches_stub_sources() -> Result<()> {
        let mut source = open(SourceKind::Image, "stub://frame")?;
        assert!(source.read()?.is_some());
        assert!(source.read()?.is_none());

        let source = open(SourceKind::Video, "stub://clip?frames=2")?;
        assert_eq!(source.info().map(|info| info.frame_count), Some(2));

        let mut source = open(SourceKind::Camera, "stub://camera")?;
        assert!(source.read()?.is_some());
        Ok(())
    }
}
