//! Video-file frame source.
//!
//! Facade over two playback backends:
//! - `stub://` synthetic clips, always available, used by tests and demos
//! - FFmpeg-decoded local files behind the `source-ffmpeg` feature
//!
//! Finite by construction: `read` returns `Ok(None)` after the last frame.
//! Container metadata (dimensions, frame rate, frame count) is reported
//! through `info`, and the session layer paces playback to the reported rate.

use std::fmt;

use anyhow::Result;

use super::{stub_param, synthetic_frame, FrameSource, SourceInfo, STUB_SCHEME};
#[cfg(feature = "source-ffmpeg")]
use super::video_ffmpeg::FfmpegVideo;
use crate::frame::Frame;

pub const DEFAULT_STUB_FRAMES: u64 = 75;
pub const DEFAULT_STUB_FPS: f64 = 25.0;
const DEFAULT_STUB_WIDTH: u32 = 640;
const DEFAULT_STUB_HEIGHT: u32 = 480;

pub struct VideoSource {
    backend: VideoBackend,
}

impl fmt::Debug for VideoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoSource").finish_non_exhaustive()
    }
}

enum VideoBackend {
    Synthetic(SyntheticClip),
    #[cfg(feature = "source-ffmpeg")]
    Ffmpeg(FfmpegVideo),
    Released,
}

impl VideoSource {
    /// Open a video file for playback. `stub://` clips accept `frames`,
    /// `fps`, `width`, and `height` query parameters.
    pub fn open(path: &str) -> Result<Self> {
        if path.starts_with(STUB_SCHEME) {
            Ok(Self {
                backend: VideoBackend::Synthetic(SyntheticClip::open(path)),
            })
        } else {
            #[cfg(feature = "source-ffmpeg")]
            {
                Ok(Self {
                    backend: VideoBackend::Ffmpeg(FfmpegVideo::open(path)?),
                })
            }
            #[cfg(not(feature = "source-ffmpeg"))]
            {
                anyhow::bail!(
                    "video file '{path}' requires the source-ffmpeg feature (stub:// clips work without it)"
                )
            }
        }
    }
}

impl FrameSource for VideoSource {
    fn read(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            VideoBackend::Synthetic(clip) => Ok(clip.next_frame()),
            #[cfg(feature = "source-ffmpeg")]
            VideoBackend::Ffmpeg(video) => video.next_frame(),
            VideoBackend::Released => Ok(None),
        }
    }

    fn release(&mut self) {
        if !matches!(self.backend, VideoBackend::Released) {
            log::info!("VideoSource: released");
        }
        self.backend = VideoBackend::Released;
    }

    fn info(&self) -> Option<SourceInfo> {
        match &self.backend {
            VideoBackend::Synthetic(clip) => Some(clip.info),
            #[cfg(feature = "source-ffmpeg")]
            VideoBackend::Ffmpeg(video) => Some(video.info()),
            VideoBackend::Released => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic clip (stub://)
// ----------------------------------------------------------------------------

struct SyntheticClip {
    info: SourceInfo,
    cursor: u64,
}

impl SyntheticClip {
    fn open(source: &str) -> Self {
        let info = SourceInfo {
            width: stub_param(source, "width").unwrap_or(DEFAULT_STUB_WIDTH),
            height: stub_param(source, "height").unwrap_or(DEFAULT_STUB_HEIGHT),
            fps: stub_param(source, "fps").unwrap_or(DEFAULT_STUB_FPS),
            frame_count: stub_param(source, "frames").unwrap_or(DEFAULT_STUB_FRAMES),
        };
        log::info!(
            "VideoSource: synthetic clip {} ({} frames @ {:.1} fps)",
            source,
            info.frame_count,
            info.fps
        );
        Self { info, cursor: 0 }
    }

    fn next_frame(&mut self) -> Option<Frame> {
        if self.cursor >= self.info.frame_count {
            return None;
        }
        let frame = synthetic_frame(self.info.width, self.info.height, self.cursor);
        self.cursor += 1;
        Some(frame)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
