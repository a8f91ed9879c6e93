//! Single-image source.
//!
//! Decodes one image up front and yields it exactly once, so a still scan
//! runs through the same session loop as a stream: one frame, then end of
//! stream on the next pull.

use anyhow::{Context, Result};

use super::{stub_param, synthetic_frame, FrameSource, STUB_SCHEME};
use crate::frame::Frame;

const DEFAULT_STUB_WIDTH: u32 = 640;
const DEFAULT_STUB_HEIGHT: u32 = 480;

pub struct StillSource {
    frame: Option<Frame>,
}

impl StillSource {
    /// Decode `path` into memory. `stub://` produces a synthetic frame
    /// (`width`/`height` query parameters, 640x480 by default).
    pub fn open(path: &str) -> Result<Self> {
        let frame = if path.starts_with(STUB_SCHEME) {
            let width = stub_param(path, "width").unwrap_or(DEFAULT_STUB_WIDTH);
            let height = stub_param(path, "height").unwrap_or(DEFAULT_STUB_HEIGHT);
            synthetic_frame(width, height, 0)
        } else {
            let image = image::open(path)
                .with_context(|| format!("failed to open image '{path}'"))?
                .to_rgb8();
            let (width, height) = image.dimensions();
            Frame::from_rgb8(image.into_raw(), width, height)?
        };
        log::info!(
            "StillSource: loaded {} ({}x{})",
            path,
            frame.width(),
            frame.height()
        );
        Ok(Self { frame: Some(frame) })
    }
}

impl FrameSource for StillSource {
    fn read(&mut self) -> Result<Option<Frame>> {
        Ok(self.frame.take())
    }

    fn release(&mut self) {
        self.frame = None;
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_yields_exactly_one_frame() -> Result<()> {
        let mut source = StillSource::open("stub://frame?width=64&height=48")?;
        let frame = source.read()?.expect("first read yields the frame");
        assert_eq!((frame.width(), frame.height()), (64, 48));
        assert!(source.read()?.is_none());
        assert!(source.read()?.is_none());
        Ok(())
    }

    #[test]
    fn decodes_an_image_from_disk() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("input.png");
        Frame::filled(20, 10, [0, 200, 0]).save(&path)?;

        let mut source = StillSource::open(&path.to_string_lossy())?;
        let frame = source.read()?.expect("decoded frame");
        assert_eq!((frame.width(), frame.height()), (20, 10));
        assert_eq!(frame.pixel(5, 5), Some([0, 200, 0]));
        Ok(())
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(StillSource::open("/no/such/image.png").is_err());
    }

    #[test]
    fn release_drops_the_pending_frame() -> Result<()> {
        let mut source = StillSource::open("stub://frame")?;
        source.release();
        assert!(source.read()?.is_none());
        Ok(())
    }
}
