//! Frame container and the shared latest-frame cache.
//!
//! - `Frame`: owned interleaved RGB8 buffer plus dimensions.
//! - `FrameCache`: single-slot, lock-guarded copy of the most recent rendered
//!   frame, read on demand by the presentation thread for "save image" actions.
//!
//! Frames cross the worker/presentation boundary by value (full copies), so a
//! reader never observes a buffer being mutated in place.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use chrono::Local;

/// Bytes per pixel for interleaved RGB8.
pub const RGB_BYTES_PER_PIXEL: usize = 3;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One decoded frame: interleaved RGB8, row-major, no row padding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl Frame {
    /// Wrap an existing RGB8 buffer. Fails if the buffer length does not match
    /// `width * height * 3`.
    pub fn from_rgb8(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = width as usize * height as usize * RGB_BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(anyhow!(
                "frame buffer is {} bytes, expected {} for {}x{}",
                data.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Solid-color frame. Used by synthetic sources and tests.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * RGB_BYTES_PER_PIXEL);
        for _ in 0..pixels {
            data.extend_from_slice(&rgb);
        }
        Self {
            data,
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_rgb8(&self) -> &[u8] {
        &self.data
    }

    pub fn as_rgb8_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Byte offset of pixel (x, y), or `None` when out of bounds.
    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some((y as usize * self.width as usize + x as usize) * RGB_BYTES_PER_PIXEL)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        let i = self.offset(x, y)?;
        Some([self.data[i], self.data[i + 1], self.data[i + 2]])
    }

    /// Write one pixel. Out-of-bounds writes are ignored so drawing code can
    /// clip against the frame edge without pre-checking.
    pub fn put_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        if let Some(i) = self.offset(x, y) {
            self.data[i..i + 3].copy_from_slice(&rgb);
        }
    }

    /// Consume the frame, returning the raw buffer.
    pub fn into_rgb8(self) -> Vec<u8> {
        self.data
    }

    /// Encode to disk. The container format follows the file extension
    /// (`.png`, `.jpg`, ...).
    pub fn save(&self, path: &Path) -> Result<()> {
        let img: image::RgbImage =
            image::ImageBuffer::from_raw(self.width, self.height, self.data.clone())
                .ok_or_else(|| anyhow!("frame buffer does not match declared dimensions"))?;
        img.save(path)
            .with_context(|| format!("writing frame to {}", path.display()))
    }
}

// ----------------------------------------------------------------------------
// FrameCache
// ----------------------------------------------------------------------------

/// Single-slot cache of the latest rendered frame.
///
/// The worker stores a full copy each iteration; the presentation thread takes
/// its own copy out when the user asks to save. Neither side ever holds a
/// reference into the other's buffer.
pub struct FrameCache {
    slot: Mutex<Option<Frame>>,
}

impl FrameCache {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Replace the cached frame with a copy of `frame`.
    pub fn store(&self, frame: &Frame) -> Result<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| anyhow!("frame cache lock poisoned"))?;
        *slot = Some(frame.clone());
        Ok(())
    }

    /// Copy the cached frame out, if any.
    pub fn snapshot(&self) -> Result<Option<Frame>> {
        let slot = self
            .slot
            .lock()
            .map_err(|_| anyhow!("frame cache lock poisoned"))?;
        Ok(slot.clone())
    }

    pub fn clear(&self) -> Result<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| anyhow!("frame cache lock poisoned"))?;
        *slot = None;
        Ok(())
    }

    /// Save the cached frame to `path`. Fails if nothing has been cached yet.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let frame = self
            .snapshot()?
            .ok_or_else(|| anyhow!("no frame cached yet"))?;
        frame.save(path)
    }

    /// Save the cached frame into `dir` under a timestamped default name,
    /// creating the directory as needed. Returns the path written.
    pub fn save_to_dir(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating capture directory {}", dir.display()))?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("frame_{stamp}.png"));
        self.save_to(&path)?;
        Ok(path)
    }
}

impl Default for FrameCache {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgb8_rejects_mismatched_buffer() {
        assert!(Frame::from_rgb8(vec![0u8; 10], 4, 4).is_err());
        assert!(Frame::from_rgb8(vec![0u8; 48], 4, 4).is_ok());
    }

    #[test]
    fn pixel_roundtrip_and_bounds() {
        let mut frame = Frame::filled(8, 6, [1, 2, 3]);
        assert_eq!(frame.pixel(0, 0), Some([1, 2, 3]));
        frame.put_pixel(7, 5, [9, 8, 7]);
        assert_eq!(frame.pixel(7, 5), Some([9, 8, 7]));
        assert_eq!(frame.pixel(8, 0), None);
        // Out-of-bounds writes are clipped, not panics.
        frame.put_pixel(100, 100, [0, 0, 0]);
    }

    #[test]
    fn cache_stores_decoupled_copies() -> Result<()> {
        let cache = FrameCache::new();
        assert!(cache.snapshot()?.is_none());

        let mut frame = Frame::filled(4, 4, [10, 10, 10]);
        cache.store(&frame)?;

        // Mutating the original must not affect the cached copy.
        frame.put_pixel(0, 0, [200, 0, 0]);
        let cached = cache.snapshot()?.ok_or_else(|| anyhow!("cache empty"))?;
        assert_eq!(cached.pixel(0, 0), Some([10, 10, 10]));

        cache.clear()?;
        assert!(cache.snapshot()?.is_none());
        Ok(())
    }

    #[test]
    fn save_writes_png() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("frame.png");
        let frame = Frame::filled(16, 12, [0, 128, 255]);
        frame.save(&path)?;
        assert!(path.exists());
        Ok(())
    }

    #[test]
    fn save_to_dir_uses_a_timestamped_name() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cache = FrameCache::new();
        cache.store(&Frame::filled(8, 8, [30, 30, 30]))?;

        let path = cache.save_to_dir(&dir.path().join("captures"))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        assert!(
            name.starts_with("frame_") && name.ends_with(".png"),
            "got: {name}"
        );
        assert!(path.exists());
        Ok(())
    }
}
