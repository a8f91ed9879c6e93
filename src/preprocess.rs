//! Frame preprocessing ahead of inference.
//!
//! Optional per-frame adjustments applied between the source and the
//! detector: a bilinear resize to a fixed target, and an enhancement pass
//! (brightness, contrast, saturation). All three factors are clamped to
//! `0.0..=2.0`, with `1.0` meaning no change. The default preprocessor is an
//! identity pass.

use crate::frame::{Frame, RGB_BYTES_PER_PIXEL};

/// Lower clamp for enhancement factors.
pub const FACTOR_MIN: f32 = 0.0;
/// Upper clamp for enhancement factors.
pub const FACTOR_MAX: f32 = 2.0;

/// Per-frame adjustment pipeline. Shared behind a lock so the presentation
/// side can toggle enhancement while a stream is running.
#[derive(Clone, Debug, PartialEq)]
pub struct Preprocessor {
    target_size: Option<(u32, u32)>,
    enhance: bool,
    brightness: f32,
    contrast: f32,
    saturation: f32,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self {
            target_size: None,
            enhance: false,
            brightness: 1.0,
            contrast: 1.0,
            saturation: 1.0,
        }
    }
}

impl Preprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resize target, or `None` to keep source dimensions.
    pub fn set_target_size(&mut self, size: Option<(u32, u32)>) {
        self.target_size = size;
    }

    /// Master switch for the enhancement pass. The factors are kept either
    /// way, so toggling back on restores the previous look.
    pub fn set_enhance(&mut self, on: bool) {
        self.enhance = on;
    }

    pub fn enhance(&self) -> bool {
        self.enhance
    }

    pub fn set_brightness(&mut self, factor: f32) {
        self.brightness = clamp_factor(factor);
    }

    pub fn set_contrast(&mut self, factor: f32) {
        self.contrast = clamp_factor(factor);
    }

    pub fn set_saturation(&mut self, factor: f32) {
        self.saturation = clamp_factor(factor);
    }

    pub fn brightness(&self) -> f32 {
        self.brightness
    }

    pub fn contrast(&self) -> f32 {
        self.contrast
    }

    pub fn saturation(&self) -> f32 {
        self.saturation
    }

    /// Run the configured adjustments. With defaults this returns the frame
    /// unchanged.
    pub fn process(&self, frame: Frame) -> Frame {
        let mut frame = match self.target_size {
            Some((width, height))
                if width > 0
                    && height > 0
                    && (width != frame.width() || height != frame.height()) =>
            {
                resize_bilinear(&frame, width, height)
            }
            _ => frame,
        };
        if self.enhance {
            enhance_in_place(&mut frame, self.brightness, self.contrast, self.saturation);
        }
        frame
    }
}

fn clamp_factor(factor: f32) -> f32 {
    factor.clamp(FACTOR_MIN, FACTOR_MAX)
}

/// Brightness shifts every channel by `(factor - 1) * 50`, contrast scales
/// around zero, saturation pulls channels toward or away from the pixel's
/// luma. Each stage clamps to the byte range before the next.
fn enhance_in_place(frame: &mut Frame, brightness: f32, contrast: f32, saturation: f32) {
    let shift = (brightness - 1.0) * 50.0;
    for px in frame.as_rgb8_mut().chunks_exact_mut(RGB_BYTES_PER_PIXEL) {
        let mut rgb = [0f32; 3];
        for (slot, &value) in rgb.iter_mut().zip(px.iter()) {
            let shifted = (value as f32 + shift).clamp(0.0, 255.0);
            *slot = (shifted * contrast).clamp(0.0, 255.0);
        }
        let luma = 0.299 * rgb[0] + 0.587 * rgb[1] + 0.114 * rgb[2];
        for (out, value) in px.iter_mut().zip(rgb.iter()) {
            let adjusted = luma + (value - luma) * saturation;
            *out = adjusted.clamp(0.0, 255.0).round() as u8;
        }
    }
}

fn resize_bilinear(src: &Frame, dst_width: u32, dst_height: u32) -> Frame {
    if src.width() == 0 || src.height() == 0 {
        return src.clone();
    }
    let mut dst = Frame::filled(dst_width, dst_height, [0, 0, 0]);
    let scale_x = src.width() as f32 / dst_width as f32;
    let scale_y = src.height() as f32 / dst_height as f32;

    for y in 0..dst_height {
        let fy = ((y as f32 + 0.5) * scale_y - 0.5).max(0.0);
        let y0 = fy.floor() as u32;
        let y1 = (y0 + 1).min(src.height() - 1);
        let ty = fy - y0 as f32;
        for x in 0..dst_width {
            let fx = ((x as f32 + 0.5) * scale_x - 0.5).max(0.0);
            let x0 = fx.floor() as u32;
            let x1 = (x0 + 1).min(src.width() - 1);
            let tx = fx - x0 as f32;

            let p00 = sample(src, x0, y0);
            let p10 = sample(src, x1, y0);
            let p01 = sample(src, x0, y1);
            let p11 = sample(src, x1, y1);

            let mut out = [0u8; 3];
            for channel in 0..3 {
                let top = p00[channel] + (p10[channel] - p00[channel]) * tx;
                let bottom = p01[channel] + (p11[channel] - p01[channel]) * tx;
                let value = top + (bottom - top) * ty;
                out[channel] = value.clamp(0.0, 255.0).round() as u8;
            }
            dst.put_pixel(x, y, out);
        }
    }
    dst
}

fn sample(frame: &Frame, x: u32, y: u32) -> [f32; 3] {
    let px = frame.pixel(x, y).unwrap_or([0, 0, 0]);
    [px[0] as f32, px[1] as f32, px[2] as f32]
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_identity() {
        let preprocess = Preprocessor::new();
        let frame = Frame::filled(32, 24, [40, 80, 120]);
        let out = preprocess.process(frame.clone());
        assert_eq!(out, frame);
    }

    #[test]
    fn factors_clamp_to_range() {
        let mut preprocess = Preprocessor::new();
        preprocess.set_brightness(5.0);
        preprocess.set_contrast(-1.0);
        preprocess.set_saturation(1.5);
        assert_eq!(preprocess.brightness(), FACTOR_MAX);
        assert_eq!(preprocess.contrast(), FACTOR_MIN);
        assert_eq!(preprocess.saturation(), 1.5);
    }

    #[test]
    fn enhancement_only_runs_when_enabled() {
        let mut preprocess = Preprocessor::new();
        preprocess.set_brightness(2.0);
        let frame = Frame::filled(8, 8, [100, 100, 100]);
        assert_eq!(preprocess.process(frame.clone()), frame);

        preprocess.set_enhance(true);
        let brightened = preprocess.process(frame.clone());
        // brightness 2.0 shifts every channel by +50
        assert_eq!(brightened.pixel(0, 0), Some([150, 150, 150]));
    }

    #[test]
    fn zero_saturation_grays_the_frame() {
        let mut preprocess = Preprocessor::new();
        preprocess.set_enhance(true);
        preprocess.set_saturation(0.0);
        let frame = Frame::filled(4, 4, [200, 40, 90]);
        let out = preprocess.process(frame);
        let px = out.pixel(0, 0).unwrap();
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
    }

    #[test]
    fn resize_changes_dimensions() {
        let mut preprocess = Preprocessor::new();
        preprocess.set_target_size(Some((16, 12)));
        let frame = Frame::filled(64, 48, [9, 9, 9]);
        let out = preprocess.process(frame);
        assert_eq!((out.width(), out.height()), (16, 12));
        // solid input stays solid through interpolation
        assert_eq!(out.pixel(8, 6), Some([9, 9, 9]));
    }

    #[test]
    fn matching_target_size_skips_the_resize() {
        let mut preprocess = Preprocessor::new();
        preprocess.set_target_size(Some((10, 10)));
        let frame = Frame::filled(10, 10, [5, 5, 5]);
        let out = preprocess.process(frame.clone());
        assert_eq!(out, frame);
    }
}
