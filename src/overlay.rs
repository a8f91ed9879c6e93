//! Alarm banner drawn over frames that carry detections.
//!
//! When a frame's batch is non-empty, the top strip of the frame is dimmed
//! and a timestamped alarm line is drawn across it, listing each detected
//! class with its count in first-seen order. Frames with an empty batch pass
//! through untouched.

use crate::draw::{self, GLYPH_HEIGHT, GLYPH_WIDTH};
use crate::frame::{Frame, RGB_BYTES_PER_PIXEL};
use crate::record::{self, Detection};

/// Height of the dimmed strip, in pixels.
pub const BANNER_HEIGHT: u32 = 50;
/// Share of the original pixel kept under the strip (60/40 blend with black).
const BANNER_KEEP: f32 = 0.4;
/// Banner text color.
pub const BANNER_TEXT: [u8; 3] = [255, 0, 0];

const BANNER_MARGIN: u32 = 10;
const BANNER_TEXT_TOP: u32 = 12;
const BANNER_LINE_SPACING: u32 = 4;
const BANNER_MAX_LINES: usize = 2;

/// Alarm line for `batch`: `"{timestamp} ALARM: {class}:{count}, ..."` with
/// classes in first-seen order. `None` when the batch is empty.
pub fn banner_text(batch: &[Detection]) -> Option<String> {
    if batch.is_empty() {
        return None;
    }
    let parts: Vec<String> = record::summarize(batch)
        .into_iter()
        .map(|(label, count)| format!("{label}:{count}"))
        .collect();
    Some(format!(
        "{} ALARM: {}",
        record::timestamp_now(),
        parts.join(", ")
    ))
}

/// Dim the top strip and draw the alarm line for `batch`. No-op when the
/// batch is empty. Text wraps on spaces to the frame width minus margins,
/// capped at two lines; anything further is dropped.
pub fn apply_alarm_banner(frame: &mut Frame, batch: &[Detection]) {
    let Some(text) = banner_text(batch) else {
        return;
    };
    dim_strip(frame);

    let max_width = frame.width().saturating_sub(2 * BANNER_MARGIN);
    let lines = wrap_to_width(&text, max_width);
    for (i, line) in lines.iter().enumerate() {
        let y = BANNER_TEXT_TOP + i as u32 * (GLYPH_HEIGHT + BANNER_LINE_SPACING);
        draw::draw_text(frame, line, BANNER_MARGIN, y, BANNER_TEXT);
    }
}

fn dim_strip(frame: &mut Frame) {
    let rows = BANNER_HEIGHT.min(frame.height()) as usize;
    let row_bytes = frame.width() as usize * RGB_BYTES_PER_PIXEL;
    let data = frame.as_rgb8_mut();
    for byte in data[..rows * row_bytes].iter_mut() {
        *byte = ((*byte as f32) * BANNER_KEEP) as u8;
    }
}

/// Greedy word wrap against a pixel budget, at most `BANNER_MAX_LINES` lines.
/// A single word wider than the budget stays on its own line and clips at the
/// frame edge when drawn.
fn wrap_to_width(text: &str, max_width_px: u32) -> Vec<String> {
    let max_chars = (max_width_px / GLYPH_WIDTH).max(1) as usize;
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if !current.is_empty() && needed > max_chars {
            lines.push(std::mem::take(&mut current));
            if lines.len() == BANNER_MAX_LINES {
                return lines;
            }
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
