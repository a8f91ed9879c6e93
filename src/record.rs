//! Detection records and the per-run aggregate.
//!
//! This module provides `Detection` and `RecordLog` for accumulating results:
//! - Appending whole per-frame batches, tagged with one shared capture
//!   timestamp and the frame sequence number
//! - Per-class running totals that always match the history length
//! - Summary text for the presentation side (current frame + cumulative)
//!
//! The log sits behind an internal lock so the stream worker appends while the
//! presentation thread reads counts or triggers an export.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};

/// Timestamp layout shared by records, exports, and the alarm banner.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Local wall-clock time in the shared record format.
pub fn timestamp_now() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

// ----------------------------------------------------------------------------
// Detection
// ----------------------------------------------------------------------------

/// One detected object: class label, confidence, and a pixel-space box.
///
/// Boxes are `(x1, y1, x2, y2)` corners. Coordinates may fall outside the
/// frame; drawing code clips them. Serialized form uses `class_name` for the
/// label so exports read naturally.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "class_name")]
    pub label: String,
    pub confidence: f32,
    pub bbox: (i32, i32, i32, i32),
    pub timestamp: String,
    pub frame_id: Option<u64>,
}

impl Detection {
    /// New detection stamped with the current time and no frame id yet.
    /// Confidence is rounded to two decimals, the precision every record
    /// format carries.
    pub fn new(label: impl Into<String>, confidence: f32, bbox: (i32, i32, i32, i32)) -> Self {
        Self {
            label: label.into(),
            confidence: round2(confidence),
            bbox,
            timestamp: timestamp_now(),
            frame_id: None,
        }
    }
}

fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

/// Per-class counts for one batch, in first-seen order.
///
/// Order matters to the alarm banner, which lists classes as they appeared.
pub fn summarize(batch: &[Detection]) -> Vec<(String, u64)> {
    let mut counts: Vec<(String, u64)> = Vec::new();
    for det in batch {
        match counts.iter_mut().find(|(label, _)| *label == det.label) {
            Some((_, count)) => *count += 1,
            None => counts.push((det.label.clone(), 1)),
        }
    }
    counts
}

// ----------------------------------------------------------------------------
// RecordLog
// ----------------------------------------------------------------------------

const SECTION_RULE: &str = "--------------------";

struct LogState {
    history: Vec<Detection>,
    totals: BTreeMap<String, u64>,
}

/// Append-only log of every detection in the run, plus per-class totals.
///
/// `record` re-stamps each detection in a batch with one shared timestamp and
/// the frame id, so a batch always reads as a single capture instant.
pub struct RecordLog {
    state: Mutex<LogState>,
}

impl RecordLog {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LogState {
                history: Vec::new(),
                totals: BTreeMap::new(),
            }),
        }
    }

    fn locked(&self) -> Result<MutexGuard<'_, LogState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("record log lock poisoned"))
    }

    /// Append a whole per-frame batch. An empty batch leaves the log untouched.
    pub fn record(&self, batch: &[Detection], frame_id: u64) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let stamp = timestamp_now();
        let mut state = self.locked()?;
        for det in batch {
            let mut det = det.clone();
            det.timestamp = stamp.clone();
            det.frame_id = Some(frame_id);
            *state.totals.entry(det.label.clone()).or_insert(0) += 1;
            state.history.push(det);
        }
        Ok(())
    }

    /// Total records so far.
    pub fn len(&self) -> Result<usize> {
        Ok(self.locked()?.history.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.locked()?.history.is_empty())
    }

    /// Per-class totals, sorted by label.
    pub fn statistics(&self) -> Result<BTreeMap<String, u64>> {
        Ok(self.locked()?.totals.clone())
    }

    /// Copy of the last `n` records, oldest first.
    pub fn recent(&self, n: usize) -> Result<Vec<Detection>> {
        let state = self.locked()?;
        let start = state.history.len().saturating_sub(n);
        Ok(state.history[start..].to_vec())
    }

    /// Copy of the full history.
    pub fn history(&self) -> Result<Vec<Detection>> {
        Ok(self.locked()?.history.clone())
    }

    /// History and totals copied out under one lock acquisition, so exports
    /// never see a batch half-appended.
    pub fn export_snapshot(&self) -> Result<(Vec<Detection>, BTreeMap<String, u64>)> {
        let state = self.locked()?;
        Ok((state.history.clone(), state.totals.clone()))
    }

    /// Drop all records and totals.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.locked()?;
        state.history.clear();
        state.totals.clear();
        Ok(())
    }

    /// Two-section summary: counts for the given frame batch, then cumulative
    /// totals with their share of all records.
    pub fn result_text(&self, batch: &[Detection]) -> Result<String> {
        let state = self.locked()?;
        let mut out = String::new();

        out.push_str("Current frame:\n");
        out.push_str(SECTION_RULE);
        out.push('\n');
        let current = summarize(batch);
        if current.is_empty() {
            out.push_str("none\n");
        } else {
            for (label, count) in &current {
                out.push_str(&format!("{label}: {count}\n"));
            }
        }

        out.push_str("\nCumulative:\n");
        out.push_str(SECTION_RULE);
        out.push('\n');
        let total = state.history.len();
        if total == 0 {
            out.push_str("none\n");
        } else {
            for (label, count) in &state.totals {
                let share = (*count as f64) * 100.0 / (total as f64);
                out.push_str(&format!("{label}: {count} ({share:.1}%)\n"));
            }
        }

        Ok(out)
    }
}

impl Default for RecordLog {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
