//! Scripted detector: replays a fixed sequence of detection batches.
//!
//! Loaded for `stub://` weights. It keeps the whole pipeline runnable with no
//! model file on disk, and its scripts let tests stage exact detector output,
//! including mid-stream failure.

use anyhow::{bail, Result};

use crate::frame::Frame;
use crate::record::Detection;

use super::{Detector, DEFAULT_CONFIDENCE, DEFAULT_IOU};

pub struct ScriptedDetector {
    script: Vec<Vec<Detection>>,
    cursor: usize,
    confidence: f32,
    iou: f32,
    fail_after: Option<usize>,
    frames_seen: usize,
}

impl ScriptedDetector {
    /// One steady detection per frame, forever.
    pub fn new() -> Self {
        Self::with_script(vec![vec![Detection::new("bolt", 0.91, (40, 40, 200, 160))]])
    }

    /// Replay `script` batch by batch, wrapping at the end. An empty script
    /// behaves like a model that never fires.
    pub fn with_script(script: Vec<Vec<Detection>>) -> Self {
        Self {
            script,
            cursor: 0,
            confidence: DEFAULT_CONFIDENCE,
            iou: DEFAULT_IOU,
            fail_after: None,
            frames_seen: 0,
        }
    }

    pub fn with_empty_script() -> Self {
        Self::with_script(Vec::new())
    }

    /// Succeed for `frames` inferences, then fail every call after.
    pub fn with_failure_after(mut self, frames: usize) -> Self {
        self.fail_after = Some(frames);
        self
    }

    pub fn with_confidence(mut self, threshold: f32) -> Self {
        self.confidence = threshold;
        self
    }
}

impl Default for ScriptedDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for ScriptedDetector {
    fn name(&self) -> &str {
        "scripted"
    }

    fn infer(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        if let Some(limit) = self.fail_after {
            if self.frames_seen >= limit {
                bail!("scripted detector failed after {limit} frames");
            }
        }
        self.frames_seen += 1;

        if self.script.is_empty() {
            return Ok(Vec::new());
        }
        let batch = self.script[self.cursor % self.script.len()].clone();
        self.cursor += 1;
        Ok(batch
            .into_iter()
            .filter(|det| det.confidence >= self.confidence)
            .collect())
    }

    fn set_confidence(&mut self, threshold: f32) {
        self.confidence = threshold;
    }

    fn set_iou(&mut self, threshold: f32) {
        self.iou = threshold;
    }

    fn confidence(&self) -> f32 {
        self.confidence
    }

    fn iou(&self) -> f32 {
        self.iou
    }

    // Script cursor stays put: warm-up must not consume the first batch.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Frame {
        Frame::filled(32, 32, [0, 0, 0])
    }

    #[test]
    fn default_script_fires_every_frame() -> Result<()> {
        let mut detector = ScriptedDetector::new();
        for _ in 0..3 {
            let batch = detector.infer(&frame())?;
            assert_eq!(batch.len(), 1);
            assert_eq!(batch[0].label, "bolt");
        }
        Ok(())
    }

    #[test]
    fn script_wraps_around() -> Result<()> {
        let mut detector = ScriptedDetector::with_script(vec![
            vec![Detection::new("bolt", 0.9, (0, 0, 10, 10))],
            Vec::new(),
        ]);
        assert_eq!(detector.infer(&frame())?.len(), 1);
        assert_eq!(detector.infer(&frame())?.len(), 0);
        assert_eq!(detector.infer(&frame())?.len(), 1);
        Ok(())
    }

    #[test]
    fn confidence_threshold_filters_batches() -> Result<()> {
        let mut detector = ScriptedDetector::with_script(vec![vec![
            Detection::new("bolt", 0.9, (0, 0, 10, 10)),
            Detection::new("crack", 0.3, (5, 5, 15, 15)),
        ]]);
        detector.set_confidence(0.5);
        let batch = detector.infer(&frame())?;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].label, "bolt");
        Ok(())
    }

    #[test]
    fn failure_after_trips_on_schedule() {
        let mut detector = ScriptedDetector::new().with_failure_after(2);
        assert!(detector.infer(&frame()).is_ok());
        assert!(detector.infer(&frame()).is_ok());
        assert!(detector.infer(&frame()).is_err());
        assert!(detector.infer(&frame()).is_err());
    }

    #[test]
    fn empty_script_never_fires() -> Result<()> {
        let mut detector = ScriptedDetector::with_empty_script();
        assert!(detector.infer(&frame())?.is_empty());
        Ok(())
    }
}
