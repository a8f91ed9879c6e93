//! Detector contract, loading, and weights discovery.
//!
//! Backends implement `Detector` and are chosen by the weights reference:
//! - `stub://` loads the scripted detector (always available)
//! - `.onnx` loads real inference behind the `backend-tract` feature
//! - `.pt` / `.pth` and anything else are rejected outright, never silently
//!   swapped for a default
//!
//! Class labels come from a sidecar file next to the weights (`<stem>.names`,
//! then `classes.txt`), one label per line.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};

use crate::frame::Frame;
use crate::record::Detection;

pub mod stub;
#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::ScriptedDetector;

/// Default confidence threshold: detections below it are discarded.
pub const DEFAULT_CONFIDENCE: f32 = 0.45;
/// Default IoU threshold for suppressing overlapping boxes.
pub const DEFAULT_IOU: f32 = 0.45;

// ----------------------------------------------------------------------------
// Contract
// ----------------------------------------------------------------------------

/// Inference backend. One instance serves one stream at a time; shared access
/// goes through a `DetectorHandle`.
pub trait Detector: Send {
    /// Short backend name for logs and status lines.
    fn name(&self) -> &str;

    /// Run inference on one frame. The returned batch carries everything at
    /// or above the confidence threshold; it may be empty.
    fn infer(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    fn set_confidence(&mut self, threshold: f32);

    fn set_iou(&mut self, threshold: f32);

    fn confidence(&self) -> f32;

    fn iou(&self) -> f32;

    /// One throwaway inference so model state is paged in before the first
    /// real frame. Backends without model state keep the no-op default.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    /// Draw `batch` onto `frame`: boxes plus label tags.
    fn render(&self, frame: &mut Frame, batch: &[Detection]) {
        crate::draw::draw_detections(frame, batch);
    }
}

impl fmt::Debug for dyn Detector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Detector")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

/// Shared detector: the stream worker infers on it while the presentation
/// side adjusts thresholds.
pub type DetectorHandle = Arc<Mutex<Box<dyn Detector>>>;

pub fn shared(detector: Box<dyn Detector>) -> DetectorHandle {
    Arc::new(Mutex::new(detector))
}

// ----------------------------------------------------------------------------
// Loading
// ----------------------------------------------------------------------------

/// Build the backend selected by `weights`, then warm it up.
pub fn load_detector(weights: &str, confidence: f32, iou: f32) -> Result<Box<dyn Detector>> {
    let mut detector = build_detector(weights, confidence, iou)?;
    detector
        .warm_up()
        .with_context(|| format!("warm-up inference failed for '{weights}'"))?;
    log::info!(
        "Detector: {} ready (confidence {:.2}, iou {:.2})",
        detector.name(),
        detector.confidence(),
        detector.iou()
    );
    Ok(detector)
}

fn build_detector(weights: &str, confidence: f32, iou: f32) -> Result<Box<dyn Detector>> {
    if weights.starts_with(crate::source::STUB_SCHEME) {
        let mut detector = ScriptedDetector::new();
        detector.set_confidence(confidence);
        detector.set_iou(iou);
        return Ok(Box::new(detector));
    }
    let path = Path::new(weights);
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "onnx" => load_onnx(path, confidence, iou),
        "pt" | "pth" => Err(anyhow!(
            "torch weights '{weights}' are not supported; export the model to onnx"
        )),
        other => Err(anyhow!(
            "unsupported weights extension '{other}' in '{weights}'"
        )),
    }
}

#[cfg(feature = "backend-tract")]
fn load_onnx(path: &Path, confidence: f32, iou: f32) -> Result<Box<dyn Detector>> {
    let class_names = sidecar_class_names(path)?;
    let detector = tract::TractDetector::load(path, class_names, confidence, iou)?;
    Ok(Box::new(detector))
}

#[cfg(not(feature = "backend-tract"))]
fn load_onnx(path: &Path, _confidence: f32, _iou: f32) -> Result<Box<dyn Detector>> {
    Err(anyhow!(
        "onnx weights '{}' require the backend-tract feature",
        path.display()
    ))
}

// ----------------------------------------------------------------------------
// Weights discovery and sidecars
// ----------------------------------------------------------------------------

/// Model files under `dir` (`.onnx`, `.pt`), sorted by path. A missing
/// directory reads as empty rather than failing.
pub fn discover_weights(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut found = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("scanning weights directory {}", dir.display()))?
    {
        let path = entry?.path();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        if matches!(extension.as_deref(), Some("onnx") | Some("pt")) {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// Class labels from a sidecar file next to `weights`: `<stem>.names` wins,
/// then `classes.txt`. `None` when neither exists or both are empty.
pub fn sidecar_class_names(weights: &Path) -> Result<Option<Vec<String>>> {
    let mut candidates = Vec::new();
    if let Some(stem) = weights.file_stem().and_then(|stem| stem.to_str()) {
        candidates.push(weights.with_file_name(format!("{stem}.names")));
    }
    if let Some(dir) = weights.parent() {
        candidates.push(dir.join("classes.txt"));
    }

    for candidate in candidates {
        if !candidate.is_file() {
            continue;
        }
        let raw = fs::read_to_string(&candidate)
            .with_context(|| format!("reading class names {}", candidate.display()))?;
        let names: Vec<String> = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        if !names.is_empty() {
            log::info!(
                "Detector: {} class names from {}",
                names.len(),
                candidate.display()
            );
            return Ok(Some(names));
        }
    }
    Ok(None)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
