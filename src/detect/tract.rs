//! Tract-based detector for ONNX export of box-predicting models.
//!
//! Frames are stretched to the model input size while building the NCHW
//! tensor, so callers can feed any frame geometry. The raw output is decoded
//! as `[batch, candidates, 4 box + objectness + class scores]` rows, filtered
//! by confidence, and reduced with per-class IoU suppression.

use std::path::Path;

use anyhow::{bail, Context, Result};
use tract_onnx::prelude::*;

use crate::frame::{Frame, RGB_BYTES_PER_PIXEL};
use crate::record::Detection;

use super::Detector;

/// Square input edge the model graph is pinned to.
const INPUT_SIZE: u32 = 640;

type RunnableModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

pub struct TractDetector {
    model: RunnableModel,
    input_size: u32,
    class_names: Option<Vec<String>>,
    confidence: f32,
    iou: f32,
}

impl TractDetector {
    /// Load an ONNX model from disk and prepare it for inference. No network
    /// I/O, no writes beyond what model loading itself does.
    pub fn load(
        model_path: &Path,
        class_names: Option<Vec<String>>,
        confidence: f32,
        iou: f32,
    ) -> Result<Self> {
        let edge = INPUT_SIZE as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("loading onnx model {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, edge, edge)),
            )
            .context("setting model input fact")?
            .into_optimized()
            .context("optimizing onnx model")?
            .into_runnable()
            .context("building runnable onnx model")?;

        Ok(Self {
            model,
            input_size: INPUT_SIZE,
            class_names,
            confidence,
            iou,
        })
    }

    fn label(&self, class: usize) -> String {
        self.class_names
            .as_ref()
            .and_then(|names| names.get(class).cloned())
            .unwrap_or_else(|| format!("class{class}"))
    }

    /// Stretch-resize into the model grid and normalize to `[0, 1]` in one
    /// pass, nearest-neighbor on the source side.
    fn build_input(&self, frame: &Frame) -> Tensor {
        let edge = self.input_size as usize;
        let src_width = frame.width() as usize;
        let src_height = frame.height() as usize;
        let pixels = frame.as_rgb8();

        let input =
            tract_ndarray::Array4::from_shape_fn((1, 3, edge, edge), |(_, channel, y, x)| {
                let src_x = (x * src_width / edge).min(src_width - 1);
                let src_y = (y * src_height / edge).min(src_height - 1);
                let idx = (src_y * src_width + src_x) * RGB_BYTES_PER_PIXEL + channel;
                pixels[idx] as f32 / 255.0
            });
        input.into_tensor()
    }

    fn decode(&self, output: &Tensor, frame_width: u32, frame_height: u32) -> Result<Vec<Detection>> {
        let scores = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("model output was not [batch, candidates, attributes]")?;
        let attributes = scores.shape()[2];
        if attributes < 6 {
            bail!("model output carries {attributes} attributes per candidate, need at least 6");
        }
        let classes = attributes - 5;
        let scale_x = frame_width as f32 / self.input_size as f32;
        let scale_y = frame_height as f32 / self.input_size as f32;

        let mut candidates = Vec::new();
        for row in 0..scores.shape()[1] {
            let objectness = scores[[0, row, 4]];
            if objectness < self.confidence {
                continue;
            }
            let mut best_class = 0;
            let mut best_score = scores[[0, row, 5]];
            for class in 1..classes {
                let score = scores[[0, row, 5 + class]];
                if score > best_score {
                    best_class = class;
                    best_score = score;
                }
            }
            let confidence = objectness * best_score;
            if confidence < self.confidence {
                continue;
            }
            let cx = scores[[0, row, 0]] * scale_x;
            let cy = scores[[0, row, 1]] * scale_y;
            let half_w = scores[[0, row, 2]] * scale_x / 2.0;
            let half_h = scores[[0, row, 3]] * scale_y / 2.0;
            candidates.push(Candidate {
                class: best_class,
                confidence,
                corners: [cx - half_w, cy - half_h, cx + half_w, cy + half_h],
            });
        }

        let kept = suppress(candidates, self.iou);
        Ok(kept
            .into_iter()
            .map(|candidate| {
                Detection::new(
                    self.label(candidate.class),
                    candidate.confidence,
                    clamp_bbox(candidate.corners, frame_width, frame_height),
                )
            })
            .collect())
    }
}

impl Detector for TractDetector {
    fn name(&self) -> &str {
        "tract"
    }

    fn infer(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        if frame.width() == 0 || frame.height() == 0 {
            bail!("cannot infer on an empty frame");
        }
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("onnx inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow::anyhow!("model produced no outputs"))?;
        self.decode(output, frame.width(), frame.height())
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

    // Real inference on a blank frame, so graph allocation cost lands here
    // instead of on the first streamed frame.
    fn warm_up(&mut self) -> Result<()> {
        let blank = Frame::filled(self.input_size, self.input_size, [0, 0, 0]);
        self.infer(&blank).map(|_| ())
    }
}

#[derive(Clone, Copy)]
struct Candidate {
    class: usize,
    confidence: f32,
    corners: [f32; 4],
}

/// Greedy per-class suppression: highest confidence wins, same-class boxes
/// overlapping a winner past the threshold are dropped.
fn suppress(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Candidate> = Vec::new();
    'candidates: for candidate in candidates {
        for winner in &kept {
            if winner.class == candidate.class
                && box_iou(&winner.corners, &candidate.corners) > iou_threshold
            {
                continue 'candidates;
            }
        }
        kept.push(candidate);
    }
    kept
}

fn box_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let left = a[0].max(b[0]);
    let top = a[1].max(b[1]);
    let right = a[2].min(b[2]);
    let bottom = a[3].min(b[3]);
    let overlap = (right - left).max(0.0) * (bottom - top).max(0.0);
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - overlap;
    if union <= 0.0 {
        0.0
    } else {
        overlap / union
    }
}

fn clamp_bbox(corners: [f32; 4], width: u32, height: u32) -> (i32, i32, i32, i32) {
    let max_x = width.saturating_sub(1) as f32;
    let max_y = height.saturating_sub(1) as f32;
    (
        corners[0].clamp(0.0, max_x).round() as i32,
        corners[1].clamp(0.0, max_y).round() as i32,
        corners[2].clamp(0.0, max_x).round() as i32,
        corners[3].clamp(0.0, max_y).round() as i32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(class: usize, confidence: f32, corners: [f32; 4]) -> Candidate {
        Candidate {
            class,
            confidence,
            corners,
        }
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        assert_eq!(box_iou(&[0.0, 0.0, 10.0, 10.0], &[20.0, 20.0, 30.0, 30.0]), 0.0);
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let b = [5.0, 5.0, 25.0, 25.0];
        assert!((box_iou(&b, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn suppression_drops_same_class_overlap_only() {
        let kept = suppress(
            vec![
                candidate(0, 0.9, [0.0, 0.0, 10.0, 10.0]),
                candidate(0, 0.8, [1.0, 1.0, 11.0, 11.0]),
                candidate(1, 0.7, [1.0, 1.0, 11.0, 11.0]),
            ],
            0.45,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].class, 0);
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
        assert_eq!(kept[1].class, 1);
    }

    #[test]
    fn suppression_orders_by_confidence() {
        let kept = suppress(
            vec![
                candidate(0, 0.5, [0.0, 0.0, 10.0, 10.0]),
                candidate(0, 0.9, [100.0, 100.0, 110.0, 110.0]),
            ],
            0.45,
        );
        assert_eq!(kept.len(), 2);
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn bbox_clamps_to_frame_bounds() {
        let bbox = clamp_bbox([-5.0, -5.0, 700.0, 500.0], 640, 480);
        assert_eq!(bbox, (0, 0, 639, 479));
    }
}
