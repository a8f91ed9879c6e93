use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::{DEFAULT_CONFIDENCE, DEFAULT_IOU};
use crate::preprocess::Preprocessor;

const DEFAULT_WEIGHTS_DIR: &str = "weights";
const DEFAULT_RESULTS_DIR: &str = "results";
const DEFAULT_CAMERA_SOURCE: &str = "stub://camera";
const DEFAULT_TARGET_FPS: f64 = 30.0;

#[derive(Debug, Deserialize, Default)]
struct BeltwatchConfigFile {
    weights: Option<String>,
    weights_dir: Option<PathBuf>,
    results_dir: Option<PathBuf>,
    detect: Option<DetectConfigFile>,
    camera: Option<CameraConfigFile>,
    preprocess: Option<PreprocessConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectConfigFile {
    confidence: Option<f32>,
    iou: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    source: Option<String>,
    target_fps: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct PreprocessConfigFile {
    resize_width: Option<u32>,
    resize_height: Option<u32>,
    enhance: Option<bool>,
    brightness: Option<f32>,
    contrast: Option<f32>,
    saturation: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct BeltwatchConfig {
    pub weights: Option<String>,
    pub weights_dir: PathBuf,
    pub results_dir: PathBuf,
    pub confidence: f32,
    pub iou: f32,
    pub camera: CameraSettings,
    pub preprocess: PreprocessSettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub source: String,
    pub target_fps: f64,
}

#[derive(Debug, Clone)]
pub struct PreprocessSettings {
    pub resize: Option<(u32, u32)>,
    pub enhance: bool,
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
}

impl BeltwatchConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("BELTWATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: BeltwatchConfigFile) -> Result<Self> {
        let weights = file.weights;
        let weights_dir = file
            .weights_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WEIGHTS_DIR));
        let results_dir = file
            .results_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_RESULTS_DIR));
        let confidence = file
            .detect
            .as_ref()
            .and_then(|detect| detect.confidence)
            .unwrap_or(DEFAULT_CONFIDENCE);
        let iou = file
            .detect
            .as_ref()
            .and_then(|detect| detect.iou)
            .unwrap_or(DEFAULT_IOU);
        let camera = CameraSettings {
            source: file
                .camera
                .as_ref()
                .and_then(|camera| camera.source.clone())
                .unwrap_or_else(|| DEFAULT_CAMERA_SOURCE.to_string()),
            target_fps: file
                .camera
                .as_ref()
                .and_then(|camera| camera.target_fps)
                .unwrap_or(DEFAULT_TARGET_FPS),
        };
        let preprocess_file = file.preprocess.unwrap_or_default();
        let resize = match (preprocess_file.resize_width, preprocess_file.resize_height) {
            (Some(width), Some(height)) => {
                if width == 0 || height == 0 {
                    return Err(anyhow!("preprocess resize dimensions must be non-zero"));
                }
                Some((width, height))
            }
            (None, None) => None,
            _ => {
                return Err(anyhow!(
                    "preprocess resize needs both resize_width and resize_height"
                ))
            }
        };
        let preprocess = PreprocessSettings {
            resize,
            enhance: preprocess_file.enhance.unwrap_or(false),
            brightness: preprocess_file.brightness.unwrap_or(1.0),
            contrast: preprocess_file.contrast.unwrap_or(1.0),
            saturation: preprocess_file.saturation.unwrap_or(1.0),
        };
        Ok(Self {
            weights,
            weights_dir,
            results_dir,
            confidence,
            iou,
            camera,
            preprocess,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(weights) = std::env::var("BELTWATCH_WEIGHTS") {
            if !weights.trim().is_empty() {
                self.weights = Some(weights);
            }
        }
        if let Ok(dir) = std::env::var("BELTWATCH_WEIGHTS_DIR") {
            if !dir.trim().is_empty() {
                self.weights_dir = PathBuf::from(dir);
            }
        }
        if let Ok(dir) = std::env::var("BELTWATCH_RESULTS_DIR") {
            if !dir.trim().is_empty() {
                self.results_dir = PathBuf::from(dir);
            }
        }
        if let Ok(confidence) = std::env::var("BELTWATCH_CONFIDENCE") {
            self.confidence = confidence
                .parse()
                .map_err(|_| anyhow!("BELTWATCH_CONFIDENCE must be a decimal threshold"))?;
        }
        if let Ok(iou) = std::env::var("BELTWATCH_IOU") {
            self.iou = iou
                .parse()
                .map_err(|_| anyhow!("BELTWATCH_IOU must be a decimal threshold"))?;
        }
        if let Ok(source) = std::env::var("BELTWATCH_CAMERA") {
            if !source.trim().is_empty() {
                self.camera.source = source;
            }
        }
        if let Ok(fps) = std::env::var("BELTWATCH_FPS") {
            self.camera.target_fps = fps
                .parse()
                .map_err(|_| anyhow!("BELTWATCH_FPS must be a number of frames per second"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(anyhow!("confidence threshold must be between 0 and 1"));
        }
        if !(0.0..=1.0).contains(&self.iou) {
            return Err(anyhow!("iou threshold must be between 0 and 1"));
        }
        if !self.camera.target_fps.is_finite() || self.camera.target_fps < 0.0 {
            return Err(anyhow!("camera target_fps must be zero or positive"));
        }
        if self.camera.source.trim().is_empty() {
            return Err(anyhow!("camera source must not be empty"));
        }
        for (name, factor) in [
            ("brightness", self.preprocess.brightness),
            ("contrast", self.preprocess.contrast),
            ("saturation", self.preprocess.saturation),
        ] {
            if !factor.is_finite() || factor < 0.0 {
                return Err(anyhow!("preprocess {name} must be zero or positive"));
            }
        }
        Ok(())
    }

    /// Preprocessor configured from the `preprocess` section. Out-of-range
    /// factors are clamped by the setters.
    pub fn preprocessor(&self) -> Preprocessor {
        let mut preprocessor = Preprocessor::new();
        preprocessor.set_target_size(self.preprocess.resize);
        preprocessor.set_enhance(self.preprocess.enhance);
        preprocessor.set_brightness(self.preprocess.brightness);
        preprocessor.set_contrast(self.preprocess.contrast);
        preprocessor.set_saturation(self.preprocess.saturation);
        preprocessor
    }

    /// Weights reference for this run: explicit override first, then the
    /// config entry, then the first model under the weights directory,
    /// finally the scripted detector.
    pub fn resolve_weights(&self, explicit: Option<&str>) -> Result<String> {
        if let Some(weights) = explicit {
            return Ok(weights.to_string());
        }
        if let Some(weights) = &self.weights {
            return Ok(weights.clone());
        }
        let discovered = crate::detect::discover_weights(&self.weights_dir)?;
        if let Some(first) = discovered.first() {
            return Ok(first.display().to_string());
        }
        log::warn!(
            "Config: no weights under {}, falling back to the scripted detector",
            self.weights_dir.display()
        );
        Ok(format!("{}detector", crate::source::STUB_SCHEME))
    }
}

fn read_config_file(path: &Path) -> Result<BeltwatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
