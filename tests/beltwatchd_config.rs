use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::{tempdir, NamedTempFile};

use beltwatch::config::BeltwatchConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "BELTWATCH_CONFIG",
        "BELTWATCH_WEIGHTS",
        "BELTWATCH_WEIGHTS_DIR",
        "BELTWATCH_RESULTS_DIR",
        "BELTWATCH_CONFIDENCE",
        "BELTWATCH_IOU",
        "BELTWATCH_CAMERA",
        "BELTWATCH_FPS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "weights": "models/belt_v3.onnx",
        "weights_dir": "models",
        "results_dir": "shift_results",
        "detect": {
            "confidence": 0.6,
            "iou": 0.5
        },
        "camera": {
            "source": "/dev/video1",
            "target_fps": 24.0
        },
        "preprocess": {
            "resize_width": 800,
            "resize_height": 600,
            "enhance": true,
            "brightness": 1.2
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("BELTWATCH_CONFIG", file.path());
    std::env::set_var("BELTWATCH_CAMERA", "stub://camera");
    std::env::set_var("BELTWATCH_FPS", "12.5");

    let cfg = BeltwatchConfig::load().expect("load config");

    assert_eq!(cfg.weights.as_deref(), Some("models/belt_v3.onnx"));
    assert_eq!(cfg.weights_dir, PathBuf::from("models"));
    assert_eq!(cfg.results_dir, PathBuf::from("shift_results"));
    assert!((cfg.confidence - 0.6).abs() < f32::EPSILON);
    assert!((cfg.iou - 0.5).abs() < f32::EPSILON);
    assert_eq!(cfg.camera.source, "stub://camera");
    assert!((cfg.camera.target_fps - 12.5).abs() < f64::EPSILON);
    assert_eq!(cfg.preprocess.resize, Some((800, 600)));
    assert!(cfg.preprocess.enhance);
    assert!((cfg.preprocess.brightness - 1.2).abs() < f32::EPSILON);
    assert!((cfg.preprocess.contrast - 1.0).abs() < f32::EPSILON);

    clear_env();
}

#[test]
fn defaults_apply_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = BeltwatchConfig::load().expect("load config");

    assert_eq!(cfg.weights, None);
    assert_eq!(cfg.weights_dir, PathBuf::from("weights"));
    assert_eq!(cfg.results_dir, PathBuf::from("results"));
    assert!((cfg.confidence - 0.45).abs() < f32::EPSILON);
    assert!((cfg.iou - 0.45).abs() < f32::EPSILON);
    assert_eq!(cfg.camera.source, "stub://camera");
    assert!((cfg.camera.target_fps - 30.0).abs() < f64::EPSILON);
    assert_eq!(cfg.preprocess.resize, None);
    assert!(!cfg.preprocess.enhance);

    clear_env();
}

#[test]
fn threshold_outside_unit_range_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("BELTWATCH_CONFIDENCE", "1.5");
    let err = BeltwatchConfig::load().expect_err("confidence above 1 must fail");
    assert!(err.to_string().contains("confidence"));

    clear_env();
}

#[test]
fn malformed_fps_override_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("BELTWATCH_FPS", "fast");
    let err = BeltwatchConfig::load().expect_err("non-numeric fps must fail");
    assert!(err.to_string().contains("BELTWATCH_FPS"));

    clear_env();
}

#[test]
fn resize_requires_both_dimensions() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{ "preprocess": { "resize_width": 800 } }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    std::env::set_var("BELTWATCH_CONFIG", file.path());

    let err = BeltwatchConfig::load().expect_err("half a resize must fail");
    assert!(err.to_string().contains("resize"));

    clear_env();
}

#[test]
fn weights_resolution_walks_the_fallback_chain() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempdir().expect("temp weights dir");
    std::fs::write(dir.path().join("belt.onnx"), b"stub").expect("seed weights");
    std::env::set_var("BELTWATCH_WEIGHTS_DIR", dir.path());

    let cfg = BeltwatchConfig::load().expect("load config");

    // Explicit override beats everything.
    let explicit = cfg.resolve_weights(Some("override.onnx")).expect("resolve");
    assert_eq!(explicit, "override.onnx");

    // No override and no config entry falls through to discovery.
    let discovered = cfg.resolve_weights(None).expect("resolve");
    assert!(discovered.ends_with("belt.onnx"));

    // A configured entry wins over discovery.
    std::env::set_var("BELTWATCH_WEIGHTS", "models/pinned.onnx");
    let cfg = BeltwatchConfig::load().expect("load config");
    let pinned = cfg.resolve_weights(None).expect("resolve");
    assert_eq!(pinned, "models/pinned.onnx");

    clear_env();
}

#[test]
fn empty_weights_dir_falls_back_to_the_scripted_detector() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempdir().expect("temp weights dir");
    std::env::set_var("BELTWATCH_WEIGHTS_DIR", dir.path());

    let cfg = BeltwatchConfig::load().expect("load config");
    let resolved = cfg.resolve_weights(None).expect("resolve");
    assert_eq!(resolved, "stub://detector");

    clear_env();
}

#[test]
fn out_of_range_enhance_factors_are_clamped_by_the_preprocessor() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{ "preprocess": { "enhance": true, "brightness": 5.0 } }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    std::env::set_var("BELTWATCH_CONFIG", file.path());

    let cfg = BeltwatchConfig::load().expect("load config");
    assert!((cfg.preprocess.brightness - 5.0).abs() < f32::EPSILON);

    let preprocessor = cfg.preprocessor();
    assert!((preprocessor.brightness() - 2.0).abs() < f32::EPSILON);

    clear_env();
}
