//! beltwatchd - streaming belt detection daemon
//!
//! Opens a camera or video stream, runs the detector on every frame, and
//! logs result and status updates until the source ends or Ctrl-C. Recorded
//! detections can be exported to the results directory on exit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Parser;

use beltwatch::{
    export_to_dir, load_detector, shared, BeltwatchConfig, ExportFormat, SourceKind,
    StreamController, StreamUpdate,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// What to stream: "camera" or "video".
    #[arg(long, default_value = "camera")]
    kind: String,
    /// Camera device or video path. Camera streams default to the configured
    /// camera source.
    #[arg(long)]
    source: Option<String>,
    /// Weights reference (.onnx path or stub://detector).
    #[arg(long)]
    weights: Option<String>,
    /// Export recorded detections on exit: csv, json, or report.
    #[arg(long, value_name = "FORMAT")]
    export: Option<String>,
    /// Save the last rendered frame to the results directory on exit.
    #[arg(long)]
    snapshot: bool,
    /// Stop after this many processed frames (0 = run until the source ends
    /// or Ctrl-C).
    #[arg(long, default_value_t = 0)]
    max_frames: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let cfg = BeltwatchConfig::load()?;

    let kind = match args.kind.as_str() {
        "camera" => SourceKind::Camera,
        "video" => SourceKind::Video,
        other => {
            return Err(anyhow!(
                "unsupported stream kind '{other}' (use camera or video)"
            ))
        }
    };
    let source = match (&args.source, kind) {
        (Some(source), _) => source.clone(),
        (None, SourceKind::Camera) => cfg.camera.source.clone(),
        (None, _) => return Err(anyhow!("--source is required for video streams")),
    };

    let weights = cfg.resolve_weights(args.weights.as_deref())?;
    let detector = load_detector(&weights, cfg.confidence, cfg.iou)?;

    let (mut controller, feed) = StreamController::with_feed();
    controller.set_detector(shared(detector));
    controller.set_camera_fps(cfg.camera.target_fps);
    controller.set_preprocessor(cfg.preprocessor())?;

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::SeqCst);
        })?;
    }

    controller.start(kind, &source)?;
    log::info!("beltwatchd streaming {kind} from {source}");

    let mut frames = 0u64;
    while controller.is_running() {
        if interrupted.load(Ordering::SeqCst) {
            log::info!("interrupt received, stopping stream");
            break;
        }
        match feed.next_timeout(Duration::from_millis(200)) {
            Some(StreamUpdate::Result { record_count, .. }) => {
                frames += 1;
                log::debug!("frame {frames}: {record_count} detections recorded so far");
                if args.max_frames > 0 && frames >= args.max_frames {
                    log::info!("reached {} frames, stopping stream", args.max_frames);
                    break;
                }
            }
            Some(StreamUpdate::Status(message)) => log::info!("status: {message}"),
            Some(StreamUpdate::Frame(_)) | None => {}
        }
    }
    controller.stop()?;
    for update in feed.drain() {
        if let StreamUpdate::Status(message) = update {
            log::info!("status: {message}");
        }
    }

    if args.snapshot {
        match controller.frame_cache().save_to_dir(&cfg.results_dir) {
            Ok(path) => println!("last frame written to {}", path.display()),
            Err(err) => log::warn!("snapshot skipped: {err:#}"),
        }
    }

    let records = controller.records();
    log::info!("{} detections recorded", records.len()?);
    if let Some(format) = &args.export {
        let format = ExportFormat::from_name(format)?;
        let (path, count) = export_to_dir(&records, &cfg.results_dir, format)?;
        println!("{count} detections exported to {}", path.display());
    }
    Ok(())
}
