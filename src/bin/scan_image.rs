//! scan_image - one-shot detection on a single image
//!
//! Runs the full pipeline (preprocess, infer, record, render) on one image,
//! prints the result text, and optionally saves the annotated frame or
//! exports the detection records.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Parser;

use beltwatch::{
    export_to_dir, load_detector, shared, BeltwatchConfig, ExportFormat, SourceKind,
    StreamController, StreamUpdate, STATUS_FAILED,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Image to scan.
    image: String,
    /// Weights reference (.onnx path or stub://detector).
    #[arg(long)]
    weights: Option<String>,
    /// Write the annotated frame here.
    #[arg(long, value_name = "PATH")]
    save: Option<PathBuf>,
    /// Export the detection records: csv, json, or report.
    #[arg(long, value_name = "FORMAT")]
    export: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let cfg = BeltwatchConfig::load()?;

    let weights = cfg.resolve_weights(args.weights.as_deref())?;
    let detector = load_detector(&weights, cfg.confidence, cfg.iou)?;

    let (mut controller, feed) = StreamController::with_feed();
    controller.set_detector(shared(detector));
    controller.set_preprocessor(cfg.preprocessor())?;

    controller.start(SourceKind::Image, &args.image)?;
    controller.wait()?;

    let mut last_result = None;
    let mut failure = None;
    for update in feed.drain() {
        match update {
            StreamUpdate::Result { text, .. } => last_result = Some(text),
            StreamUpdate::Status(message) => {
                if message.starts_with(STATUS_FAILED) {
                    failure = Some(message);
                } else {
                    log::info!("status: {message}");
                }
            }
            StreamUpdate::Frame(_) => {}
        }
    }
    if let Some(message) = failure {
        return Err(anyhow!(message));
    }

    match last_result {
        Some(text) => println!("{text}"),
        None => println!("no result produced for {}", args.image),
    }

    if let Some(path) = &args.save {
        controller.frame_cache().save_to(path)?;
        println!("annotated frame written to {}", path.display());
    }
    if let Some(format) = &args.export {
        let format = ExportFormat::from_name(format)?;
        let records = controller.records();
        let (path, count) = export_to_dir(&records, &cfg.results_dir, format)?;
        println!("{count} detections exported to {}", path.display());
    }
    Ok(())
}
