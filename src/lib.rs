//! Beltwatch streaming detection kernel.
//!
//! Conveyor-belt anchor-bolt detection, built as a pipeline of small pieces:
//!
//! - `frame`: RGB frame buffer and the shared last-frame cache
//! - `source`: frame suppliers (still image, video file, camera)
//! - `detect`: detector contract, scripted and ONNX backends
//! - `preprocess`: resize and image enhancement ahead of inference
//! - `overlay`: alarm banner drawn over rendered frames
//! - `draw`: box and label primitives
//! - `record`: detection records, cumulative counters, result text
//! - `pacer`: frame-rate governor for video and camera streams
//! - `publish`: cross-thread update feed (frames, results, statuses)
//! - `session`: stream controller and its worker state machine
//! - `export`: CSV / JSON / report writers for recorded detections
//! - `config`: file and environment configuration
//!
//! A `session::StreamController` ties the pieces together: it opens a
//! source, paces reads, runs the detector on each frame, records and renders
//! the results, and publishes everything on the update feed.

pub mod config;
pub mod detect;
pub mod draw;
pub mod export;
pub mod frame;
pub mod overlay;
pub mod pacer;
pub mod preprocess;
pub mod publish;
pub mod record;
pub mod session;
pub mod source;

pub use config::BeltwatchConfig;
pub use detect::{load_detector, shared, Detector, DetectorHandle, ScriptedDetector};
pub use export::{export_to_dir, export_to_path, ExportFormat};
pub use frame::{Frame, FrameCache};
pub use pacer::RateGovernor;
pub use preprocess::Preprocessor;
pub use publish::{Publisher, StreamUpdate, UpdateFeed};
pub use record::{Detection, RecordLog};
pub use session::{
    CancelToken, SessionState, StartError, StreamController, STATUS_CAMERA_DROPPED,
    STATUS_CAMERA_RUNNING, STATUS_CAMERA_STOPPED, STATUS_FAILED, STATUS_IMAGE_DONE,
    STATUS_IMAGE_RUNNING, STATUS_NO_DETECTOR, STATUS_SOURCE_UNAVAILABLE, STATUS_VIDEO_RUNNING,
    STATUS_VIDEO_STOPPED,
};
pub use source::{FrameSource, SourceInfo, SourceKind};
