//! Stream session control: one detection worker at a time.
//!
//! `StreamController` owns the shared pipeline pieces (detector handle,
//! preprocessor, record log, frame cache) and drives the session state
//! machine. `start` opens the source, checks readiness, and hands everything
//! to a worker thread; `stop` flips the cancellation token and joins. Both run
//! on the caller's thread, so sessions never overlap: a `start` while
//! streaming stops the previous session first.
//!
//! The worker publishes every user-visible artifact through the update feed:
//! rendered frames, result text, and status lines. When the feed's consumer
//! is gone the publisher drops payloads and the worker keeps going, so a
//! session can also run headless to completion.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Result};

use crate::detect::DetectorHandle;
use crate::frame::{Frame, FrameCache};
use crate::overlay;
use crate::pacer::RateGovernor;
use crate::preprocess::Preprocessor;
use crate::publish::{self, Publisher, UpdateFeed};
use crate::record::RecordLog;
use crate::source::{self, FrameSource, SourceKind};

/// Camera pacing applied when nothing better is configured.
const DEFAULT_CAMERA_FPS: f64 = 30.0;

// Status payloads published on the update feed. Stable strings: front-ends
// and tests match on them.
pub const STATUS_NO_DETECTOR: &str = "no detector loaded";
pub const STATUS_SOURCE_UNAVAILABLE: &str = "source unavailable";
pub const STATUS_IMAGE_RUNNING: &str = "image detection running";
pub const STATUS_IMAGE_DONE: &str = "image detection complete";
pub const STATUS_VIDEO_RUNNING: &str = "video detection running";
pub const STATUS_VIDEO_STOPPED: &str = "video detection stopped";
pub const STATUS_CAMERA_RUNNING: &str = "camera detection running";
pub const STATUS_CAMERA_STOPPED: &str = "camera detection stopped";
pub const STATUS_CAMERA_DROPPED: &str = "camera device dropped";
pub const STATUS_FAILED: &str = "detection failed";

// ----------------------------------------------------------------------------
// Cancellation
// ----------------------------------------------------------------------------

/// Shared stop flag between controller and worker. Cancel is one-way; a new
/// session gets a fresh token.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ----------------------------------------------------------------------------
// States and start errors
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// Source being opened and worker being spawned. Start runs on the
    /// caller's thread, so this state is only observable from inside it.
    Starting,
    Running,
    /// Cancellation requested, worker not yet joined.
    Stopping,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Why `start` refused. Either way nothing was started and the controller
/// stays idle.
#[derive(Debug)]
pub enum StartError {
    /// No detector loaded.
    NotReady,
    /// The source could not be opened.
    SourceUnavailable {
        source: String,
        cause: anyhow::Error,
    },
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartError::NotReady => f.write_str(STATUS_NO_DETECTOR),
            StartError::SourceUnavailable { source, .. } => {
                write!(f, "{STATUS_SOURCE_UNAVAILABLE}: {source}")
            }
        }
    }
}

impl std::error::Error for StartError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StartError::NotReady => None,
            StartError::SourceUnavailable { cause, .. } => Some(cause.as_ref()),
        }
    }
}

// ----------------------------------------------------------------------------
// Controller
// ----------------------------------------------------------------------------

struct SessionHandle {
    kind: SourceKind,
    cancel: CancelToken,
    join: JoinHandle<()>,
}

pub struct StreamController {
    detector: Option<DetectorHandle>,
    preprocess: Arc<Mutex<Preprocessor>>,
    records: Arc<RecordLog>,
    cache: Arc<FrameCache>,
    publisher: Publisher,
    camera_fps: f64,
    session: Option<SessionHandle>,
}

impl StreamController {
    pub fn new(publisher: Publisher) -> Self {
        Self {
            detector: None,
            preprocess: Arc::new(Mutex::new(Preprocessor::new())),
            records: Arc::new(RecordLog::new()),
            cache: Arc::new(FrameCache::new()),
            publisher,
            camera_fps: DEFAULT_CAMERA_FPS,
            session: None,
        }
    }

    /// Controller plus the feed its updates arrive on.
    pub fn with_feed() -> (Self, UpdateFeed) {
        let (publisher, feed) = publish::feed();
        (Self::new(publisher), feed)
    }

    pub fn set_detector(&mut self, detector: DetectorHandle) {
        self.detector = Some(detector);
    }

    pub fn detector(&self) -> Option<DetectorHandle> {
        self.detector.clone()
    }

    pub fn records(&self) -> Arc<RecordLog> {
        Arc::clone(&self.records)
    }

    pub fn frame_cache(&self) -> Arc<FrameCache> {
        Arc::clone(&self.cache)
    }

    pub fn preprocessor(&self) -> Arc<Mutex<Preprocessor>> {
        Arc::clone(&self.preprocess)
    }

    /// Replace the preprocessing settings. Takes effect on the next frame,
    /// mid-stream included.
    pub fn set_preprocessor(&self, preprocess: Preprocessor) -> Result<()> {
        *lock(&self.preprocess)? = preprocess;
        Ok(())
    }

    pub fn set_camera_fps(&mut self, fps: f64) {
        self.camera_fps = fps.max(0.0);
    }

    /// Adjust the detector's confidence threshold. No-op while no detector is
    /// loaded.
    pub fn set_confidence(&self, threshold: f32) -> Result<()> {
        if let Some(detector) = &self.detector {
            lock(detector)?.set_confidence(threshold);
        }
        Ok(())
    }

    pub fn set_iou(&self, threshold: f32) -> Result<()> {
        if let Some(detector) = &self.detector {
            lock(detector)?.set_iou(threshold);
        }
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        match &self.session {
            None => SessionState::Idle,
            Some(session) if session.join.is_finished() => SessionState::Idle,
            Some(session) if session.cancel.is_canceled() => SessionState::Stopping,
            Some(_) => SessionState::Running,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() != SessionState::Idle
    }

    /// Open `source` as `kind` and start streaming on a worker thread.
    ///
    /// Refuses with `NotReady` when no detector is loaded and with
    /// `SourceUnavailable` when the source cannot be opened; both leave the
    /// controller idle and put a status on the feed. A session already
    /// streaming is stopped first, so its final status lands on the feed
    /// before the new session's.
    pub fn start(&mut self, kind: SourceKind, source: &str) -> Result<(), StartError> {
        let Some(detector) = self.detector.clone() else {
            self.publisher.status(STATUS_NO_DETECTOR);
            return Err(StartError::NotReady);
        };

        if let Err(err) = self.stop() {
            log::warn!("Session: previous worker ended badly: {err:#}");
        }

        let src = match source::open(kind, source) {
            Ok(src) => src,
            Err(cause) => {
                self.publisher
                    .status(format!("{STATUS_SOURCE_UNAVAILABLE}: {source}"));
                return Err(StartError::SourceUnavailable {
                    source: source.to_string(),
                    cause,
                });
            }
        };

        let governor = match kind {
            SourceKind::Image => {
                self.publisher.status(STATUS_IMAGE_RUNNING);
                None
            }
            SourceKind::Video => {
                let fps = src
                    .info()
                    .map(|info| info.fps)
                    .filter(|fps| *fps > 0.0)
                    .unwrap_or(self.camera_fps);
                self.publisher.status(STATUS_VIDEO_RUNNING);
                if let Some(info) = src.info() {
                    self.publisher.status(info.describe());
                }
                Some(RateGovernor::new(fps))
            }
            SourceKind::Camera => {
                self.publisher.status(STATUS_CAMERA_RUNNING);
                Some(RateGovernor::new(self.camera_fps))
            }
        };

        let cancel = CancelToken::new();
        let worker = Worker {
            kind,
            source: src,
            detector,
            preprocess: Arc::clone(&self.preprocess),
            records: Arc::clone(&self.records),
            cache: Arc::clone(&self.cache),
            publisher: self.publisher.clone(),
            governor,
            cancel: cancel.clone(),
        };
        let join = thread::spawn(move || worker.run());
        self.session = Some(SessionHandle { kind, cancel, join });
        log::info!("Session: {kind} stream started from '{source}'");
        Ok(())
    }

    /// Request cancellation and wait for the worker to exit. Idle is a no-op.
    /// Errs only when the worker panicked.
    pub fn stop(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        session.cancel.cancel();
        session
            .join
            .join()
            .map_err(|_| anyhow!("stream worker thread panicked"))?;
        log::info!("Session: {} stream stopped", session.kind);
        Ok(())
    }

    /// Wait for the session to end on its own, without canceling. Used for
    /// finite sources (image, video file) that should play out fully.
    pub fn wait(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        session
            .join
            .join()
            .map_err(|_| anyhow!("stream worker thread panicked"))?;
        log::info!("Session: {} stream finished", session.kind);
        Ok(())
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::warn!("Session: worker ended badly during drop: {err:#}");
        }
    }
}

// ----------------------------------------------------------------------------
// Worker
// ----------------------------------------------------------------------------

#[derive(Clone, Copy)]
enum StopReason {
    Canceled,
    Exhausted,
    Dropped,
}

struct Worker {
    kind: SourceKind,
    source: Box<dyn FrameSource>,
    detector: DetectorHandle,
    preprocess: Arc<Mutex<Preprocessor>>,
    records: Arc<RecordLog>,
    cache: Arc<FrameCache>,
    publisher: Publisher,
    governor: Option<RateGovernor>,
    cancel: CancelToken,
}

impl Worker {
    fn run(mut self) {
        let outcome = self.stream();
        self.source.release();
        match outcome {
            Ok(reason) => self.publisher.status(stop_status(self.kind, reason)),
            Err(err) => {
                log::error!("Session: stream worker failed: {err:#}");
                self.publisher.status(format!("{STATUS_FAILED}: {err:#}"));
            }
        }
    }

    fn stream(&mut self) -> Result<StopReason> {
        let mut frame_id: u64 = 0;
        loop {
            if self.cancel.is_canceled() {
                return Ok(StopReason::Canceled);
            }
            if let Some(governor) = self.governor.as_mut() {
                governor.wait_if_needed();
            }
            let frame = match self.source.read() {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(StopReason::Exhausted),
                Err(err) => {
                    log::warn!("Session: {} source dropped: {err:#}", self.kind);
                    return Ok(StopReason::Dropped);
                }
            };
            self.process_frame(frame, frame_id)?;
            frame_id += 1;
        }
    }

    fn process_frame(&mut self, frame: Frame, frame_id: u64) -> Result<()> {
        let mut frame = lock(&self.preprocess)?.process(frame);
        let batch = lock(&self.detector)?.infer(&frame)?;
        self.records.record(&batch, frame_id)?;
        lock(&self.detector)?.render(&mut frame, &batch);
        overlay::apply_alarm_banner(&mut frame, &batch);
        let text = self.records.result_text(&batch)?;
        let record_count = self.records.len()?;
        self.cache.store(&frame)?;
        self.publisher.frame(frame);
        self.publisher.result(text, record_count);
        Ok(())
    }
}

fn stop_status(kind: SourceKind, reason: StopReason) -> &'static str {
    match (kind, reason) {
        (SourceKind::Image, _) => STATUS_IMAGE_DONE,
        (SourceKind::Video, _) => STATUS_VIDEO_STOPPED,
        (SourceKind::Camera, StopReason::Canceled) => STATUS_CAMERA_STOPPED,
        (SourceKind::Camera, _) => STATUS_CAMERA_DROPPED,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| anyhow!("stream lock poisoned"))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{shared, ScriptedDetector};
    use crate::publish::StreamUpdate;

    fn controller_with_detector() -> (StreamController, UpdateFeed) {
        let (mut controller, feed) = StreamController::with_feed();
        controller.set_detector(shared(Box::new(ScriptedDetector::new())));
        (controller, feed)
    }

    fn statuses(feed: &UpdateFeed) -> Vec<String> {
        feed.drain()
            .into_iter()
            .filter_map(|update| match update {
                StreamUpdate::Status(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn fresh_controller_is_idle() {
        let (controller, _feed) = StreamController::with_feed();
        assert_eq!(controller.state(), SessionState::Idle);
        assert!(!controller.is_running());
    }

    #[test]
    fn start_without_detector_refuses() {
        let (mut controller, feed) = StreamController::with_feed();
        let err = controller.start(SourceKind::Image, "stub://still").unwrap_err();
        assert!(matches!(err, StartError::NotReady));
        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(statuses(&feed), vec![STATUS_NO_DETECTOR.to_string()]);
    }

    #[test]
    fn start_with_unopenable_source_refuses() {
        let (mut controller, feed) = controller_with_detector();
        let err = controller
            .start(SourceKind::Image, "/no/such/image.jpg")
            .unwrap_err();
        assert!(matches!(err, StartError::SourceUnavailable { .. }));
        assert_eq!(controller.state(), SessionState::Idle);

        let published = statuses(&feed);
        assert_eq!(published.len(), 1);
        assert!(published[0].starts_with(STATUS_SOURCE_UNAVAILABLE));
    }

    #[test]
    fn source_unavailable_keeps_the_cause_chained() {
        let (mut controller, _feed) = controller_with_detector();
        let err = controller
            .start(SourceKind::Image, "/no/such/image.jpg")
            .unwrap_err();
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn stop_while_idle_is_a_no_op() {
        let (mut controller, _feed) = StreamController::with_feed();
        assert!(controller.stop().is_ok());
        assert!(controller.stop().is_ok());
    }

    #[test]
    fn cancel_token_is_one_way() {
        let token = CancelToken::new();
        assert!(!token.is_canceled());
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_canceled());
    }

    #[test]
    fn threshold_setters_without_detector_are_no_ops() {
        let (controller, _feed) = StreamController::with_feed();
        assert!(controller.set_confidence(0.9).is_ok());
        assert!(controller.set_iou(0.9).is_ok());
    }

    #[test]
    fn stop_statuses_follow_kind_and_reason() {
        assert_eq!(
            stop_status(SourceKind::Image, StopReason::Exhausted),
            STATUS_IMAGE_DONE
        );
        assert_eq!(
            stop_status(SourceKind::Video, StopReason::Canceled),
            STATUS_VIDEO_STOPPED
        );
        assert_eq!(
            stop_status(SourceKind::Camera, StopReason::Canceled),
            STATUS_CAMERA_STOPPED
        );
        assert_eq!(
            stop_status(SourceKind::Camera, StopReason::Dropped),
            STATUS_CAMERA_DROPPED
        );
    }
}
