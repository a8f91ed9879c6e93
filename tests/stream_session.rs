use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use beltwatch::{
    shared, Detection, ScriptedDetector, SessionState, SourceKind, StreamController, StreamUpdate,
    UpdateFeed, STATUS_CAMERA_DROPPED, STATUS_CAMERA_RUNNING, STATUS_CAMERA_STOPPED,
    STATUS_FAILED, STATUS_IMAGE_DONE, STATUS_IMAGE_RUNNING, STATUS_VIDEO_RUNNING,
    STATUS_VIDEO_STOPPED,
};

fn scripted_controller() -> (StreamController, UpdateFeed) {
    let (mut controller, feed) = StreamController::with_feed();
    controller.set_detector(shared(Box::new(ScriptedDetector::new())));
    (controller, feed)
}

fn status_lines(updates: &[StreamUpdate]) -> Vec<&str> {
    updates
        .iter()
        .filter_map(|update| match update {
            StreamUpdate::Status(message) => Some(message.as_str()),
            _ => None,
        })
        .collect()
}

#[test]
fn video_stream_plays_out_and_records_every_frame() -> Result<()> {
    let (mut controller, feed) = scripted_controller();

    let started = Instant::now();
    controller.start(SourceKind::Video, "stub://clip?frames=3&fps=25")?;
    controller.wait()?;

    // Three frames at 25 fps mean two paced gaps of 40 ms each.
    assert!(started.elapsed() >= Duration::from_millis(80));
    assert_eq!(controller.records().len()?, 3);

    let updates = feed.drain();
    let statuses = status_lines(&updates);
    assert_eq!(statuses.first().copied(), Some(STATUS_VIDEO_RUNNING));
    assert_eq!(statuses.last().copied(), Some(STATUS_VIDEO_STOPPED));
    assert!(statuses.iter().any(|line| line.contains("25.0 fps")));
    Ok(())
}

#[test]
fn camera_stream_runs_until_stopped() -> Result<()> {
    let (mut controller, feed) = scripted_controller();

    controller.start(SourceKind::Camera, "stub://camera")?;
    thread::sleep(Duration::from_millis(80));
    assert!(controller.is_running());

    controller.stop()?;
    assert_eq!(controller.state(), SessionState::Idle);
    assert!(controller.records().len()? >= 1);

    let statuses: Vec<String> = status_lines(&feed.drain())
        .into_iter()
        .map(str::to_string)
        .collect();
    assert_eq!(statuses.first().map(String::as_str), Some(STATUS_CAMERA_RUNNING));
    assert_eq!(statuses.last().map(String::as_str), Some(STATUS_CAMERA_STOPPED));
    Ok(())
}

#[test]
fn dropped_camera_ends_the_session_on_its_own() -> Result<()> {
    let (mut controller, feed) = scripted_controller();
    controller.set_camera_fps(120.0);

    controller.start(SourceKind::Camera, "stub://camera?drop_after=2")?;
    controller.wait()?;

    assert_eq!(controller.state(), SessionState::Idle);
    assert_eq!(controller.records().len()?, 2);

    let updates = feed.drain();
    let statuses = status_lines(&updates);
    assert_eq!(statuses.last().copied(), Some(STATUS_CAMERA_DROPPED));
    Ok(())
}

#[test]
fn detector_failure_stops_the_stream_with_a_failed_status() -> Result<()> {
    let (mut controller, feed) = StreamController::with_feed();
    let detector = ScriptedDetector::new().with_failure_after(1);
    controller.set_detector(shared(Box::new(detector)));

    controller.start(SourceKind::Video, "stub://clip?frames=10&fps=200")?;
    controller.wait()?;

    // The first frame lands before the detector gives out.
    assert_eq!(controller.records().len()?, 1);

    let updates = feed.drain();
    let statuses = status_lines(&updates);
    let last = statuses.last().copied().unwrap_or_default();
    assert!(last.starts_with(STATUS_FAILED), "got status {last:?}");
    assert!(last.contains("scripted detector"));
    Ok(())
}

#[test]
fn image_scan_is_a_one_shot_session() -> Result<()> {
    let (mut controller, feed) = scripted_controller();

    controller.start(SourceKind::Image, "stub://still")?;
    controller.wait()?;

    assert_eq!(controller.state(), SessionState::Idle);
    assert_eq!(controller.records().len()?, 1);

    let updates = feed.drain();
    let statuses = status_lines(&updates);
    assert_eq!(statuses.first().copied(), Some(STATUS_IMAGE_RUNNING));
    assert_eq!(statuses.last().copied(), Some(STATUS_IMAGE_DONE));

    let results: Vec<_> = updates
        .iter()
        .filter_map(|update| match update {
            StreamUpdate::Result { text, record_count } => Some((text.as_str(), *record_count)),
            _ => None,
        })
        .collect();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].1, 1);
    assert!(results[0].0.contains("bolt"));

    let frames: Vec<_> = updates
        .iter()
        .filter(|update| matches!(update, StreamUpdate::Frame(_)))
        .collect();
    assert_eq!(frames.len(), 1);

    let snapshot = controller.frame_cache().snapshot()?.expect("cached frame");
    assert_eq!((snapshot.width(), snapshot.height()), (640, 480));
    Ok(())
}

#[test]
fn restart_stops_the_previous_session_first() -> Result<()> {
    let (mut controller, feed) = scripted_controller();

    controller.start(SourceKind::Camera, "stub://camera")?;
    thread::sleep(Duration::from_millis(40));
    controller.start(SourceKind::Video, "stub://clip?frames=2&fps=100")?;
    controller.wait()?;

    let updates = feed.drain();
    let statuses = status_lines(&updates);
    let camera_stopped = statuses
        .iter()
        .position(|line| *line == STATUS_CAMERA_STOPPED)
        .expect("camera stop status");
    let video_running = statuses
        .iter()
        .position(|line| *line == STATUS_VIDEO_RUNNING)
        .expect("video start status");
    assert!(camera_stopped < video_running);
    assert_eq!(statuses.last().copied(), Some(STATUS_VIDEO_STOPPED));
    Ok(())
}

#[test]
fn empty_batches_are_streamed_but_never_recorded() -> Result<()> {
    let (mut controller, feed) = StreamController::with_feed();
    let detector = ScriptedDetector::with_script(vec![
        vec![Detection::new("bolt", 0.88, (10, 10, 60, 60))],
        vec![],
    ]);
    controller.set_detector(shared(Box::new(detector)));

    controller.start(SourceKind::Video, "stub://clip?frames=4&fps=200")?;
    controller.wait()?;

    // The script alternates hit/miss, so four frames leave two records.
    assert_eq!(controller.records().len()?, 2);

    let updates = feed.drain();
    let result_counts: Vec<usize> = updates
        .iter()
        .filter_map(|update| match update {
            StreamUpdate::Result { record_count, .. } => Some(*record_count),
            _ => None,
        })
        .collect();
    assert_eq!(result_counts.len(), 4);
    assert_eq!(result_counts.last().copied(), Some(2));
    Ok(())
}
