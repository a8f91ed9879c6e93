//! Cross-thread update feed from the stream worker to the presentation side.
//!
//! The worker owns a `Publisher` and fires `StreamUpdate`s at it: rendered
//! frames, result summaries, and status lines. The presentation side drains
//! the matching `UpdateFeed` at its own pace. Sends are fire-and-forget with
//! no acknowledgement and no backpressure; payload order is the send order.

use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::frame::Frame;

/// One update crossing the worker/presentation boundary.
#[derive(Clone, Debug)]
pub enum StreamUpdate {
    /// Fresh run summary after a processed frame, with the record count so the
    /// receiver can refresh counters without re-parsing the text.
    Result { text: String, record_count: usize },
    /// Human-readable status line (session started, stopped, failed, ...).
    Status(String),
    /// Fully rendered frame, boxes and banner included.
    Frame(Frame),
}

/// New connected publisher/feed pair.
pub fn feed() -> (Publisher, UpdateFeed) {
    let (tx, rx) = unbounded();
    (Publisher { tx }, UpdateFeed { rx })
}

/// Sending half. Cheap to clone; clones share the same feed.
#[derive(Clone)]
pub struct Publisher {
    tx: Sender<StreamUpdate>,
}

impl Publisher {
    pub fn result(&self, text: String, record_count: usize) {
        self.send(StreamUpdate::Result { text, record_count });
    }

    pub fn status(&self, message: impl Into<String>) {
        self.send(StreamUpdate::Status(message.into()));
    }

    pub fn frame(&self, frame: Frame) {
        self.send(StreamUpdate::Frame(frame));
    }

    fn send(&self, update: StreamUpdate) {
        // A closed feed means the presentation side is gone; the worker keeps
        // running and the payload is dropped.
        if self.tx.send(update).is_err() {
            log::debug!("Publisher: update feed closed, dropping payload");
        }
    }
}

/// Receiving half, held by the presentation thread.
pub struct UpdateFeed {
    rx: Receiver<StreamUpdate>,
}

impl UpdateFeed {
    /// Next pending update without blocking.
    pub fn try_next(&self) -> Option<StreamUpdate> {
        self.rx.try_recv().ok()
    }

    /// Next update, waiting up to `timeout`.
    pub fn next_timeout(&self, timeout: Duration) -> Option<StreamUpdate> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Everything currently queued, in send order.
    pub fn drain(&self) -> Vec<StreamUpdate> {
        self.rx.try_iter().collect()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
