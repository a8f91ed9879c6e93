//! Frame pacing between source pulls.
//!
//! `RateGovernor` keeps a stream near its target rate by sleeping out the
//! remainder of each frame interval. Cameras pace at the configured rate;
//! video playback paces at the rate the container reports, so a 25 fps clip
//! plays back in real time instead of as fast as decode allows.

use std::time::{Duration, Instant};

/// Sleep-based pacer. Call `wait_if_needed` once per processed frame.
#[derive(Debug)]
pub struct RateGovernor {
    interval: Duration,
    last: Option<Instant>,
}

impl RateGovernor {
    /// Governor targeting `fps` frames per second. Zero or negative disables
    /// pacing entirely.
    pub fn new(fps: f64) -> Self {
        let mut governor = Self {
            interval: Duration::ZERO,
            last: None,
        };
        governor.set_fps(fps);
        governor
    }

    /// Target interval currently in force. Zero means pacing is disabled.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Change the target rate. The last-frame mark is reset, so the next call
    /// to `wait_if_needed` never sleeps against a stale interval.
    pub fn set_fps(&mut self, fps: f64) {
        self.interval = if fps > 0.0 {
            Duration::from_secs_f64(1.0 / fps)
        } else {
            Duration::ZERO
        };
        self.last = None;
    }

    /// Block until a full interval has passed since the previous call, then
    /// record a fresh mark. The first call after construction or `set_fps`
    /// returns immediately.
    pub fn wait_if_needed(&mut self) {
        if self.interval.is_zero() {
            return;
        }
        if let Some(last) = self.last {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                std::thread::sleep(self.interval - elapsed);
            }
        }
        self.last = Some(Instant::now());
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
