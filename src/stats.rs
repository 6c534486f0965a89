// SPDX-License-Identifier: GPL-3.0-only

//! Per-session capture statistics

use std::time::{Duration, Instant};

/// Frame counters for one capture session
#[derive(Debug, Clone, Default)]
pub struct CaptureStats {
    frames_displayed: u64,
    frames_dropped: u64,
    started_at: Option<Instant>,
    stopped_at: Option<Instant>,
}

impl CaptureStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn mark_started(&mut self) {
        self.started_at = Some(Instant::now());
    }

    pub(crate) fn mark_stopped(&mut self) {
        if self.stopped_at.is_none() {
            self.stopped_at = Some(Instant::now());
        }
    }

    pub(crate) fn record_displayed(&mut self) {
        self.frames_displayed += 1;
    }

    pub(crate) fn record_dropped(&mut self) {
        self.frames_dropped += 1;
    }

    /// Frames handed to the display sink
    pub fn frames_displayed(&self) -> u64 {
        self.frames_displayed
    }

    /// Completed requests discarded for a non-success status
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    /// Time spent capturing so far, zero before capture started
    pub fn elapsed(&self) -> Duration {
        match (self.started_at, self.stopped_at) {
            (Some(start), Some(stop)) => stop.duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }

    /// Average displayed frame rate over the session
    pub fn fps(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.frames_displayed as f64 / secs
        } else {
            0.0
        }
    }
}
