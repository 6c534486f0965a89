// SPDX-License-Identifier: GPL-3.0-only

//! Display sink boundary
//!
//! The pipeline hands each completed frame to a [`DisplaySink`] as mapped
//! plane views plus geometry. Rendering, color conversion and widget
//! plumbing live behind this trait.

use crate::device::types::PixelFormat;
use crate::stats::CaptureStats;

/// Flow control returned from the sink's event poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkControl {
    /// Keep capturing
    Continue,
    /// End the session (e.g. window closed)
    Quit,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEndReason {
    /// The sink requested quit
    Quit,
    /// A shutdown handle cancelled the consumer wait
    Shutdown,
    /// A fatal pipeline error
    Error,
}

/// One completed frame, borrowed from the session's mapped buffers
///
/// The views are only valid for the duration of the
/// [`frame_ready`](DisplaySink::frame_ready) call; the buffer goes back to
/// the device right after.
pub struct FrameView<'a> {
    planes: Vec<&'a [u8]>,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    /// Bytes per row of the first plane
    pub stride: u32,
    /// Monotonic frame sequence number within the session
    pub sequence: u64,
}

impl<'a> FrameView<'a> {
    pub(crate) fn new(
        planes: Vec<&'a [u8]>,
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
        stride: u32,
        sequence: u64,
    ) -> Self {
        Self {
            planes,
            width,
            height,
            pixel_format,
            stride,
            sequence,
        }
    }

    pub fn num_planes(&self) -> usize {
        self.planes.len()
    }

    pub fn plane(&self, index: usize) -> Option<&[u8]> {
        self.planes.get(index).copied()
    }

    pub fn planes(&self) -> &[&'a [u8]] {
        &self.planes
    }
}

impl std::fmt::Debug for FrameView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameView")
            .field("planes", &self.planes.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pixel_format", &self.pixel_format)
            .field("stride", &self.stride)
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Consumer of captured frames, cooperating with the capture loop
pub trait DisplaySink {
    /// Drain pending UI events without blocking
    ///
    /// Called once per loop iteration before the pipeline parks on the next
    /// completion. Return [`SinkControl::Quit`] to end the session.
    fn poll_events(&mut self) -> SinkControl;

    /// Render one completed frame
    fn frame_ready(&mut self, frame: FrameView<'_>);

    /// The session ended; no further frames will arrive
    fn session_ended(&mut self, _reason: SessionEndReason, _stats: &CaptureStats) {}
}
