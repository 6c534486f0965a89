// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for the capture subsystem boundary

use serde::{Deserialize, Serialize};
use std::fmt;
use std::os::fd::OwnedFd;
use std::sync::Arc;

/// Identity of an enumerated capture device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Stable identifier used to acquire the device
    pub id: String,
    /// Human-readable model name
    pub model: String,
}

/// Role requested for the configured stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StreamRole {
    /// Low-latency preview stream
    #[default]
    Viewfinder,
    /// Stream tuned for video encoding
    VideoRecording,
    /// Full-resolution still capture
    StillCapture,
    /// Unprocessed sensor data
    Raw,
}

impl fmt::Display for StreamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamRole::Viewfinder => write!(f, "viewfinder"),
            StreamRole::VideoRecording => write!(f, "video-recording"),
            StreamRole::StillCapture => write!(f, "still-capture"),
            StreamRole::Raw => write!(f, "raw"),
        }
    }
}

/// Pixel format of a configured stream
///
/// Conversion to a displayable representation is the sink's concern; the
/// pipeline only carries the format alongside the mapped planes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PixelFormat {
    /// Packed 24-bit RGB
    #[default]
    Rgb888,
    /// Packed 24-bit BGR
    Bgr888,
    /// Packed 32-bit RGB with padding byte
    Xrgb8888,
    /// Packed 4:2:2 YUV
    Yuyv,
    /// Semi-planar 4:2:0 YUV (Y plane + interleaved UV)
    Nv12,
    /// Planar 4:2:0 YUV
    I420,
}

impl PixelFormat {
    /// Bytes per pixel for packed formats, `None` for planar/subsampled ones
    pub fn bytes_per_pixel(&self) -> Option<u32> {
        match self {
            PixelFormat::Rgb888 | PixelFormat::Bgr888 => Some(3),
            PixelFormat::Xrgb8888 => Some(4),
            PixelFormat::Yuyv => Some(2),
            PixelFormat::Nv12 | PixelFormat::I420 => None,
        }
    }

    /// Number of memory planes the format is normally delivered in
    pub fn plane_count(&self) -> usize {
        match self {
            PixelFormat::Nv12 => 2,
            PixelFormat::I420 => 3,
            _ => 1,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelFormat::Rgb888 => write!(f, "RGB888"),
            PixelFormat::Bgr888 => write!(f, "BGR888"),
            PixelFormat::Xrgb8888 => write!(f, "XRGB8888"),
            PixelFormat::Yuyv => write!(f, "YUYV"),
            PixelFormat::Nv12 => write!(f, "NV12"),
            PixelFormat::I420 => write!(f, "I420"),
        }
    }
}

/// Stream geometry read back after the device accepted a configuration
///
/// The device may adjust size and stride beyond what was requested; consumers
/// must use these values, never the requested ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    /// Bytes per row of the first plane
    pub stride: u32,
}

/// One contiguous memory region of a frame buffer
///
/// Planes reference a backing handle at an offset; several planes of the same
/// buffer may share one handle.
#[derive(Debug, Clone)]
pub struct FramePlane {
    /// Backing memory handle, shared between planes that live in it
    pub handle: Arc<OwnedFd>,
    /// Byte offset of the plane inside the handle
    pub offset: usize,
    /// Length of the plane in bytes
    pub length: usize,
}

/// Descriptor of one frame buffer allocated by the capture subsystem
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    planes: Vec<FramePlane>,
}

impl FrameBuffer {
    pub fn new(planes: Vec<FramePlane>) -> Self {
        Self { planes }
    }

    pub fn planes(&self) -> &[FramePlane] {
        &self.planes
    }
}

/// Completion status reported by the device for a finished request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// The buffer contains a valid captured frame
    Success,
    /// The device reported an error for this frame
    Error,
    /// The request was cancelled (e.g. by stopping the device)
    Cancelled,
}

impl FrameStatus {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            FrameStatus::Success => 0,
            FrameStatus::Error => 1,
            FrameStatus::Cancelled => 2,
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => FrameStatus::Error,
            2 => FrameStatus::Cancelled,
            _ => FrameStatus::Success,
        }
    }
}

/// Identifier of one capture request
///
/// Requests are bound one-to-one to buffers at session start, so the id
/// doubles as the buffer index: frame lookup on the consume path is always
/// `buffers[id.index()]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(usize);

impl RequestId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Index of the request's slot, and of its bound buffer
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request#{}", self.0)
    }
}

/// Identifier of a per-request control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControlId(pub u32);

/// Well-known control identifiers
pub mod controls {
    use super::ControlId;

    pub const BRIGHTNESS: ControlId = ControlId(1);
    pub const CONTRAST: ControlId = ControlId(2);
    pub const EXPOSURE_TIME: ControlId = ControlId(3);
    pub const ANALOGUE_GAIN: ControlId = ControlId(4);
}

/// Ordered set of controls attached to submitted requests
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlList {
    entries: Vec<(ControlId, f32)>,
}

impl ControlList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a control value, replacing any previous value for the same id
    pub fn set(&mut self, id: ControlId, value: f32) {
        match self.entries.iter_mut().find(|(cid, _)| *cid == id) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((id, value)),
        }
    }

    pub fn get(&self, id: ControlId) -> Option<f32> {
        self.entries
            .iter()
            .find(|(cid, _)| *cid == id)
            .map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ControlId, f32)> + '_ {
        self.entries.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
