// SPDX-License-Identifier: GPL-3.0-only

use crate::device::types::{PixelFormat, StreamRole};
use crate::errors::{SessionError, SessionResult};
use serde::{Deserialize, Serialize};

/// Capture configuration requested for a session
///
/// The device is free to adjust size and stride; the geometry it actually
/// applies is reported back as a
/// [`StreamConfig`](crate::device::types::StreamConfig).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Requested frame width in pixels
    pub width: u32,
    /// Requested frame height in pixels
    pub height: u32,
    /// Requested pixel format
    pub pixel_format: PixelFormat,
    /// Stream role to configure
    pub role: StreamRole,
    /// Number of frame buffers to request from the device
    pub buffer_count: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            pixel_format: PixelFormat::Rgb888,
            role: StreamRole::Viewfinder,
            buffer_count: 4,
        }
    }
}

impl CaptureConfig {
    /// Validate the configuration before handing it to a device
    pub fn validate(&self) -> SessionResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(SessionError::Configuration(format!(
                "frame size {}x{} is invalid",
                self.width, self.height
            )));
        }
        if self.buffer_count == 0 {
            return Err(SessionError::Configuration(
                "buffer count must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
