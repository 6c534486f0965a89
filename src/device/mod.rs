// SPDX-License-Identifier: GPL-3.0-only

//! Capture subsystem abstraction
//!
//! The pipeline never talks to camera hardware directly; it drives these
//! traits. A concrete implementation wraps the platform capture stack, the
//! test suite provides an in-process fake.

pub mod types;

pub use types::*;

use crate::config::CaptureConfig;
use crate::errors::{SessionError, SessionResult};

/// Callback invoked by the device when a submitted request completes
///
/// The device may call this from its own internal thread, concurrently with
/// consumer work. Implementations registered by the pipeline do the minimal
/// possible work: record the completion and wake the consumer. They never
/// block on I/O or rendering.
pub type CompletionHandler = Box<dyn Fn(RequestId, FrameStatus) + Send + Sync + 'static>;

/// Entry point of the external capture subsystem
pub trait CaptureSubsystem {
    type Device: CaptureDevice;

    /// Enumerate the devices currently available
    fn enumerate(&mut self) -> Vec<DeviceInfo>;

    /// Acquire exclusive access to a device by id
    ///
    /// # Returns
    /// * `Ok(Device)` - Exclusive handle; must be released via
    ///   [`CaptureDevice::release`]
    /// * `Err(SessionError::Device)` - Device missing or busy
    fn acquire(&mut self, id: &str) -> SessionResult<Self::Device>;
}

/// An acquired capture device
///
/// Call order over a session: `configure`, `allocate_buffers`,
/// `create_request` per buffer, `set_completion_handler`, `start`, `queue`
/// per request, then `stop` and `release`. The device owns buffer memory
/// between `queue` and the completion callback; after completion the buffer
/// is exclusively the consumer's until the request is queued again.
pub trait CaptureDevice: Send {
    /// Configure a single stream for the requested role, size and format
    ///
    /// # Returns
    /// * `Ok(StreamConfig)` - The geometry the device actually settled on,
    ///   which may differ from the request
    /// * `Err(SessionError::Configuration)` - The request cannot be satisfied
    fn configure(&mut self, config: &CaptureConfig) -> SessionResult<StreamConfig>;

    /// Allocate the frame buffers for the configured stream
    ///
    /// The returned set is fixed for the session; it never grows or shrinks.
    fn allocate_buffers(&mut self) -> SessionResult<Vec<FrameBuffer>>;

    /// Create the device-side request `id` and bind `buffer` to it
    fn create_request(&mut self, id: RequestId, buffer: &FrameBuffer) -> SessionResult<()>;

    /// Register the completion callback
    ///
    /// Must be called before `start`; the device invokes the handler once per
    /// completed request, in completion order.
    fn set_completion_handler(&mut self, handler: CompletionHandler);

    /// Start capturing
    fn start(&mut self) -> SessionResult<()>;

    /// Submit a request to the device
    ///
    /// The device writes the next frame into the request's buffer and then
    /// reports completion through the registered handler.
    fn queue(&mut self, id: RequestId, controls: &ControlList) -> SessionResult<()>;

    /// Stop capturing
    ///
    /// In-flight requests are cancelled; the device stops writing to buffer
    /// memory before this returns. Safe to call when not started.
    fn stop(&mut self);

    /// Release the device
    ///
    /// Safe to call more than once; the handle is unusable afterwards.
    fn release(&mut self);
}

/// Acquire the first enumerated device
pub fn first_device<S: CaptureSubsystem>(subsystem: &mut S) -> SessionResult<S::Device> {
    let devices = subsystem.enumerate();
    let first = devices
        .first()
        .ok_or_else(|| SessionError::Device("no capture devices available".into()))?;
    subsystem.acquire(&first.id)
}
