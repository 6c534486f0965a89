// SPDX-License-Identifier: GPL-3.0-only

//! viewfinder - frame buffer lifecycle and capture/display pipeline
//!
//! This library coordinates a hardware capture device with a display sink
//! over a fixed, non-growable pool of shared-memory frame buffers: it maps
//! the buffers an external capture subsystem allocates, binds each one to a
//! capture request, hands completed requests from the device's completion
//! callback to the render loop, and requeues every consumed request so the
//! device is continuously fed.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`device`]: Traits and types at the capture subsystem boundary
//! - [`buffers`]: Plane memory mapping and the request pool state machine
//! - [`pipeline`]: The session orchestrator and the completion channel
//! - [`display`]: The display sink boundary
//! - [`config`]: Capture configuration
//! - [`stats`]: Per-session frame counters
//!
//! # Example
//!
//! ```ignore
//! let mut session = Session::open(&mut subsystem, &device_id, &CaptureConfig::default())?;
//! session.start_capture()?;
//! session.run(&mut sink)?;
//! ```

pub mod buffers;
pub mod config;
pub mod device;
pub mod display;
pub mod errors;
pub mod pipeline;
pub mod stats;

// Re-export commonly used types
pub use buffers::{BufferMapper, MapMode, MappedFrameBuffer, RequestPool, RequestState};
pub use config::CaptureConfig;
pub use device::types::{
    ControlId, ControlList, DeviceInfo, FrameBuffer, FramePlane, FrameStatus, PixelFormat,
    RequestId, StreamConfig, StreamRole,
};
pub use device::{CaptureDevice, CaptureSubsystem, CompletionHandler, first_device};
pub use display::{DisplaySink, FrameView, SessionEndReason, SinkControl};
pub use errors::{MapError, SessionError, SessionResult};
pub use pipeline::{CompletionChannel, PipelineState, Session, ShutdownHandle};
pub use stats::CaptureStats;
