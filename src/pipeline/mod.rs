// SPDX-License-Identifier: GPL-3.0-only

//! Frame pipeline orchestration
//!
//! A [`Session`] ties the pieces together: it configures an acquired device,
//! maps the allocated buffers, binds one request per buffer, and runs the
//! closed loop submit → complete → display → reuse. Two threads touch the
//! pipeline: the device's completion callback (producer) and the render
//! loop (consumer); the completion channel is the only structure they
//! share under a lock.

pub mod channel;

pub use channel::CompletionChannel;

use crate::buffers::{BufferMapper, MapMode, MappedFrameBuffer, RequestPool};
use crate::config::CaptureConfig;
use crate::device::types::{ControlList, FrameStatus, RequestId, StreamConfig};
use crate::device::{CaptureDevice, CaptureSubsystem};
use crate::display::{DisplaySink, FrameView, SessionEndReason, SinkControl};
use crate::errors::{SessionError, SessionResult};
use crate::stats::CaptureStats;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Lifecycle state of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No device configured yet
    Idle,
    /// Device configured, buffers mapped, requests bound
    Configured,
    /// Device started, requests in flight
    Capturing,
    /// Device stopped and released, buffers unmapped
    Stopped,
}

/// Cancels a consumer blocked on the next completion
///
/// Cloneable and thread-safe; typically handed to a signal handler or the
/// UI's close path.
#[derive(Clone)]
pub struct ShutdownHandle {
    channel: Arc<CompletionChannel>,
}

impl ShutdownHandle {
    /// Request session shutdown
    ///
    /// Wakes a blocked [`Session::run`] loop, which then tears the session
    /// down. Idempotent.
    pub fn request_stop(&self) {
        self.channel.shutdown();
    }
}

/// One capture session: device, mapped buffers, request pool, channel
///
/// Construction performs Idle → Configured. A failed construction releases
/// the device and unmaps everything before returning; no partially
/// acquired session ever escapes. Dropping a live session tears it down in
/// the same strict order as [`stop`](Self::stop).
pub struct Session<D: CaptureDevice> {
    device: D,
    stream: StreamConfig,
    buffers: Vec<MappedFrameBuffer>,
    pool: Arc<RequestPool>,
    channel: Arc<CompletionChannel>,
    controls: ControlList,
    stats: CaptureStats,
    state: PipelineState,
    sequence: u64,
}

impl<D: CaptureDevice> std::fmt::Debug for Session<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("stream", &self.stream)
            .field("controls", &self.controls)
            .field("stats", &self.stats)
            .field("state", &self.state)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

impl<D: CaptureDevice> Session<D> {
    /// Configure `device` and prepare the session (Idle → Configured)
    ///
    /// Steps: validate the config, configure the stream, allocate buffers,
    /// map every plane, create one device request per buffer, register the
    /// completion handler. Any failure rolls everything back and releases
    /// the device.
    pub fn new(mut device: D, config: &CaptureConfig) -> SessionResult<Self> {
        match Self::prepare(&mut device, config) {
            Ok((stream, buffers, pool, channel)) => {
                info!(
                    width = stream.width,
                    height = stream.height,
                    pixel_format = %stream.pixel_format,
                    stride = stream.stride,
                    buffers = buffers.len(),
                    "Capture session configured"
                );
                Ok(Self {
                    device,
                    stream,
                    buffers,
                    pool,
                    channel,
                    controls: ControlList::new(),
                    stats: CaptureStats::new(),
                    state: PipelineState::Configured,
                    sequence: 0,
                })
            }
            Err(e) => {
                error!(error = %e, "Session setup failed, releasing device");
                device.stop();
                device.release();
                Err(e)
            }
        }
    }

    /// Acquire the device `id` from `subsystem` and configure a session on it
    pub fn open<S>(subsystem: &mut S, id: &str, config: &CaptureConfig) -> SessionResult<Self>
    where
        S: CaptureSubsystem<Device = D>,
    {
        let device = subsystem.acquire(id)?;
        Self::new(device, config)
    }

    #[allow(clippy::type_complexity)]
    fn prepare(
        device: &mut D,
        config: &CaptureConfig,
    ) -> SessionResult<(
        StreamConfig,
        Vec<MappedFrameBuffer>,
        Arc<RequestPool>,
        Arc<CompletionChannel>,
    )> {
        config.validate()?;

        let stream = device.configure(config)?;
        let raw_buffers = device.allocate_buffers()?;
        if raw_buffers.is_empty() {
            return Err(SessionError::Resource(
                "device allocated no buffers".into(),
            ));
        }

        let mapper = BufferMapper::new(MapMode::ReadOnly);
        let mut buffers = Vec::with_capacity(raw_buffers.len());
        for raw in &raw_buffers {
            buffers.push(mapper.map(raw)?);
        }
        debug!(buffers = buffers.len(), "Mapped all frame buffers");

        let pool = Arc::new(RequestPool::new(buffers.len()));
        for (id, raw) in pool.ids().into_iter().zip(&raw_buffers) {
            device.create_request(id, raw)?;
        }

        let channel = Arc::new(CompletionChannel::new());
        let pool_cb = Arc::clone(&pool);
        let channel_cb = Arc::clone(&channel);
        device.set_completion_handler(Box::new(move |id, status| {
            // Runs on the device's thread: record the transition, wake the
            // consumer, nothing else.
            if pool_cb.record_completion(id, status) {
                channel_cb.complete(id);
            }
        }));

        Ok((stream, buffers, pool, channel))
    }

    /// Start the device and submit every request (Configured → Capturing)
    ///
    /// All-or-nothing: a submission failure stops the device and resets the
    /// pool before the error is returned.
    pub fn start_capture(&mut self) -> SessionResult<()> {
        if self.state != PipelineState::Configured {
            return Err(SessionError::ProtocolViolation(format!(
                "start_capture in state {:?}",
                self.state
            )));
        }

        self.device.start()?;
        if let Err(e) = self.pool.submit_all(&mut self.device, &self.controls) {
            warn!(error = %e, "Submission failed, rolling back start");
            self.device.stop();
            self.pool.reset_all();
            return Err(e);
        }

        self.stats.mark_started();
        self.state = PipelineState::Capturing;
        info!(requests = self.pool.len(), "Capture started, all requests queued");
        Ok(())
    }

    /// Run the capture loop until quit or shutdown (Capturing → Stopped)
    ///
    /// Each iteration drains the sink's pending events, parks on the next
    /// completion (the single suspension point), then renders and recycles
    /// the request. A request with a non-success status is dropped without
    /// rendering but still recycled, so one bad frame never stalls the
    /// device.
    pub fn run(&mut self, sink: &mut dyn DisplaySink) -> SessionResult<CaptureStats> {
        if self.state != PipelineState::Capturing {
            return Err(SessionError::ProtocolViolation(format!(
                "run in state {:?}",
                self.state
            )));
        }

        let reason = loop {
            if sink.poll_events() == SinkControl::Quit {
                break SessionEndReason::Quit;
            }

            let Some(id) = self.channel.take() else {
                break SessionEndReason::Shutdown;
            };

            if let Err(e) = self.consume(id, sink) {
                error!(error = %e, "Fatal error consuming frame");
                self.teardown();
                sink.session_ended(SessionEndReason::Error, &self.stats);
                return Err(e);
            }
        };

        self.teardown();
        info!(
            reason = ?reason,
            displayed = self.stats.frames_displayed(),
            dropped = self.stats.frames_dropped(),
            "Capture session ended"
        );
        sink.session_ended(reason, &self.stats);
        Ok(self.stats.clone())
    }

    /// Forward one completed request to the sink and recycle it
    fn consume(&mut self, id: RequestId, sink: &mut dyn DisplaySink) -> SessionResult<()> {
        self.sequence += 1;

        match self.pool.completion_status(id) {
            FrameStatus::Success => {
                let buffer = self.buffers.get(id.index()).ok_or_else(|| {
                    SessionError::ProtocolViolation(format!("completed {id} has no buffer"))
                })?;
                let view = FrameView::new(
                    buffer.planes(),
                    self.stream.width,
                    self.stream.height,
                    self.stream.pixel_format,
                    self.stream.stride,
                    self.sequence,
                );
                sink.frame_ready(view);
                self.stats.record_displayed();
            }
            status => {
                debug!(request = %id, ?status, "Dropping frame with non-success status");
                self.stats.record_dropped();
            }
        }

        self.pool.reuse(id, &mut self.device, &self.controls)
    }

    /// Stop the session explicitly (any state → Stopped)
    ///
    /// Equivalent to the teardown `run` performs on exit; safe to call more
    /// than once.
    pub fn stop(&mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.state == PipelineState::Stopped {
            return;
        }
        info!("Stopping capture session");

        // Order matters: the device must stop writing before any buffer is
        // unmapped, and everything must settle before the device is
        // released.
        self.device.stop();
        self.channel.shutdown();
        let discarded = self.channel.drain();
        if !discarded.is_empty() {
            debug!(count = discarded.len(), "Discarded unconsumed completions");
        }
        self.pool.reset_all();
        for buffer in &mut self.buffers {
            buffer.unmap();
        }
        self.device.release();
        self.stats.mark_stopped();
        self.state = PipelineState::Stopped;
    }

    /// Handle that cancels a blocked [`run`](Self::run) from another thread
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            channel: Arc::clone(&self.channel),
        }
    }

    /// Controls applied to every subsequent submission
    pub fn set_controls(&mut self, controls: ControlList) {
        self.controls = controls;
    }

    /// Geometry the device settled on
    pub fn stream(&self) -> &StreamConfig {
        &self.stream
    }

    /// Current lifecycle state
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Frame counters for this session
    pub fn stats(&self) -> &CaptureStats {
        &self.stats
    }

    /// The session's request pool
    pub fn pool(&self) -> &RequestPool {
        &self.pool
    }
}

impl<D: CaptureDevice> Drop for Session<D> {
    fn drop(&mut self) {
        if self.state != PipelineState::Stopped {
            debug!("Session dropped while active, tearing down");
            self.teardown();
        }
    }
}
