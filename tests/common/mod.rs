// SPDX-License-Identifier: GPL-3.0-only

//! In-process fake capture subsystem for pipeline tests
//!
//! `FakeDevice` behaves like a camera as the pipeline sees one: buffers are
//! tempfile-backed handles, `queue` parks requests in a queue, and a
//! `FakeDriver` (the "hardware" side) completes them through the registered
//! handler, either manually or from a spawned completer thread.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Write;
use std::os::fd::OwnedFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use viewfinder::{
    CaptureConfig, CaptureDevice, CaptureSubsystem, CompletionHandler, ControlList, DeviceInfo,
    DisplaySink, FrameBuffer, FramePlane, FrameStatus, FrameView, RequestId, SessionEndReason,
    SessionError, SessionResult, SinkControl, StreamConfig,
};

type CompletionFn = Arc<dyn Fn(RequestId, FrameStatus) + Send + Sync>;

/// Opt-in log output for debugging tests, driven by `RUST_LOG`
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// State shared between the device, its driver handle and completer threads
pub struct FakeShared {
    handler: Mutex<Option<CompletionFn>>,
    queued: Mutex<VecDeque<RequestId>>,
    queued_cond: Condvar,
    running: AtomicBool,
    released: AtomicBool,
    last_controls: Mutex<Option<ControlList>>,
}

impl FakeShared {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            handler: Mutex::new(None),
            queued: Mutex::new(VecDeque::new()),
            queued_cond: Condvar::new(),
            running: AtomicBool::new(false),
            released: AtomicBool::new(false),
            last_controls: Mutex::new(None),
        })
    }
}

/// Byte value every plane of buffer `index` is filled with
pub fn buffer_pattern(index: usize) -> u8 {
    0x10u8.wrapping_add(index as u8)
}

/// Fake capture device implementing the subsystem boundary
pub struct FakeDevice {
    shared: Arc<FakeShared>,
    configured: Option<StreamConfig>,
    buffer_count: u32,
    created_requests: usize,
    queue_calls: usize,
    fail_queue_after: Option<usize>,
    bad_buffer: bool,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self {
            shared: FakeShared::new(),
            configured: None,
            buffer_count: 0,
            created_requests: 0,
            queue_calls: 0,
            fail_queue_after: None,
            bad_buffer: false,
        }
    }

    /// Refuse queue submissions after `n` successful calls
    pub fn fail_queue_after(mut self, n: usize) -> Self {
        self.fail_queue_after = Some(n);
        self
    }

    /// Make the first allocated buffer reference bytes past its handle size
    pub fn with_bad_buffer(mut self) -> Self {
        self.bad_buffer = true;
        self
    }

    /// Hardware-side handle; keep one before the device moves into a session
    pub fn driver(&self) -> FakeDriver {
        FakeDriver {
            shared: Arc::clone(&self.shared),
        }
    }

    fn make_buffer(&self, index: usize, stream: &StreamConfig) -> SessionResult<FrameBuffer> {
        if self.bad_buffer && index == 0 {
            // 120-byte handle with a plane claiming [100, 150).
            let handle = backing_file(120, buffer_pattern(index))?;
            return Ok(FrameBuffer::new(vec![FramePlane {
                handle,
                offset: 100,
                length: 50,
            }]));
        }

        let stride = stream.stride as usize;
        let height = stream.height as usize;
        match stream.pixel_format.plane_count() {
            2 => {
                // Semi-planar: Y plane then UV plane, one shared handle.
                let y_len = stride * height;
                let uv_len = stride * height / 2;
                let handle = backing_file(y_len + uv_len, buffer_pattern(index))?;
                Ok(FrameBuffer::new(vec![
                    FramePlane {
                        handle: Arc::clone(&handle),
                        offset: 0,
                        length: y_len,
                    },
                    FramePlane {
                        handle,
                        offset: y_len,
                        length: uv_len,
                    },
                ]))
            }
            _ => {
                let len = stride * height;
                let handle = backing_file(len, buffer_pattern(index))?;
                Ok(FrameBuffer::new(vec![FramePlane {
                    handle,
                    offset: 0,
                    length: len,
                }]))
            }
        }
    }
}

impl Default for FakeDevice {
    fn default() -> Self {
        Self::new()
    }
}

fn backing_file(len: usize, fill: u8) -> SessionResult<Arc<OwnedFd>> {
    let mut file = tempfile::tempfile()
        .map_err(|e| SessionError::Resource(format!("tempfile: {e}")))?;
    file.write_all(&vec![fill; len])
        .map_err(|e| SessionError::Resource(format!("fill backing file: {e}")))?;
    Ok(Arc::new(OwnedFd::from(file)))
}

impl CaptureDevice for FakeDevice {
    fn configure(&mut self, config: &CaptureConfig) -> SessionResult<StreamConfig> {
        // The device aligns the stride, like real hardware tends to.
        let bpp = config.pixel_format.bytes_per_pixel().unwrap_or(1);
        let stream = StreamConfig {
            width: config.width,
            height: config.height,
            pixel_format: config.pixel_format,
            stride: (config.width * bpp).next_multiple_of(64),
        };
        self.configured = Some(stream);
        self.buffer_count = config.buffer_count;
        Ok(stream)
    }

    fn allocate_buffers(&mut self) -> SessionResult<Vec<FrameBuffer>> {
        let stream = self
            .configured
            .ok_or_else(|| SessionError::Device("allocate_buffers before configure".into()))?;
        (0..self.buffer_count as usize)
            .map(|i| self.make_buffer(i, &stream))
            .collect()
    }

    fn create_request(&mut self, _id: RequestId, _buffer: &FrameBuffer) -> SessionResult<()> {
        self.created_requests += 1;
        Ok(())
    }

    fn set_completion_handler(&mut self, handler: CompletionHandler) {
        *self.shared.handler.lock().unwrap() = Some(Arc::from(handler));
    }

    fn start(&mut self) -> SessionResult<()> {
        self.shared.running.store(true, Ordering::Release);
        Ok(())
    }

    fn queue(&mut self, id: RequestId, controls: &ControlList) -> SessionResult<()> {
        if !self.shared.running.load(Ordering::Acquire) {
            return Err(SessionError::Device("queue before start".into()));
        }
        if let Some(limit) = self.fail_queue_after
            && self.queue_calls >= limit
        {
            return Err(SessionError::Device("queue refused".into()));
        }
        self.queue_calls += 1;
        *self.shared.last_controls.lock().unwrap() = Some(controls.clone());
        self.shared.queued.lock().unwrap().push_back(id);
        self.shared.queued_cond.notify_all();
        Ok(())
    }

    fn stop(&mut self) {
        // Flip the flag under the queue lock so a completer thread checking
        // it before parking cannot miss the wakeup.
        let _guard = self.shared.queued.lock().unwrap();
        self.shared.running.store(false, Ordering::Release);
        drop(_guard);
        self.shared.queued_cond.notify_all();
    }

    fn release(&mut self) {
        self.shared.released.store(true, Ordering::Release);
    }
}

/// Hardware-side handle driving completions for a `FakeDevice`
#[derive(Clone)]
pub struct FakeDriver {
    shared: Arc<FakeShared>,
}

impl FakeDriver {
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn is_released(&self) -> bool {
        self.shared.released.load(Ordering::Acquire)
    }

    pub fn queued_len(&self) -> usize {
        self.shared.queued.lock().unwrap().len()
    }

    /// Controls attached to the most recent submission
    pub fn last_controls(&self) -> Option<ControlList> {
        self.shared.last_controls.lock().unwrap().clone()
    }

    /// Wait until at least `n` requests are queued
    pub fn wait_for_queued(&self, n: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut queued = self.shared.queued.lock().unwrap();
        while queued.len() < n {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .shared
                .queued_cond
                .wait_timeout(queued, deadline - now)
                .unwrap();
            queued = guard;
        }
        true
    }

    fn handler(&self) -> Option<CompletionFn> {
        self.shared.handler.lock().unwrap().clone()
    }

    /// Complete the oldest queued request
    pub fn complete_next(&self, status: FrameStatus) -> Option<RequestId> {
        let id = self.shared.queued.lock().unwrap().pop_front()?;
        let handler = self.handler().expect("completion handler registered");
        handler(id, status);
        Some(id)
    }

    /// Complete the queued request bound to buffer `index`
    pub fn complete_index(&self, index: usize, status: FrameStatus) -> bool {
        let id = {
            let mut queued = self.shared.queued.lock().unwrap();
            let Some(pos) = queued.iter().position(|id| id.index() == index) else {
                return false;
            };
            queued.remove(pos).unwrap()
        };
        let handler = self.handler().expect("completion handler registered");
        handler(id, status);
        true
    }

    /// Invoke the handler for an id without it being queued
    ///
    /// Simulates a spurious/duplicate completion from a buggy device.
    pub fn complete_spurious(&self, id: RequestId, status: FrameStatus) {
        let handler = self.handler().expect("completion handler registered");
        handler(id, status);
    }

    /// Spawn a thread completing queued requests until the device stops
    ///
    /// Returns the number of completions it delivered.
    pub fn spawn_completer(&self) -> JoinHandle<u64> {
        let shared = Arc::clone(&self.shared);
        thread::spawn(move || {
            let mut delivered = 0u64;
            loop {
                let id = {
                    let mut queued = shared.queued.lock().unwrap();
                    loop {
                        if let Some(id) = queued.pop_front() {
                            break Some(id);
                        }
                        if !shared.running.load(Ordering::Acquire) {
                            break None;
                        }
                        queued = shared.queued_cond.wait(queued).unwrap();
                    }
                };
                let Some(id) = id else { break };

                let handler = shared.handler.lock().unwrap().clone();
                if let Some(handler) = handler {
                    handler(id, FrameStatus::Success);
                    delivered += 1;
                }
            }
            delivered
        })
    }
}

/// Fake subsystem exposing a single device
pub struct FakeSubsystem {
    devices: Vec<DeviceInfo>,
}

impl FakeSubsystem {
    pub fn new() -> Self {
        Self {
            devices: vec![DeviceInfo {
                id: "fake0".into(),
                model: "Fake Sensor".into(),
            }],
        }
    }
}

impl Default for FakeSubsystem {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSubsystem for FakeSubsystem {
    type Device = FakeDevice;

    fn enumerate(&mut self) -> Vec<DeviceInfo> {
        self.devices.clone()
    }

    fn acquire(&mut self, id: &str) -> SessionResult<FakeDevice> {
        if self.devices.iter().any(|d| d.id == id) {
            Ok(FakeDevice::new())
        } else {
            Err(SessionError::Device(format!("no such device: {id}")))
        }
    }
}

/// Sink that records what it is shown and quits after a frame limit
pub struct TestSink {
    quit_after: Option<u64>,
    pub displayed: u64,
    /// First byte of plane 0 of every displayed frame
    pub first_bytes: Vec<u8>,
    pub plane_counts: Vec<usize>,
    pub ended: Option<SessionEndReason>,
    pub final_counts: Option<(u64, u64)>,
}

impl TestSink {
    pub fn new() -> Self {
        Self {
            quit_after: None,
            displayed: 0,
            first_bytes: Vec::new(),
            plane_counts: Vec::new(),
            ended: None,
            final_counts: None,
        }
    }

    pub fn quit_after(mut self, frames: u64) -> Self {
        self.quit_after = Some(frames);
        self
    }
}

impl Default for TestSink {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySink for TestSink {
    fn poll_events(&mut self) -> SinkControl {
        match self.quit_after {
            Some(limit) if self.displayed >= limit => SinkControl::Quit,
            _ => SinkControl::Continue,
        }
    }

    fn frame_ready(&mut self, frame: FrameView<'_>) {
        self.displayed += 1;
        self.plane_counts.push(frame.num_planes());
        let plane = frame.plane(0).expect("frame has a first plane");
        let first = plane[0];
        assert!(
            plane.iter().all(|b| *b == first),
            "plane 0 content is not uniform; buffers aliased?"
        );
        for extra in 1..frame.num_planes() {
            let p = frame.plane(extra).expect("plane in range");
            assert!(p.iter().all(|b| *b == first), "plane {extra} mismatch");
        }
        self.first_bytes.push(first);
    }

    fn session_ended(&mut self, reason: SessionEndReason, stats: &viewfinder::CaptureStats) {
        self.ended = Some(reason);
        self.final_counts = Some((stats.frames_displayed(), stats.frames_dropped()));
    }
}
