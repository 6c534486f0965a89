// SPDX-License-Identifier: GPL-3.0-only

//! Fixed pool of capture requests
//!
//! One request exists per allocated buffer, created at session start and
//! never destroyed mid-session. Each request cycles Free → Submitted →
//! Completed → Free. States are per-slot atomics so the device's completion
//! callback can record Submitted → Completed without taking a lock; the
//! completion queue stays the only mutex-protected structure in the
//! pipeline.

use crate::device::types::{ControlList, FrameStatus, RequestId};
use crate::device::CaptureDevice;
use crate::errors::{SessionError, SessionResult};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use tracing::{debug, warn};

const STATE_FREE: u8 = 0;
const STATE_SUBMITTED: u8 = 1;
const STATE_COMPLETED: u8 = 2;

/// Lifecycle state of one capture request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Owned by the pool, ready to be submitted
    Free,
    /// Queued to the device; the device owns the buffer
    Submitted,
    /// Completed by the device; the consumer owns the buffer
    Completed,
}

impl RequestState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            STATE_SUBMITTED => RequestState::Submitted,
            STATE_COMPLETED => RequestState::Completed,
            _ => RequestState::Free,
        }
    }
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestState::Free => write!(f, "free"),
            RequestState::Submitted => write!(f, "submitted"),
            RequestState::Completed => write!(f, "completed"),
        }
    }
}

struct Slot {
    state: AtomicU8,
    status: AtomicU8,
    completions: AtomicU64,
}

impl Slot {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_FREE),
            status: AtomicU8::new(FrameStatus::Success.to_u8()),
            completions: AtomicU64::new(0),
        }
    }
}

/// Fixed-size pool of capture requests, one per frame buffer
///
/// The pool tracks request state only; buffer memory is owned by the
/// session's mapped buffers and looked up by [`RequestId::index`].
pub struct RequestPool {
    slots: Box<[Slot]>,
}

impl RequestPool {
    /// Create one request per buffer, all Free
    pub fn new(buffer_count: usize) -> Self {
        let slots = (0..buffer_count).map(|_| Slot::new()).collect();
        Self { slots }
    }

    /// Number of requests; fixed for the lifetime of the pool
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Identifiers of all requests, in buffer order
    pub fn ids(&self) -> Vec<RequestId> {
        (0..self.slots.len()).map(RequestId::new).collect()
    }

    /// Current state of a request
    pub fn state(&self, id: RequestId) -> Option<RequestState> {
        self.slots
            .get(id.index())
            .map(|slot| RequestState::from_u8(slot.state.load(Ordering::Acquire)))
    }

    /// Number of requests currently in `state`
    pub fn count_in(&self, state: RequestState) -> usize {
        self.slots
            .iter()
            .filter(|slot| RequestState::from_u8(slot.state.load(Ordering::Acquire)) == state)
            .count()
    }

    /// Status the device reported with the request's latest completion
    pub fn completion_status(&self, id: RequestId) -> FrameStatus {
        self.slots
            .get(id.index())
            .map(|slot| FrameStatus::from_u8(slot.status.load(Ordering::Acquire)))
            .unwrap_or(FrameStatus::Error)
    }

    /// Submit every Free request to the device
    ///
    /// All-or-nothing startup: the first queue failure aborts and is
    /// returned; the caller rolls the whole start sequence back (device
    /// stop + [`reset_all`](Self::reset_all)) so no half-submitted set
    /// remains.
    pub fn submit_all<D: CaptureDevice + ?Sized>(
        &self,
        device: &mut D,
        controls: &ControlList,
    ) -> SessionResult<()> {
        let mut submitted = 0usize;
        for (index, slot) in self.slots.iter().enumerate() {
            let id = RequestId::new(index);
            if slot
                .state
                .compare_exchange(
                    STATE_FREE,
                    STATE_SUBMITTED,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_err()
            {
                continue;
            }

            if let Err(e) = device.queue(id, controls) {
                slot.state.store(STATE_FREE, Ordering::Release);
                return Err(e);
            }
            submitted += 1;
        }

        debug!(submitted, "Submitted requests");
        Ok(())
    }

    /// Record a completion announced by the device
    ///
    /// Called from the completion callback, possibly on the device's own
    /// thread. Returns `false` when the request was not Submitted (a
    /// duplicate or spurious completion), in which case the caller must not
    /// enqueue the id. This is what keeps any id from appearing in the
    /// completion queue more than once at a time.
    pub fn record_completion(&self, id: RequestId, status: FrameStatus) -> bool {
        let Some(slot) = self.slots.get(id.index()) else {
            warn!(request = %id, "Completion for unknown request");
            return false;
        };

        let recorded = slot
            .state
            .compare_exchange(
                STATE_SUBMITTED,
                STATE_COMPLETED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if recorded {
            // The consumer reads the status only after receiving the id over
            // the channel, which orders this store ahead of the read.
            slot.status.store(status.to_u8(), Ordering::Release);
            slot.completions.fetch_add(1, Ordering::Relaxed);
        } else {
            warn!(request = %id, "Duplicate completion rejected");
        }
        recorded
    }

    /// Recycle a consumed request: Completed → Free → Submitted
    ///
    /// Resets the per-request completion metadata and resubmits the request
    /// so the device stays fed without growing the pool. Invoked on a
    /// request that is not Completed this fails with
    /// [`SessionError::ProtocolViolation`]; that is a caller bug and never
    /// succeeds silently.
    pub fn reuse<D: CaptureDevice + ?Sized>(
        &self,
        id: RequestId,
        device: &mut D,
        controls: &ControlList,
    ) -> SessionResult<()> {
        let slot = self.slots.get(id.index()).ok_or_else(|| {
            SessionError::ProtocolViolation(format!("reuse of unknown {id}"))
        })?;

        slot.state
            .compare_exchange(
                STATE_COMPLETED,
                STATE_FREE,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|found| {
                SessionError::ProtocolViolation(format!(
                    "reuse of {id} in state {}, expected completed",
                    RequestState::from_u8(found)
                ))
            })?;

        // Reset per-request metadata before the next cycle.
        slot.status
            .store(FrameStatus::Success.to_u8(), Ordering::Release);

        // Free → Submitted must happen before the device sees the request,
        // otherwise its completion could race the transition.
        slot.state.store(STATE_SUBMITTED, Ordering::Release);
        if let Err(e) = device.queue(id, controls) {
            slot.state.store(STATE_FREE, Ordering::Release);
            return Err(e);
        }
        Ok(())
    }

    /// Force every request back to Free
    ///
    /// Teardown helper, valid only once the device is stopped and no further
    /// completions can arrive.
    pub fn reset_all(&self) {
        for slot in self.slots.iter() {
            slot.state.store(STATE_FREE, Ordering::Release);
            slot.status
                .store(FrameStatus::Success.to_u8(), Ordering::Release);
        }
    }

    /// Total completions recorded for one request over the session
    pub fn completion_count(&self, id: RequestId) -> u64 {
        self.slots
            .get(id.index())
            .map(|slot| slot.completions.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for RequestPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPool")
            .field("requests", &self.slots.len())
            .field("free", &self.count_in(RequestState::Free))
            .field("submitted", &self.count_in(RequestState::Submitted))
            .field("completed", &self.count_in(RequestState::Completed))
            .finish()
    }
}
