// SPDX-License-Identifier: GPL-3.0-only

//! Producer/consumer handoff for completed requests
//!
//! The device announces completions on its own thread; the render loop
//! consumes them on the main thread. Completion frequency is bounded by the
//! hardware frame rate, so a mutex plus condvar is plenty; this FIFO is the
//! only shared structure in the pipeline that takes a lock.

use crate::device::types::RequestId;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use tracing::{debug, trace};

#[derive(Default)]
struct ChannelState {
    queue: VecDeque<RequestId>,
    shut_down: bool,
}

/// FIFO of completed request identifiers with a blocking consumer side
///
/// Bounded by construction: an id can only re-enter after the consumer
/// recycled it, so the queue never exceeds the pool size.
#[derive(Default)]
pub struct CompletionChannel {
    state: Mutex<ChannelState>,
    cond: Condvar,
}

impl CompletionChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Producer side: append a completed request and wake the consumer
    ///
    /// Minimal work under the lock; never blocks on anything but the lock
    /// itself. Completions arriving after shutdown are dropped; teardown
    /// discards unconsumed requests anyway.
    pub fn complete(&self, id: RequestId) {
        let mut state = self.lock();
        if state.shut_down {
            trace!(request = %id, "Completion after shutdown dropped");
            return;
        }
        state.queue.push_back(id);
        drop(state);
        self.cond.notify_one();
    }

    /// Consumer side: block until a completion is available
    ///
    /// Returns ids in exactly the order they were announced. Returns `None`
    /// once the channel is shut down and drained, the cancellation
    /// indication that lets shutdown interrupt a consumer parked on an
    /// empty queue.
    pub fn take(&self) -> Option<RequestId> {
        let mut state = self.lock();
        loop {
            if let Some(id) = state.queue.pop_front() {
                return Some(id);
            }
            if state.shut_down {
                return None;
            }
            state = self
                .cond
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Non-blocking variant of [`take`](Self::take)
    pub fn try_take(&self) -> Option<RequestId> {
        self.lock().queue.pop_front()
    }

    /// Wake every waiter and make further `take` calls return `None`
    pub fn shutdown(&self) {
        let mut state = self.lock();
        if !state.shut_down {
            state.shut_down = true;
            debug!(pending = state.queue.len(), "Completion channel shut down");
        }
        drop(state);
        self.cond.notify_all();
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock().shut_down
    }

    /// Number of completions waiting to be consumed
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// Remove and return everything still queued
    pub fn drain(&self) -> Vec<RequestId> {
        self.lock().queue.drain(..).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChannelState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
