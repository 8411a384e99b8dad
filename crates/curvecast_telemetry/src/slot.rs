// SPDX-License-Identifier: MIT OR Apache-2.0
//! Single-slot, latest-only cross-thread handoff.

use parking_lot::{Condvar, Mutex};
use std::time::Duration;

struct SlotState<T> {
    value: Option<T>,
    closed: bool,
}

/// A one-value channel with overwrite-latest semantics.
///
/// A publisher replaces whatever is pending; a consumer takes the most
/// recent value or nothing. Neither side ever blocks on a backlog, which is
/// the handoff policy for both outbound payloads and inbound sync positions.
pub struct LatestSlot<T> {
    state: Mutex<SlotState<T>>,
    available: Condvar,
}

impl<T> LatestSlot<T> {
    /// Create an open, empty slot
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                value: None,
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Store a value, discarding any pending one. Returns `false` when the
    /// slot has been closed.
    pub fn publish(&self, value: T) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.value = Some(value);
        self.available.notify_one();
        true
    }

    /// Take the pending value without blocking
    pub fn take(&self) -> Option<T> {
        self.state.lock().value.take()
    }

    /// Take the pending value, parking up to `timeout` for one to arrive.
    /// Returns `None` on timeout or once the slot is closed and drained.
    pub fn take_timeout(&self, timeout: Duration) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(value) = state.value.take() {
                return Some(value);
            }
            if state.closed {
                return None;
            }
            if self.available.wait_for(&mut state, timeout).timed_out() {
                return state.value.take();
            }
        }
    }

    /// Close the slot, waking any parked consumer. Pending values remain
    /// takeable; publishing stops. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.available.notify_all();
    }

    /// Whether the slot has been closed
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
