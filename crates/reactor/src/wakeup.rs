// SPDX-License-Identifier: MIT

//! Rate-limited wakeups (spec §3, §4.1): `{event_mask, lpf_ms, force_ms,
//! callback}`. Unlike a timer or an io watch, a wakeup isn't told *when* to
//! fire by its owner — the reactor fires it automatically at the end of
//! every `iterate()` pass whose wakeup reason (io-driven if the poll
//! returned at least one ready descriptor, timer-driven if it returned
//! none) intersects the wakeup's `event_mask`. `lpf_ms` throttles that to
//! at most once per window; if the window is still open when a matching
//! reason occurs, the request is coalesced into a single forced firing
//! `force_ms` after the last real one, via the same lazy-deletion deadline
//! heap [`crate::timer::TimerTable`] uses. A wakeup with no `lpf_ms` fires
//! on every matching reason; `force_ms` without `lpf_ms` never has
//! anything to force, since nothing is throttling it.
//!
//! As with [`crate::timer::TimerTable`] and [`crate::bus::Bus`], every
//! field is behind interior mutability and every method takes `&self`, so
//! a wakeup callback may delete itself or a sibling without the in-flight
//! pass observing a half-swept table.

use std::cell::{Cell, RefCell};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use iotfw_core::{Arena, Key, Mask};

use crate::error::{ReactorError, Result};

/// A loop wakeup driven by at least one ready file descriptor.
pub const WAKEUP_IO: u32 = 0;
/// A loop wakeup with no ready descriptors — the poll returned because its
/// timeout elapsed.
pub const WAKEUP_TIMER: u32 = 1;

pub type WakeupCallback = Box<dyn FnMut(&WakeupTable) + 'static>;

struct Entry {
    event_mask: Mask,
    lpf_usec: Option<i64>,
    force_usec: Option<i64>,
    last_fired_usec: Cell<Option<i64>>,
    /// Set while a coalesced forced firing is scheduled on the heap.
    pending: Cell<bool>,
    callback: RefCell<Option<WakeupCallback>>,
}

pub struct WakeupTable {
    entries: RefCell<Arena<Entry>>,
    /// Forced-firing deadlines, lazily deleted the same way `TimerTable`
    /// handles cancellation: a popped entry is ignored if its wakeup is no
    /// longer live or is no longer pending.
    heap: RefCell<BinaryHeap<Reverse<(i64, Key)>>>,
    busy: Cell<u32>,
}

impl Default for WakeupTable {
    fn default() -> Self {
        Self::new()
    }
}

impl WakeupTable {
    pub fn new() -> Self {
        Self { entries: RefCell::new(Arena::new()), heap: RefCell::new(BinaryHeap::new()), busy: Cell::new(0) }
    }

    /// Register a wakeup. `lpf_ms` and `force_ms` are in milliseconds
    /// (the reactor's other durations are microseconds, but the public
    /// contract quotes `lpf_ms`/`force_ms` and these are never compared
    /// against a clock directly by the caller). If both are given,
    /// `lpf_ms <= force_ms` is required — a forced refresh that arrives
    /// before the window it's meant to outlast would never throttle
    /// anything.
    pub fn add(&self, event_mask: Mask, lpf_ms: Option<u64>, force_ms: Option<u64>, callback: WakeupCallback) -> Result<Key> {
        if event_mask.is_empty() {
            return Err(ReactorError::Invalid("wakeup event mask must be non-empty"));
        }
        if let (Some(lpf), Some(force)) = (lpf_ms, force_ms) {
            if lpf > force {
                return Err(ReactorError::Invalid("wakeup lpf_ms must be <= force_ms"));
            }
        }
        let key = self.entries.borrow_mut().insert(Entry {
            event_mask,
            lpf_usec: lpf_ms.map(|ms| ms as i64 * 1_000),
            force_usec: force_ms.map(|ms| ms as i64 * 1_000),
            last_fired_usec: Cell::new(None),
            pending: Cell::new(false),
            callback: RefCell::new(Some(callback)),
        });
        Ok(key)
    }

    pub fn del(&self, key: Key) {
        self.entries.borrow_mut().mark_dead(key);
        self.sweep_if_idle();
    }

    fn sweep_if_idle(&self) {
        if self.busy.get() == 0 {
            self.entries.borrow_mut().sweep();
        }
    }

    /// Notify every live wakeup whose `event_mask` intersects `reason`
    /// that the loop just woke for that reason. Called once per
    /// `iterate()` pass with the reason classified from the poll result.
    pub fn fire_for_reason(&self, reason: Mask, now_usec: i64) {
        self.busy.set(self.busy.get() + 1);
        let matching: Vec<Key> = {
            let entries = self.entries.borrow();
            entries.iter_live().filter(|(_, e)| !e.event_mask.intersect(reason).is_empty()).map(|(key, _)| key).collect()
        };
        for key in matching {
            self.trigger(key, now_usec);
        }
        self.busy.set(self.busy.get() - 1);
        self.sweep_if_idle();
    }

    /// Either fire `key` immediately (its low-pass window has elapsed, or
    /// it has none) or, if a force window is configured, coalesce this
    /// request into a single pending forced firing.
    fn trigger(&self, key: Key, now_usec: i64) {
        let elapsed_enough = {
            let entries = self.entries.borrow();
            let Some(entry) = entries.get(key) else { return };
            match (entry.lpf_usec, entry.last_fired_usec.get()) {
                (None, _) => true,
                (Some(_), None) => true,
                (Some(lpf), Some(last)) => now_usec - last >= lpf,
            }
        };
        if elapsed_enough {
            self.invoke(key, now_usec);
            return;
        }
        let entries = self.entries.borrow();
        let Some(entry) = entries.get(key) else { return };
        if entry.pending.get() {
            return;
        }
        let Some(force) = entry.force_usec else { return };
        entry.pending.set(true);
        let deadline = entry.last_fired_usec.get().unwrap_or(now_usec) + force;
        drop(entries);
        self.heap.borrow_mut().push(Reverse((deadline, key)));
    }

    fn invoke(&self, key: Key, now_usec: i64) {
        let taken = {
            let entries = self.entries.borrow();
            entries.get(key).and_then(|e| e.callback.borrow_mut().take())
        };
        let Some(mut callback) = taken else { return };
        callback(self);
        let entries = self.entries.borrow();
        if let Some(entry) = entries.get(key) {
            entry.last_fired_usec.set(Some(now_usec));
            entry.pending.set(false);
            *entry.callback.borrow_mut() = Some(callback);
        }
    }

    /// The absolute deadline of the next coalesced forced firing, if any
    /// — consulted by the reactor's poll-timeout calculation the same way
    /// `TimerTable::next_expiry` is.
    pub fn next_expiry(&self) -> Option<i64> {
        self.drop_stale();
        self.heap.borrow().peek().map(|Reverse((when, _))| *when)
    }

    fn drop_stale(&self) {
        loop {
            let stale = match self.heap.borrow().peek() {
                Some(Reverse((_, key))) => !self.entries.borrow().get(*key).map(|e| e.pending.get()).unwrap_or(false),
                None => false,
            };
            if !stale {
                break;
            }
            self.heap.borrow_mut().pop();
        }
    }

    /// Fire every wakeup whose coalesced forced deadline is `<= now_usec`
    /// — the part of a wakeup's contract that runs independently of how
    /// (or whether) the loop's poll reported activity this pass.
    pub fn fire_due(&self, now_usec: i64) {
        self.busy.set(self.busy.get() + 1);
        loop {
            self.drop_stale();
            let due = self.heap.borrow().peek().map(|&Reverse((when, key))| (when, key));
            let Some((when, key)) = due else { break };
            if when > now_usec {
                break;
            }
            self.heap.borrow_mut().pop();
            let still_pending = self.entries.borrow().get(key).map(|e| e.pending.get()).unwrap_or(false);
            if !still_pending {
                continue;
            }
            self.invoke(key, when);
        }
        self.busy.set(self.busy.get() - 1);
        self.sweep_if_idle();
    }

    pub fn is_live(&self, key: Key) -> bool {
        self.entries.borrow().is_live(key)
    }
}

#[cfg(test)]
#[path = "wakeup_tests.rs"]
mod tests;
