// SPDX-License-Identifier: MIT

//! One-shot and periodic timers (spec §4.1).
//!
//! The source keeps timers on a sorted intrusive list so the next firing is
//! always the head. A `BinaryHeap` gives the same "cheapest next deadline"
//! property in O(log n) per insert/rearm without a linked list, and lazy
//! deletion (checking the arena's generation when a heap entry is popped)
//! means cancelling a timer doesn't require finding and unlinking it from
//! the heap.
//!
//! Every field is behind `RefCell`/`Cell` and every method takes `&self`,
//! mirroring [`crate::bus::Bus`]: a timer callback may delete itself or any
//! other timer (including one about to fire later in the same `fire_due`
//! pass) without tripping Rust's aliasing rules, because no borrow is held
//! across the callback invocation. Deletions made while a pass is running
//! only tombstone the slot; storage is reclaimed once the pass completes
//! (spec §4.1 "deletions take effect immediately for sentinel purposes but
//! storage survives until the post-dispatch sweep").

use std::cell::{Cell, RefCell};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use iotfw_core::{Arena, Key};

use crate::error::{ReactorError, Result};

pub type TimerCallback = Box<dyn FnMut(&TimerTable) + 'static>;

struct Entry {
    period_usec: Option<i64>,
    callback: RefCell<Option<TimerCallback>>,
}

/// Timer storage keyed on absolute expiry in microseconds. The caller
/// supplies "now" on every operation rather than this type reading the
/// clock itself, so it stays testable with a fake clock.
pub struct TimerTable {
    entries: RefCell<Arena<Entry>>,
    heap: RefCell<BinaryHeap<Reverse<(i64, Key)>>>,
    busy: Cell<u32>,
}

impl Default for TimerTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerTable {
    pub fn new() -> Self {
        Self { entries: RefCell::new(Arena::new()), heap: RefCell::new(BinaryHeap::new()), busy: Cell::new(0) }
    }

    /// Arm a timer to first fire at `expire_usec`. `period_usec`, if set,
    /// rearms it that many microseconds after each firing.
    pub fn add(&self, expire_usec: i64, period_usec: Option<i64>, callback: TimerCallback) -> Result<Key> {
        if let Some(p) = period_usec {
            if p <= 0 {
                return Err(ReactorError::Invalid("timer period must be positive"));
            }
        }
        let key = self.entries.borrow_mut().insert(Entry { period_usec, callback: RefCell::new(Some(callback)) });
        self.heap.borrow_mut().push(Reverse((expire_usec, key)));
        Ok(key)
    }

    pub fn del(&self, key: Key) {
        self.entries.borrow_mut().mark_dead(key);
        if self.busy.get() == 0 {
            self.entries.borrow_mut().sweep();
        }
    }

    /// Rearm an existing timer to a new absolute expiry, leaving its period
    /// (if any) unchanged.
    pub fn rearm(&self, key: Key, expire_usec: i64) -> Result<()> {
        if !self.entries.borrow().is_live(key) {
            return Err(ReactorError::Invalid("unknown timer key"));
        }
        self.heap.borrow_mut().push(Reverse((expire_usec, key)));
        Ok(())
    }

    /// The absolute expiry of the next live timer, if any. Used to compute
    /// the reactor's epoll timeout.
    pub fn next_expiry(&self) -> Option<i64> {
        self.drop_stale();
        self.heap.borrow().peek().map(|Reverse((when, _))| *when)
    }

    /// Drop heap entries whose key is no longer live — either cancelled, or
    /// a stale duplicate left behind by `rearm` pushing a fresh entry
    /// instead of mutating the old one.
    fn drop_stale(&self) {
        loop {
            let stale = match self.heap.borrow().peek() {
                Some(Reverse((_, key))) => !self.entries.borrow().is_live(*key),
                None => false,
            };
            if !stale {
                break;
            }
            self.heap.borrow_mut().pop();
        }
    }

    /// Fire every timer whose expiry is `<= now_usec`. Periodic timers are
    /// rearmed relative to their previous deadline (not `now`), so a
    /// delayed dispatch doesn't compress the remaining period.
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

            let taken = {
                let entries = self.entries.borrow();
                entries.get(key).and_then(|e| e.callback.borrow_mut().take())
            };
            let Some(mut callback) = taken else { continue };
            callback(self);

            // Put the callback back and rearm only if the timer is still
            // live: it may have deleted itself while it ran.
            let entries = self.entries.borrow();
            if let Some(entry) = entries.get(key) {
                let period = entry.period_usec;
                *entry.callback.borrow_mut() = Some(callback);
                drop(entries);
                if let Some(period) = period {
                    self.heap.borrow_mut().push(Reverse((when + period, key)));
                } else {
                    self.entries.borrow_mut().mark_dead(key);
                }
            }
        }
        self.busy.set(self.busy.get() - 1);
        if self.busy.get() == 0 {
            self.entries.borrow_mut().sweep();
        }
    }

    pub fn is_live(&self, key: Key) -> bool {
        self.entries.borrow().is_live(key)
    }

    pub fn len_live(&self) -> usize {
        self.entries.borrow().len_live()
    }
}

#[cfg(test)]
#[path = "timer_tests.rs"]
mod tests;
