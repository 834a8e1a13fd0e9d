// SPDX-License-Identifier: MIT

//! Deferred work items: callbacks that run once per reactor iteration when
//! enabled, after io and timer dispatch, before the next poll (spec §4.1).
//!
//! A deferred is a flag, not a queue entry: calling "defer" on an
//! already-enabled item is idempotent, and disabling one before it runs
//! cancels that run without needing to find and remove a queued entry.
//!
//! Storage and every method mirror [`crate::bus::Bus`]'s reentrancy
//! pattern: a running deferred may enable, disable, or delete itself or any
//! other deferred without the table observing a half-iterated pass or
//! freeing storage still referenced by the in-progress sweep.

use std::cell::{Cell, RefCell};

use iotfw_core::{Arena, Key};

pub type DeferredCallback = Box<dyn FnMut(&DeferredTable) + 'static>;

struct Entry {
    enabled: Cell<bool>,
    callback: RefCell<Option<DeferredCallback>>,
}

pub struct DeferredTable {
    entries: RefCell<Arena<Entry>>,
    busy: Cell<u32>,
}

impl Default for DeferredTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DeferredTable {
    pub fn new() -> Self {
        Self { entries: RefCell::new(Arena::new()), busy: Cell::new(0) }
    }

    /// Register a deferred item. `start_enabled` controls whether it is
    /// eligible to run on the very next iteration.
    pub fn add(&self, start_enabled: bool, callback: DeferredCallback) -> Key {
        self.entries.borrow_mut().insert(Entry { enabled: Cell::new(start_enabled), callback: RefCell::new(Some(callback)) })
    }

    pub fn enable(&self, key: Key) {
        if let Some(entry) = self.entries.borrow().get(key) {
            entry.enabled.set(true);
        }
    }

    pub fn disable(&self, key: Key) {
        if let Some(entry) = self.entries.borrow().get(key) {
            entry.enabled.set(false);
        }
    }

    pub fn del(&self, key: Key) {
        self.entries.borrow_mut().mark_dead(key);
        if self.busy.get() == 0 {
            self.entries.borrow_mut().sweep();
        }
    }

    pub fn is_live(&self, key: Key) -> bool {
        self.entries.borrow().is_live(key)
    }

    pub fn is_enabled(&self, key: Key) -> bool {
        self.entries.borrow().get(key).map(|e| e.enabled.get()).unwrap_or(false)
    }

    /// Run every enabled deferred once, in insertion order, then disable
    /// it. A deferred's callback may re-enable itself (or another
    /// deferred) to run again next iteration, but never within the same
    /// pass: the set of keys to run is snapshotted before any callback
    /// runs.
    pub fn run_pending(&self) {
        self.busy.set(self.busy.get() + 1);

        let due: Vec<Key> = {
            let entries = self.entries.borrow();
            entries.iter_live().filter(|(_, entry)| entry.enabled.get()).map(|(key, _)| key).collect()
        };

        for key in due {
            let taken = {
                let entries = self.entries.borrow();
                match entries.get(key) {
                    Some(entry) if entry.enabled.get() => {
                        entry.enabled.set(false);
                        entry.callback.borrow_mut().take()
                    }
                    _ => None,
                }
            };
            let Some(mut callback) = taken else { continue };
            callback(self);
            let entries = self.entries.borrow();
            if let Some(entry) = entries.get(key) {
                *entry.callback.borrow_mut() = Some(callback);
            }
        }

        self.busy.set(self.busy.get() - 1);
        if self.busy.get() == 0 {
            self.entries.borrow_mut().sweep();
        }
    }

    pub fn len_live(&self) -> usize {
        self.entries.borrow().len_live()
    }

    /// Whether any live deferred is currently enabled — used by the
    /// reactor to decide whether the next poll should be non-blocking.
    pub fn has_enabled(&self) -> bool {
        self.entries.borrow().iter_live().any(|(_, entry)| entry.enabled.get())
    }
}

#[cfg(test)]
#[path = "deferred_tests.rs"]
mod tests;
