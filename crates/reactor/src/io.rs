// SPDX-License-Identifier: MIT

//! Io watches: registration of interest in readiness events on a file
//! descriptor, with master/slave fan-out (spec §4.1).
//!
//! Exactly one *master* watch owns a descriptor's `epoll` registration; any
//! number of slave watches may additionally subscribe to events on the
//! same fd without touching the kernel registration themselves. On
//! dispatch, the master receives `kernel_events & master.mask`; each slave
//! then receives its share of whatever the master did not claim, in
//! insertion order, narrowing the pool of unclaimed bits as it goes. This
//! lets two independent subsystems (e.g. a transport read-side and a
//! separate write-flush watcher) share one fd without either one seeing
//! events the other already owns.
//!
//! As in [`crate::bus::Bus`], every field is behind interior mutability and
//! every method takes `&self`: a watch's callback receives the table
//! itself and may delete its own watch or a sibling's mid-dispatch without
//! the promotion/union-recompute logic observing a half-updated arena.
//! Deletions during a dispatch pass only tombstone; storage is reclaimed
//! once the pass completes.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::os::fd::RawFd;

use iotfw_core::{Arena, Key, Mask};

use crate::epoll::{Readiness, HUP};
use crate::error::{ReactorError, Result};

pub use crate::epoll::{HUP as MASK_HUP, IN as MASK_IN, OUT as MASK_OUT};

/// How the kernel reports readiness for a watch's fd.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    /// Re-reported every poll while the condition holds.
    Level,
    /// Reported once per transition; the reactor must drain before
    /// re-arming is meaningful. Only the master's trigger mode reaches
    /// the kernel — slaves inherit whatever the master asked for.
    Edge,
}

pub type IoCallback = Box<dyn FnMut(&IoTable, Mask) + 'static>;

struct Slot {
    fd: RawFd,
    mask: Cell<Mask>,
    is_master: Cell<bool>,
    hup_streak: Cell<u32>,
    callback: RefCell<Option<IoCallback>>,
}

/// Per-fd bookkeeping: which key owns the kernel registration, and the
/// ordered list of slaves layered on top of it.
struct FdEntry {
    master: Cell<Key>,
    slaves: RefCell<Vec<Key>>,
    trigger: TriggerMode,
}

pub struct IoTable {
    readiness: Readiness,
    watches: RefCell<Arena<Slot>>,
    fds: RefCell<HashMap<RawFd, FdEntry>>,
    /// Consecutive HUP-only dispatches before a master is auto-unregistered.
    hup_threshold: u32,
    busy: Cell<u32>,
}

impl IoTable {
    pub fn new(hup_threshold: u32) -> Result<Self> {
        Ok(Self {
            readiness: Readiness::new()?,
            watches: RefCell::new(Arena::new()),
            fds: RefCell::new(HashMap::new()),
            hup_threshold,
            busy: Cell::new(0),
        })
    }

    pub fn readiness_fd(&self) -> RawFd {
        self.readiness.as_raw_fd()
    }

    /// Register a new watch on `fd`. The first watch on a given fd becomes
    /// its master and picks the fd's trigger mode; later watches become
    /// slaves and share the master's trigger mode regardless of what they
    /// request, since only one registration reaches the kernel.
    pub fn add(&self, fd: RawFd, mask: Mask, trigger: TriggerMode, callback: IoCallback) -> Result<Key> {
        if mask.is_empty() {
            return Err(ReactorError::Invalid("io watch mask must be non-empty"));
        }
        let existing = self.fds.borrow().contains_key(&fd);
        if !existing {
            let key = self.watches.borrow_mut().insert(Slot {
                fd,
                mask: Cell::new(mask),
                is_master: Cell::new(true),
                hup_streak: Cell::new(0),
                callback: RefCell::new(Some(callback)),
            });
            let edge = matches!(trigger, TriggerMode::Edge);
            if let Err(e) = self.readiness.add(fd, mask, edge) {
                self.watches.borrow_mut().mark_dead(key);
                self.watches.borrow_mut().sweep();
                return Err(e);
            }
            self.fds.borrow_mut().insert(fd, FdEntry { master: Cell::new(key), slaves: RefCell::new(Vec::new()), trigger });
            Ok(key)
        } else {
            let key = self.watches.borrow_mut().insert(Slot {
                fd,
                mask: Cell::new(mask),
                is_master: Cell::new(false),
                hup_streak: Cell::new(0),
                callback: RefCell::new(Some(callback)),
            });
            if let Some(entry) = self.fds.borrow().get(&fd) {
                entry.slaves.borrow_mut().push(key);
            }
            self.resync_master_registration(fd)?;
            Ok(key)
        }
    }

    /// Recompute the kernel-facing mask for `fd` as the union of its
    /// master's and every live slave's interest, so widening a slave's
    /// mask (or adding a new slave) still reaches the kernel even though
    /// only the master's registration exists there.
    fn resync_master_registration(&self, fd: RawFd) -> Result<()> {
        let Some(union_and_trigger) = self.fds.borrow().get(&fd).map(|entry| {
            let watches = self.watches.borrow();
            let mut union = Mask::empty();
            if let Some(master) = watches.get(entry.master.get()) {
                union |= master.mask.get();
            }
            for &slave in entry.slaves.borrow().iter() {
                if let Some(slot) = watches.get(slave) {
                    union |= slot.mask.get();
                }
            }
            (union, matches!(entry.trigger, TriggerMode::Edge))
        }) else {
            return Ok(());
        };
        self.readiness.modify(fd, union_and_trigger.0, union_and_trigger.1)
    }

    /// Remove a watch. If it was the master, promotes the oldest remaining
    /// slave to master (re-registering with the kernel) or, if none
    /// remain, drops the fd's kernel registration entirely.
    pub fn del(&self, key: Key) -> Result<()> {
        let Some((fd, was_master)) = self.watches.borrow().get(key).map(|slot| (slot.fd, slot.is_master.get())) else {
            return Ok(());
        };
        self.watches.borrow_mut().mark_dead(key);

        let promoted = {
            let fds = self.fds.borrow();
            let Some(entry) = fds.get(&fd) else {
                drop(fds);
                self.sweep_if_idle();
                return Ok(());
            };
            if was_master {
                let new_master = if entry.slaves.borrow().is_empty() { None } else { Some(entry.slaves.borrow_mut().remove(0)) };
                if let Some(new_master) = new_master {
                    entry.master.set(new_master);
                    if let Some(slot) = self.watches.borrow().get(new_master) {
                        slot.is_master.set(true);
                    }
                }
                new_master.is_some()
            } else {
                entry.slaves.borrow_mut().retain(|&k| k != key);
                true
            }
        };

        if was_master && !promoted {
            self.readiness.remove(fd)?;
            self.fds.borrow_mut().remove(&fd);
        } else {
            self.resync_master_registration(fd)?;
        }
        self.sweep_if_idle();
        Ok(())
    }

    fn sweep_if_idle(&self) {
        if self.busy.get() == 0 {
            self.watches.borrow_mut().sweep();
        }
    }

    pub fn modify_mask(&self, key: Key, mask: Mask) -> Result<()> {
        if mask.is_empty() {
            return Err(ReactorError::Invalid("io watch mask must be non-empty"));
        }
        let fd = match self.watches.borrow().get(key) {
            Some(slot) => {
                slot.mask.set(mask);
                slot.fd
            }
            None => return Ok(()),
        };
        self.resync_master_registration(fd)
    }

    /// Poll the kernel and invoke every ready watch's callback. Returns the
    /// number of fds that reported activity.
    pub fn dispatch(&self, timeout_ms: Option<i32>) -> Result<usize> {
        let ready = self.poll(timeout_ms)?;
        Ok(self.dispatch_ready(ready))
    }

    /// Block for up to `timeout_ms` and return the set of fds the kernel
    /// reported ready, without running any callback. Split out from
    /// [`Self::dispatch`] so the reactor can classify this iteration's
    /// wakeup reason (timer-driven if nothing came back, io-driven
    /// otherwise) before firing wakeup callbacks, while still deferring the
    /// actual io callback fan-out until after deferreds and timers.
    pub fn poll(&self, timeout_ms: Option<i32>) -> Result<Vec<(RawFd, Mask)>> {
        self.readiness.wait(timeout_ms)
    }

    /// Fan out a previously polled ready set. Returns the number of fds
    /// dispatched.
    pub fn dispatch_ready(&self, ready: Vec<(RawFd, Mask)>) -> usize {
        let n = ready.len();
        self.busy.set(self.busy.get() + 1);
        for (fd, kernel_events) in ready {
            self.dispatch_fd(fd, kernel_events);
        }
        self.busy.set(self.busy.get() - 1);
        self.sweep_if_idle();
        self.reap_hup_masters();
        n
    }

    fn dispatch_fd(&self, fd: RawFd, kernel_events: Mask) {
        let Some((master_key, slave_keys)) = self.fds.borrow().get(&fd).map(|e| (e.master.get(), e.slaves.borrow().clone())) else {
            return;
        };

        // HUP/ERR are always reported by the kernel regardless of a watch's
        // registered interest (see epoll::mask_to_epoll); track the streak
        // off the raw kernel event, not off what the master's mask claims.
        let hup_only = kernel_events.test(HUP) && kernel_events.difference(Mask::bit(HUP)).is_empty();

        let mut residual = kernel_events;
        if let Some(master_mask) = self.watches.borrow().get(master_key).map(|slot| slot.mask.get()) {
            let claimed = residual.intersect(master_mask);
            if !claimed.is_empty() {
                self.invoke_callback(master_key, claimed);
            }
            if let Some(slot) = self.watches.borrow().get(master_key) {
                slot.hup_streak.set(if hup_only { slot.hup_streak.get() + 1 } else { 0 });
            }
            residual = residual.difference(master_mask);
        }
        for slave in slave_keys {
            if residual.is_empty() {
                break;
            }
            let Some(slave_mask) = self.watches.borrow().get(slave).map(|slot| slot.mask.get()) else { continue };
            let claimed = residual.intersect(slave_mask);
            if !claimed.is_empty() {
                self.invoke_callback(slave, claimed);
                residual = residual.difference(slave_mask);
            }
        }
    }

    /// Take `key`'s callback out, invoke it with `claimed`, and put it back
    /// if the watch is still live (it may have deleted itself while it
    /// ran).
    fn invoke_callback(&self, key: Key, claimed: Mask) {
        let taken = {
            let watches = self.watches.borrow();
            watches.get(key).and_then(|slot| slot.callback.borrow_mut().take())
        };
        let Some(mut callback) = taken else { return };
        callback(self, claimed);
        let watches = self.watches.borrow();
        if let Some(slot) = watches.get(key) {
            *slot.callback.borrow_mut() = Some(callback);
        }
    }

    fn reap_hup_masters(&self) {
        if self.hup_threshold == 0 {
            return;
        }
        let stale: Vec<Key> = {
            let watches = self.watches.borrow();
            watches.iter_live().filter(|(_, slot)| slot.is_master.get() && slot.hup_streak.get() >= self.hup_threshold).map(|(key, _)| key).collect()
        };
        for key in stale {
            let _ = self.del(key);
        }
    }

    pub fn is_live(&self, key: Key) -> bool {
        self.watches.borrow().is_live(key)
    }

    pub fn len_live(&self) -> usize {
        self.watches.borrow().len_live()
    }
}

#[cfg(test)]
#[path = "io_tests.rs"]
mod tests;
