// SPDX-License-Identifier: MIT

//! Signal handlers delivered through the reactor loop rather than
//! asynchronous signal handlers (spec §4.1, §6).
//!
//! Every signal the reactor is asked to watch is first blocked with
//! `sigprocmask` so it can never interrupt arbitrary code, then folded into
//! a single `signalfd` that is itself registered as an ordinary io watch.
//! This keeps signal delivery on the same dispatch path as everything
//! else: no signal-safety restrictions, no global handler state.

use std::cell::Cell;
use std::collections::HashMap;
use std::os::fd::AsRawFd;
use std::rc::Rc;

use iotfw_core::{Arena, Key};
use nix::sys::signal::{SigSet, SigmaskHow, Signal};
use nix::sys::signalfd::{SfdFlags, SignalFd};

use crate::error::{ReactorError, Result};
use crate::io::{IoTable, TriggerMode, MASK_IN};

pub type SignalCallback = Box<dyn FnMut(Signal) + 'static>;

struct Entry {
    signal: Signal,
    callback: SignalCallback,
}

pub struct SignalTable {
    handlers: Arena<Entry>,
    by_signal: HashMap<Signal, Vec<Key>>,
    blocked: SigSet,
    signalfd: Option<SignalFd>,
    io_key: Option<Key>,
    ready: Rc<Cell<bool>>,
}

impl Default for SignalTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalTable {
    pub fn new() -> Self {
        Self {
            handlers: Arena::new(),
            by_signal: HashMap::new(),
            blocked: SigSet::empty(),
            signalfd: None,
            io_key: None,
            ready: Rc::new(Cell::new(false)),
        }
    }

    /// Register a callback for `signal`, blocking it process-wide and
    /// (re)creating the backing `signalfd` to cover the new mask.
    pub fn add(&mut self, signal: Signal, callback: SignalCallback) -> Result<Key> {
        let key = self.handlers.insert(Entry { signal, callback });
        self.by_signal.entry(signal).or_default().push(key);
        if let Err(e) = self.sync_mask() {
            self.handlers.mark_dead(key);
            self.handlers.sweep();
            return Err(e);
        }
        Ok(key)
    }

    pub fn del(&mut self, key: Key) -> Result<()> {
        if let Some(entry) = self.handlers.get(key) {
            if let Some(list) = self.by_signal.get_mut(&entry.signal) {
                list.retain(|&k| k != key);
            }
        }
        self.handlers.mark_dead(key);
        self.handlers.sweep();
        self.sync_mask()
    }

    /// Recompute the set of blocked signals from every live handler and
    /// rebuild the `signalfd` to match. Called after every add/del since
    /// `signalfd` has no incremental update API.
    fn sync_mask(&mut self) -> Result<()> {
        let mut mask = SigSet::empty();
        for (_, entry) in self.handlers.iter_live() {
            mask.add(entry.signal);
        }
        self.blocked = mask;
        nix::sys::signal::pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&mask), None)
            .map_err(|e| ReactorError::Resource(format!("sigprocmask failed: {e}")))?;
        if mask.is_empty() {
            self.signalfd = None;
        } else {
            let fd = SignalFd::with_flags(&mask, SfdFlags::SFD_CLOEXEC | SfdFlags::SFD_NONBLOCK)
                .map_err(|e| ReactorError::Resource(format!("signalfd failed: {e}")))?;
            self.signalfd = Some(fd);
        }
        Ok(())
    }

    /// Register (or re-register) the signalfd with the io table as a
    /// master watch. Must be called after construction and again whenever
    /// `sync_mask` replaces the underlying fd. The watch's callback only
    /// flips a shared flag — it cannot borrow `self` mutably — so the
    /// reactor must call [`SignalTable::drain`] once per iteration after
    /// [`SignalTable::take_ready`] reports the flag set.
    pub fn attach(&mut self, io: &IoTable) -> Result<()> {
        if let Some(key) = self.io_key.take() {
            io.del(key)?;
        }
        let Some(fd) = &self.signalfd else { return Ok(()) };
        let raw = fd.as_raw_fd();
        let ready = self.ready.clone();
        let key = io.add(
            raw,
            iotfw_core::Mask::bit(MASK_IN),
            TriggerMode::Level,
            Box::new(move |_, _| ready.set(true)),
        )?;
        self.io_key = Some(key);
        Ok(())
    }

    /// Returns whether the signalfd has reported activity since the last
    /// call, clearing the flag.
    pub fn take_ready(&self) -> bool {
        self.ready.replace(false)
    }

    /// Drain every pending signal from the signalfd and invoke the
    /// matching live handlers.
    pub fn drain(&mut self) -> Result<()> {
        let Some(fd) = self.signalfd.as_mut() else { return Ok(()) };
        loop {
            match fd.read_signal() {
                Ok(Some(info)) => {
                    let Ok(signal) = Signal::try_from(info.ssi_signo as i32) else { continue };
                    let Some(keys) = self.by_signal.get(&signal).cloned() else { continue };
                    for key in keys {
                        if let Some(entry) = self.handlers.get_mut(key) {
                            (entry.callback)(signal);
                        }
                    }
                }
                Ok(None) => break,
                Err(nix::errno::Errno::EAGAIN) => break,
                Err(e) => return Err(ReactorError::Resource(format!("signalfd read failed: {e}"))),
            }
        }
        Ok(())
    }

    pub fn is_blocked(&self, signal: Signal) -> bool {
        self.blocked.contains(signal)
    }

    pub fn is_live(&self, key: Key) -> bool {
        self.handlers.is_live(key)
    }
}

#[cfg(test)]
#[path = "signal_tests.rs"]
mod tests;
