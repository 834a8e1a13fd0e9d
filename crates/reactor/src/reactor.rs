// SPDX-License-Identifier: MIT

//! The reactor: one cooperative loop multiplexing io readiness, timers,
//! deferreds, signals, wakeups, and the event bus (spec §3, §4.1).
//!
//! Generic over [`Clock`] the same way the teacher's `Runtime<A, N, C>`
//! is generic over its clock — production code uses [`SystemClock`], tests
//! use [`FakeClock`] to drive timers/wakeups deterministically without
//! real sleeps.
//!
//! Within one iteration callbacks fire in a fixed order — wakeups,
//! deferreds, timers, then io — and insertion order within each kind
//! (spec §6 "Ordering").

use std::rc::Rc;
use std::time::Instant;

use iotfw_core::{Clock, Key, Mask, SystemClock};
use nix::sys::signal::Signal;

use crate::bus::{BusRegistry, EventId, Payload};
use crate::deferred::{DeferredCallback, DeferredTable};
use crate::error::Result;
use crate::io::{IoCallback, IoTable, TriggerMode};
use crate::signal::{SignalCallback, SignalTable};
use crate::superloop::SuperloopOps;
use crate::timer::{TimerCallback, TimerTable};
use crate::wakeup::{WakeupCallback, WakeupTable, WAKEUP_IO, WAKEUP_TIMER};

/// Consecutive HUP-only dispatches before a master io watch is
/// auto-unregistered. Matches the source's default busy-loop guard.
const DEFAULT_HUP_THRESHOLD: u32 = 16;

pub struct Reactor<C: Clock = SystemClock> {
    clock: C,
    start: Instant,
    io: IoTable,
    timers: TimerTable,
    deferreds: DeferredTable,
    signals: SignalTable,
    wakeups: WakeupTable,
    bus: Rc<BusRegistry>,
    pump_key: Key,
    quit: bool,
    exit_code: i32,
    superloop: Option<Box<dyn SuperloopOps>>,
}

impl Reactor<SystemClock> {
    pub fn new() -> Result<Self> {
        Self::with_clock(SystemClock)
    }
}

impl<C: Clock> Reactor<C> {
    pub fn with_clock(clock: C) -> Result<Self> {
        let deferreds = DeferredTable::new();
        let bus = Rc::new(BusRegistry::new());
        let pump_bus = bus.clone();
        let pump_key = deferreds.add(false, Box::new(move |_| pump_bus.drain_pending()));
        let mut signals = SignalTable::new();
        let io = IoTable::new(DEFAULT_HUP_THRESHOLD)?;
        signals.attach(&io)?;
        Ok(Self {
            clock,
            start: Instant::now(),
            io,
            timers: TimerTable::new(),
            deferreds,
            signals,
            wakeups: WakeupTable::new(),
            bus,
            pump_key,
            quit: false,
            exit_code: 0,
            superloop: None,
        })
    }

    pub fn now_usec(&self) -> i64 {
        self.clock.now().saturating_duration_since(self.start).as_micros() as i64
    }

    pub fn bus(&self) -> &Rc<BusRegistry> {
        &self.bus
    }

    // -- io -----------------------------------------------------------

    pub fn add_io_watch(&mut self, fd: std::os::fd::RawFd, mask: Mask, trigger: TriggerMode, callback: IoCallback) -> Result<Key> {
        self.io.add(fd, mask, trigger, callback)
    }

    pub fn del_io_watch(&mut self, key: Key) -> Result<()> {
        self.io.del(key)
    }

    pub fn modify_io_watch(&mut self, key: Key, mask: Mask) -> Result<()> {
        self.io.modify_mask(key, mask)
    }

    // -- timers ---------------------------------------------------------

    pub fn add_timer(&mut self, delay_usec: i64, period_usec: Option<i64>, callback: TimerCallback) -> Result<Key> {
        let expire = self.now_usec() + delay_usec;
        self.timers.add(expire, period_usec, callback)
    }

    pub fn mod_timer(&mut self, key: Key, delay_usec: i64) -> Result<()> {
        let expire = self.now_usec() + delay_usec;
        self.timers.rearm(key, expire)
    }

    pub fn del_timer(&mut self, key: Key) {
        self.timers.del(key);
    }

    // -- deferreds --------------------------------------------------------

    pub fn add_deferred(&mut self, start_enabled: bool, callback: DeferredCallback) -> Key {
        self.deferreds.add(start_enabled, callback)
    }

    pub fn enable_deferred(&mut self, key: Key) {
        self.deferreds.enable(key);
    }

    pub fn disable_deferred(&mut self, key: Key) {
        self.deferreds.disable(key);
    }

    pub fn del_deferred(&mut self, key: Key) {
        self.deferreds.del(key);
    }

    // -- signals ----------------------------------------------------------

    pub fn add_sighandler(&mut self, signal: Signal, callback: SignalCallback) -> Result<Key> {
        let key = self.signals.add(signal, callback)?;
        self.signals.attach(&self.io)?;
        Ok(key)
    }

    pub fn del_sighandler(&mut self, key: Key) -> Result<()> {
        self.signals.del(key)?;
        self.signals.attach(&self.io)
    }

    // -- wakeups ------------------------------------------------------------

    /// Register a wakeup that fires automatically on every loop iteration
    /// whose wakeup reason (see [`crate::wakeup`]) intersects `event_mask`,
    /// no more than once per `lpf_ms`, optionally force-refreshed every
    /// `force_ms` while throttled.
    pub fn add_wakeup(&mut self, event_mask: Mask, lpf_ms: Option<u64>, force_ms: Option<u64>, callback: WakeupCallback) -> Result<Key> {
        self.wakeups.add(event_mask, lpf_ms, force_ms, callback)
    }

    pub fn del_wakeup(&mut self, key: Key) {
        self.wakeups.del(key);
    }

    // -- event bus ------------------------------------------------------------

    pub fn emit_sync(&self, id: EventId, payload: Payload) {
        self.bus.emit_sync(id, payload);
    }

    pub fn emit_async(&mut self, bus_name: &str, id: EventId, payload: Payload) {
        self.bus.emit_async(bus_name, id, payload);
        self.deferreds.enable(self.pump_key);
    }

    // -- superloop adaptation --------------------------------------------

    pub fn set_superloop(&mut self, host: Box<dyn SuperloopOps>) {
        self.superloop = Some(host);
    }

    pub fn clear_superloop(&mut self) -> Result<()> {
        if let Some(mut host) = self.superloop.take() {
            host.unregister()?;
        }
        Ok(())
    }

    // -- the loop itself --------------------------------------------------

    pub fn quit(&mut self, exit_code: i32) {
        self.quit = true;
        self.exit_code = exit_code;
    }

    fn compute_timeout_ms(&mut self) -> Option<i32> {
        if self.deferreds.has_enabled() {
            return Some(0);
        }
        let now = self.now_usec();
        let candidates = [self.timers.next_expiry(), self.wakeups.next_expiry()];
        let nearest = candidates.into_iter().flatten().min()?;
        let remaining_usec = (nearest - now).max(0);
        Some(((remaining_usec + 999) / 1000) as i32)
    }

    /// Run exactly one pass. Order matches spec §4.1's iteration algorithm:
    /// the forced-refresh half of the wakeup contract runs first (it does
    /// not depend on how this pass wakes), then the loop blocks in
    /// `epoll_wait` for at most the nearest remaining deadline, classifying
    /// the wakeup reason from whether anything came back; reason-matching
    /// wakeups fire, then pending deferreds, then due timers, and finally
    /// the io callbacks for the descriptors already polled (including
    /// signals, delivered through the signalfd io watch).
    ///
    /// A host superloop bypasses this table's own poll step entirely (it
    /// owns fd readiness itself), so under `set_superloop` the reason-based
    /// half of the wakeup contract does not fire — only the forced refresh
    /// does.
    pub fn iterate(&mut self) -> Result<()> {
        let now = self.now_usec();
        self.wakeups.fire_due(now);

        if let Some(host) = self.superloop.as_mut() {
            host.poll_io()?;
            self.deferreds.run_pending();
            let now = self.now_usec();
            self.timers.fire_due(now);
        } else {
            let timeout = self.compute_timeout_ms();
            let ready = self.io.poll(timeout)?;
            let now = self.now_usec();
            let reason = if ready.is_empty() { Mask::bit(WAKEUP_TIMER) } else { Mask::bit(WAKEUP_IO) };
            self.wakeups.fire_for_reason(reason, now);
            self.deferreds.run_pending();
            let now = self.now_usec();
            self.timers.fire_due(now);
            self.io.dispatch_ready(ready);
        }

        if self.signals.take_ready() {
            self.signals.drain()?;
        }
        Ok(())
    }

    /// Run until [`Reactor::quit`] is called, returning the exit code it
    /// was given.
    pub fn run(&mut self) -> Result<i32> {
        while !self.quit {
            self.iterate()?;
        }
        Ok(self.exit_code)
    }
}

#[cfg(test)]
#[path = "reactor_tests.rs"]
mod tests;
