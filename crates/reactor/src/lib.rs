// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! iotfw-reactor: the single-threaded cooperative event loop (spec §3,
//! §4.1) — readiness multiplexing, timers, deferreds, signalfd-backed
//! signal handling, throttled wakeups, the in-process event bus, and
//! adaptation into a host-owned superloop.

mod bus;
mod deferred;
mod epoll;
mod error;
mod io;
mod reactor;
mod signal;
mod superloop;
mod timer;
mod wakeup;

pub use bus::{BusRegistry, EventCallback, EventId, Payload, MAX_EVENTS};
pub use deferred::{DeferredCallback, DeferredTable};
pub use error::{ReactorError, Result};
pub use io::{IoCallback, IoTable, TriggerMode, MASK_HUP, MASK_IN, MASK_OUT};
pub use reactor::Reactor;
pub use signal::{SignalCallback, SignalTable};
pub use superloop::SuperloopOps;
pub use timer::{TimerCallback, TimerTable};
pub use wakeup::{WakeupCallback, WakeupTable, WAKEUP_IO, WAKEUP_TIMER};

pub use nix::sys::signal::Signal;
