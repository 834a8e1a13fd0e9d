// SPDX-License-Identifier: MIT

//! Superloop adaptation (spec §4.1, §8 scenario #6): lets a host
//! application that already owns its own event loop drive this reactor's
//! watches/timers/deferreds through its own primitives instead of running
//! [`crate::Reactor::run`] itself.
//!
//! When a superloop is attached, the reactor stops touching its own
//! `epoll`/timer-heap directly for registration and instead calls out to
//! whatever the host provides. `poll_io` is optional because some hosts
//! (e.g. one that is purely callback-driven and never lets the reactor
//! block) have no concept of "poll now".

use std::os::fd::RawFd;

use iotfw_core::Mask;

use crate::error::Result;

/// Operations a host loop must expose to adopt this reactor's watches.
pub trait SuperloopOps {
    fn add_io(&mut self, fd: RawFd, mask: Mask) -> Result<()>;
    fn del_io(&mut self, fd: RawFd) -> Result<()>;
    fn mod_io(&mut self, fd: RawFd, mask: Mask) -> Result<()>;

    fn add_timer(&mut self, id: u64, expire_usec: i64) -> Result<()>;
    fn mod_timer(&mut self, id: u64, expire_usec: i64) -> Result<()>;
    fn del_timer(&mut self, id: u64) -> Result<()>;

    fn add_defer(&mut self, id: u64) -> Result<()>;
    fn del_defer(&mut self, id: u64) -> Result<()>;

    /// Ask the host to run one non-blocking poll pass right now, if it
    /// supports being driven synchronously. Hosts that are purely
    /// callback-scheduled can leave this as a no-op (the default).
    fn poll_io(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called once when the reactor detaches from this host (the reverse
    /// of whatever setup the host did when it was handed to
    /// [`crate::Reactor::set_superloop`]).
    fn unregister(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "superloop_tests.rs"]
mod tests;
