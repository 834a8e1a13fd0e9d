// SPDX-License-Identifier: MIT

#![allow(unsafe_code)]

//! Thin wrapper around the kernel readiness descriptor (`epoll`).
//!
//! This is the reactor's "readiness descriptor" (spec §3): one `epoll`
//! instance, created close-on-exec, that every registered fd is added to.
//! The `data` word of each registration is set to the fd itself rather
//! than a pointer to the watch, so dispatch always re-resolves through the
//! fd table (spec §4.1 "deletion discipline") instead of trusting a value
//! that might outlive the object it once pointed to.

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use iotfw_core::Mask;

use crate::error::{ReactorError, Result};

pub const IN: u32 = 0;
pub const OUT: u32 = 1;
pub const HUP: u32 = 2;

fn mask_to_epoll(mask: Mask, edge: bool) -> u32 {
    let mut bits = 0u32;
    if mask.test(IN) {
        bits |= libc::EPOLLIN as u32;
    }
    if mask.test(OUT) {
        bits |= libc::EPOLLOUT as u32;
    }
    // HUP/ERR are always reported by the kernel regardless of registration,
    // but we request them explicitly so callers can rely on seeing them.
    bits |= libc::EPOLLHUP as u32 | libc::EPOLLERR as u32;
    if edge {
        bits |= libc::EPOLLET as u32;
    }
    bits
}

fn epoll_to_mask(bits: u32) -> Mask {
    let mut mask = Mask::empty();
    if bits & libc::EPOLLIN as u32 != 0 {
        mask.set(IN);
    }
    if bits & libc::EPOLLOUT as u32 != 0 {
        mask.set(OUT);
    }
    if bits & (libc::EPOLLHUP as u32 | libc::EPOLLERR as u32) != 0 {
        mask.set(HUP);
    }
    mask
}

pub struct Readiness {
    fd: OwnedFd,
}

impl Readiness {
    pub fn new() -> Result<Self> {
        // SAFETY: epoll_create1 is a plain syscall wrapper; EPOLL_CLOEXEC is
        // a valid flag and the returned fd is owned exclusively by us.
        let raw = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if raw < 0 {
            return Err(ReactorError::Resource("epoll_create1 failed".into()));
        }
        // SAFETY: `raw` is a valid, freshly-created, owned fd.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };
        Ok(Self { fd })
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    fn ctl(&self, op: i32, fd: RawFd, mask: Mask, edge: bool) -> Result<()> {
        let mut ev = libc::epoll_event { events: mask_to_epoll(mask, edge), u64: fd as u64 };
        // SAFETY: `ev` is a valid epoll_event, `fd` and `self.fd` are valid
        // descriptors for the duration of the call.
        let rc = unsafe { libc::epoll_ctl(self.fd.as_raw_fd(), op, fd, &mut ev) };
        if rc < 0 {
            return Err(ReactorError::Resource(format!("epoll_ctl failed for fd {fd}")));
        }
        Ok(())
    }

    pub fn add(&self, fd: RawFd, mask: Mask, edge: bool) -> Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, mask, edge)
    }

    pub fn modify(&self, fd: RawFd, mask: Mask, edge: bool) -> Result<()> {
        self.ctl(libc::EPOLL_CTL_MOD, fd, mask, edge)
    }

    pub fn remove(&self, fd: RawFd) -> Result<()> {
        let mut ev = libc::epoll_event { events: 0, u64: 0 };
        // SAFETY: as above; passing a dummy event is permitted for CTL_DEL
        // on every kernel we target (pre-2.6.9 quirk does not apply).
        let rc = unsafe {
            libc::epoll_ctl(self.fd.as_raw_fd(), libc::EPOLL_CTL_DEL, fd, &mut ev)
        };
        if rc < 0 {
            return Err(ReactorError::Resource(format!("epoll_ctl(DEL) failed for fd {fd}")));
        }
        Ok(())
    }

    /// Block for at most `timeout_ms` (`None` = forever, `Some(0)` = return
    /// immediately) and return the ready `(fd, mask)` pairs. Tolerates
    /// `EINTR` by treating it as "no events ready".
    pub fn wait(&self, timeout_ms: Option<i32>) -> Result<Vec<(RawFd, Mask)>> {
        let mut events: [libc::epoll_event; 64] = unsafe { std::mem::zeroed() };
        let timeout = timeout_ms.unwrap_or(-1);
        // SAFETY: `events` buffer and its length match; epoll_wait only
        // writes within that bound.
        let n = unsafe {
            libc::epoll_wait(self.fd.as_raw_fd(), events.as_mut_ptr(), events.len() as i32, timeout)
        };
        if n < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(ReactorError::Resource(format!("epoll_wait failed: {err}")));
        }
        Ok(events[..n as usize].iter().map(|e| (e.u64 as RawFd, epoll_to_mask(e.events))).collect())
    }
}
