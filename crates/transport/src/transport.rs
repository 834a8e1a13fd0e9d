// SPDX-License-Identifier: MIT

//! The `Transport` wrapper (spec §4.3): self-delimited JSON (or raw)
//! framing plus destroy-safety layered over a [`Backend`].
//!
//! Framing mode is chosen at construction and is immutable thereafter (spec
//! §4.3 "Mode is selected in the flags at creation and is immutable
//! thereafter"). `Transport` itself never touches the reactor — the
//! `launcher` crate registers its fd with an io watch and calls
//! [`Transport::poll`] on readability, exactly the layering the backend
//! trait already keeps (no reactor dependency in this crate, see
//! DESIGN.md).
//!
//! Destroy safety (spec §4.3 "Destruction safety"): a transport may be
//! dropped from inside one of its own event callbacks. [`Transport::begin_callback`]
//! increments a `busy` counter around such an invocation;
//! [`Transport::request_destroy`] only closes the backend once `busy`
//! returns to zero. Callers must call [`Transport::check_destroy`] after
//! each delivered item and stop touching the transport if it returns true.

use std::cell::Cell;
use std::os::fd::RawFd;

use serde::Serialize;

use crate::backend::{Accepted, Backend, PeerCred};
use crate::error::{Result, TransportError};

/// Self-delimiting wire framing, shared with `iotfw-wire`'s message bound.
pub const MAX_MESSAGE_BYTES: usize = iotfw_wire::MAX_MESSAGE_BYTES;

/// How payloads on this transport are framed (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Opaque byte blobs, no delimiting beyond what the caller imposes.
    Raw,
    /// Self-delimited JSON objects; `poll` hands back complete values.
    Json,
}

/// One item produced by draining a transport's readiness.
#[derive(Debug)]
pub enum Incoming {
    Raw(Vec<u8>),
    Json(serde_json::Value),
    /// A listening backend accepted a new peer.
    Connection(Box<dyn Backend>),
    /// The peer went away (EOF, or a fatal read error).
    Closed,
}

/// A framed, destroy-safe wrapper over one [`Backend`] instance (spec
/// §4.3). Holds its own read buffer so partial JSON frames survive across
/// `poll` calls.
#[derive(Debug)]
pub struct Transport {
    backend: Box<dyn Backend>,
    framing: Framing,
    read_buf: Vec<u8>,
    busy: Cell<u32>,
    destroy_requested: Cell<bool>,
    closed: Cell<bool>,
}

/// RAII guard returned by [`Transport::begin_callback`]; decrements `busy`
/// on drop and, if a destroy was requested meanwhile, performs it.
pub struct CallbackGuard<'a> {
    transport: &'a Transport,
}

impl Drop for CallbackGuard<'_> {
    fn drop(&mut self) {
        let remaining = self.transport.busy.get() - 1;
        self.transport.busy.set(remaining);
        if remaining == 0 && self.transport.destroy_requested.get() {
            self.transport.closed.set(true);
        }
    }
}

impl Transport {
    pub fn new(backend: Box<dyn Backend>, framing: Framing) -> Self {
        Self {
            backend,
            framing,
            read_buf: Vec::new(),
            busy: Cell::new(0),
            destroy_requested: Cell::new(false),
            closed: Cell::new(false),
        }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.backend.as_raw_fd()
    }

    pub fn is_listening(&self) -> bool {
        self.backend.is_listening()
    }

    pub fn peer_cred(&self) -> Result<PeerCred> {
        self.backend.peer_cred()
    }

    pub fn peer_security_label(&self) -> Result<String> {
        self.backend.peer_security_label()
    }

    /// Enter a callback that may (re-entrantly) call [`Transport::request_destroy`]
    /// on this same transport. The caller must keep the guard alive for the
    /// duration of the callback and check [`Transport::check_destroy`]
    /// immediately afterward, per spec §4.3.
    pub fn begin_callback(&self) -> CallbackGuard<'_> {
        self.busy.set(self.busy.get() + 1);
        CallbackGuard { transport: self }
    }

    /// Mark the transport for teardown. If nothing is currently `busy`
    /// (no callback in flight) the backend is closed immediately;
    /// otherwise this only flips a flag a live [`CallbackGuard`] will act
    /// on when it drops.
    pub fn request_destroy(&mut self) {
        self.destroy_requested.set(true);
        if self.busy.get() == 0 {
            self.closed.set(true);
        }
    }

    /// Whether this transport has been torn down (by `request_destroy`
    /// with no callback in flight, or by a `CallbackGuard` drop that found
    /// one pending). Once true, backends must stop calling in.
    pub fn check_destroy(&self) -> bool {
        self.closed.get()
    }

    pub fn send_raw(&mut self, buf: &[u8]) -> Result<usize> {
        write_all_retrying(&mut *self.backend, buf)
    }

    /// Encode `value` as one JSON object and write it whole. Only valid in
    /// [`Framing::Json`] mode; raw-mode callers use [`Transport::send_raw`].
    pub fn send_json<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value).map_err(iotfw_wire::ProtocolError::from)?;
        write_all_retrying(&mut *self.backend, &bytes)?;
        Ok(())
    }

    pub fn send_raw_to(&mut self, buf: &[u8], addr: &crate::address::Address) -> Result<usize> {
        self.backend.send_raw_to(buf, addr)
    }

    /// Drain everything currently readable into zero or more [`Incoming`]
    /// items. A listening backend yields [`Incoming::Connection`] entries;
    /// a connected one yields framed payloads and, on EOF, a single
    /// trailing [`Incoming::Closed`]. Stops as soon as the backend reports
    /// `WouldBlock` or the caller has [`Transport::check_destroy`]-ed this
    /// transport mid-drain.
    pub fn poll(&mut self) -> Result<Vec<Incoming>> {
        if self.backend.is_listening() {
            return self.poll_accept();
        }
        let mut out = Vec::new();
        let mut buf = [0u8; 8192];
        loop {
            if self.check_destroy() {
                break;
            }
            match self.backend.recv_raw(&mut buf) {
                Ok(0) => {
                    out.push(Incoming::Closed);
                    break;
                }
                Ok(n) => self.consume(&buf[..n], &mut out)?,
                Err(TransportError::Io(ref e)) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(TransportError::Closed) => {
                    out.push(Incoming::Closed);
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(out)
    }

    fn poll_accept(&mut self) -> Result<Vec<Incoming>> {
        let mut out = Vec::new();
        loop {
            match self.backend.accept()? {
                Some(Accepted { backend }) => out.push(Incoming::Connection(backend)),
                None => break,
            }
        }
        Ok(out)
    }

    fn consume(&mut self, chunk: &[u8], out: &mut Vec<Incoming>) -> Result<()> {
        match self.framing {
            Framing::Raw => {
                out.push(Incoming::Raw(chunk.to_vec()));
                Ok(())
            }
            Framing::Json => {
                self.read_buf.extend_from_slice(chunk);
                if self.read_buf.len() > MAX_MESSAGE_BYTES {
                    return Err(TransportError::TooLarge);
                }
                loop {
                    let mut de = serde_json::Deserializer::from_slice(&self.read_buf).into_iter::<serde_json::Value>();
                    match de.next() {
                        Some(Ok(value)) => {
                            let consumed = de.byte_offset();
                            out.push(Incoming::Json(value));
                            self.read_buf.drain(..consumed);
                        }
                        // Not enough bytes yet for a complete object; wait
                        // for the next readable chunk.
                        Some(Err(e)) if e.is_eof() => break,
                        Some(Err(e)) => return Err(TransportError::Protocol(e.into())),
                        None => break,
                    }
                }
                Ok(())
            }
        }
    }
}

/// Retry a write across `EINTR`/partial writes (spec §7 "short writes are
/// retried"). Local sockets rarely produce a true `WouldBlock` for the
/// small JSON payloads this protocol sends; one is still propagated as an
/// error rather than spun on, since this reactor never blocks inside a
/// callback.
fn write_all_retrying(backend: &mut dyn Backend, buf: &[u8]) -> Result<usize> {
    let mut sent = 0;
    while sent < buf.len() {
        match backend.send_raw(&buf[sent..]) {
            Ok(0) => return Err(TransportError::Closed),
            Ok(n) => sent += n,
            Err(TransportError::Io(ref e)) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(sent)
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
