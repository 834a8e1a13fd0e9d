// SPDX-License-Identifier: MIT

//! Backend vtable (spec §4.3): `{open, create_from_backend, bind, listen,
//! accept, connect, disconnect, close, setopt, send_raw, send_raw_to,
//! send_json, send_json_to}`. Modelled as a trait object the way the
//! teacher's (and the design notes') "tagged enum + small trait-object set"
//! guidance prescribes for polymorphic backends, rather than a literal
//! struct of function pointers.

mod datagram_unix;
mod internal;
mod stream_unix;
mod tcp;

pub use datagram_unix::DatagramUnixBackend;
pub use internal::InternalBackend;
pub use stream_unix::StreamUnixBackend;
pub use tcp::TcpBackend;

use std::os::fd::RawFd;

use crate::address::Address;
use crate::error::Result;

/// Credentials of the peer on the other end of a connected backend (spec
/// §4.3 `getopt(t, "peer-cred")`), sourced from the kernel's
/// `SO_PEERCRED`/`getpeereid` rather than anything the peer asserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerCred {
    pub uid: u32,
    pub gid: u32,
    pub pid: i32,
}

/// One accepted or connected endpoint, plus whatever the backend needed to
/// accept or connect it (address of the peer, if meaningful).
pub struct Accepted {
    pub backend: Box<dyn Backend>,
}

/// A transport backend family (spec §4.3): stream-unix, datagram-unix, tcp,
/// internal loopback. Each concrete type implements exactly the operations
/// that make sense for it; operations that don't (e.g. `listen` on a
/// connection-oriented backend already connected by `connect`) return
/// [`crate::error::TransportError`] rather than panicking.
pub trait Backend: std::fmt::Debug + Send {
    /// Bind to `addr` in preparation for `listen`/`accept` (connection-mode
    /// backends) or to receive datagrams at a fixed address (datagram-mode).
    fn bind(&mut self, addr: &Address) -> Result<()>;

    /// Start listening after `bind`. A no-op for datagram/internal backends.
    fn listen(&mut self, backlog: i32) -> Result<()>;

    /// Accept one pending connection, if any (connection-mode only).
    /// Returns `None` when called on a backend with nothing pending; the
    /// reactor only calls this from an io watch fired by readability.
    fn accept(&mut self) -> Result<Option<Accepted>>;

    /// Actively connect to `addr` (client side).
    fn connect(&mut self, addr: &Address) -> Result<()>;

    /// Shut down the connection without releasing backend resources.
    fn disconnect(&mut self) -> Result<()>;

    /// Release all backend resources. Idempotent.
    fn close(&mut self) -> Result<()>;

    fn send_raw(&mut self, buf: &[u8]) -> Result<usize>;

    /// Send to an explicit peer (datagram backends only).
    fn send_raw_to(&mut self, _buf: &[u8], _addr: &Address) -> Result<usize> {
        Err(crate::error::TransportError::Closed)
    }

    fn recv_raw(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// The fd the reactor should register an io watch on.
    fn as_raw_fd(&self) -> RawFd;

    /// Whether this backend is presently in its listening (accept-only)
    /// state, so [`crate::transport::Transport::poll`] knows to drain
    /// `accept()` rather than `recv_raw()` on readability.
    fn is_listening(&self) -> bool {
        false
    }

    fn peer_cred(&self) -> Result<PeerCred> {
        Err(crate::error::TransportError::NoPeerCred)
    }

    /// Peer security label (spec §4.3 `getopt(t, "peer-sec")`). SMACK/SELinux
    /// labels have no portable kernel API outside Linux LSM xattrs; backends
    /// that can't provide one return `Err`, same as the missing-peer-cred
    /// case, rather than fabricating a value.
    fn peer_security_label(&self) -> Result<String> {
        Err(crate::error::TransportError::NoPeerSecurityLabel)
    }
}

/// Create a backend for the given address's family. Connection-mode callers
/// then `bind`+`listen` (server) or `connect` (client) on the result.
pub fn open(addr: &Address) -> Box<dyn Backend> {
    match addr {
        Address::StreamUnix(_) => Box::new(StreamUnixBackend::new()),
        Address::DatagramUnix(_) => Box::new(DatagramUnixBackend::new()),
        Address::Tcp(_) => Box::new(TcpBackend::new()),
        Address::Internal(_) => Box::new(InternalBackend::new()),
    }
}

/// Adopt a pre-opened fd handed down by a supervising init (socket
/// activation, spec.md §6 / SPEC_FULL.md §3) instead of binding a fresh one.
/// `family` selects which concrete backend wraps it.
pub fn create_from_fd(family: &Address, fd: RawFd) -> Result<Box<dyn Backend>> {
    match family {
        Address::StreamUnix(_) => Ok(Box::new(StreamUnixBackend::from_raw_fd(fd)?)),
        Address::DatagramUnix(_) => Ok(Box::new(DatagramUnixBackend::from_raw_fd(fd)?)),
        Address::Tcp(_) => Ok(Box::new(TcpBackend::from_raw_fd(fd)?)),
        Address::Internal(_) => Err(crate::error::TransportError::BadAddress("internal backends have no fd to adopt".into())),
    }
}
