// SPDX-License-Identifier: MIT

#![allow(unsafe_code)]

use std::os::fd::{AsRawFd, FromRawFd, RawFd};
use std::os::unix::net::UnixDatagram;

use super::{Accepted, Backend, PeerCred};
use crate::address::Address;
use crate::error::{Result, TransportError};

/// `SOCK_DGRAM` over `AF_UNIX` (spec §4.3's "datagram-unix" backend). Unlike
/// the stream backend there is no `accept`: every bound socket both sends
/// and receives, addressed by its bind path (the "connectionless" model the
/// app-client side of this protocol uses, per spec §6).
#[derive(Debug)]
pub struct DatagramUnixBackend {
    socket: Option<UnixDatagram>,
}

impl DatagramUnixBackend {
    pub fn new() -> Self {
        Self { socket: None }
    }

    pub fn from_raw_fd(fd: RawFd) -> Result<Self> {
        // SAFETY: see `StreamUnixBackend::from_raw_fd`.
        let socket = unsafe { UnixDatagram::from_raw_fd(fd) };
        socket.set_nonblocking(true)?;
        Ok(Self { socket: Some(socket) })
    }
}

impl Default for DatagramUnixBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn path_of<'a>(addr: &'a Address, spec: &str) -> Result<&'a std::path::Path> {
    match addr {
        Address::DatagramUnix(path) => Ok(path.as_path()),
        _ => Err(TransportError::BadAddress(spec.to_string())),
    }
}

impl Backend for DatagramUnixBackend {
    fn bind(&mut self, addr: &Address) -> Result<()> {
        let path = path_of(addr, "datagram-unix bind")?;
        let _ = std::fs::remove_file(path);
        let socket = UnixDatagram::bind(path)?;
        socket.set_nonblocking(true)?;
        self.socket = Some(socket);
        Ok(())
    }

    fn listen(&mut self, _backlog: i32) -> Result<()> {
        Ok(())
    }

    fn accept(&mut self) -> Result<Option<Accepted>> {
        Err(TransportError::BadAddress("accept() is not meaningful on a datagram backend".into()))
    }

    fn connect(&mut self, addr: &Address) -> Result<()> {
        let path = path_of(addr, "datagram-unix connect")?;
        let socket = UnixDatagram::unbound()?;
        socket.connect(path)?;
        socket.set_nonblocking(true)?;
        self.socket = Some(socket);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.socket = None;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.socket = None;
        Ok(())
    }

    fn send_raw(&mut self, buf: &[u8]) -> Result<usize> {
        let socket = self.socket.as_ref().ok_or(TransportError::Closed)?;
        Ok(socket.send(buf)?)
    }

    fn send_raw_to(&mut self, buf: &[u8], addr: &Address) -> Result<usize> {
        let socket = self.socket.as_ref().ok_or(TransportError::Closed)?;
        let path = path_of(addr, "datagram-unix send_to")?;
        Ok(socket.send_to(buf, path)?)
    }

    fn recv_raw(&mut self, buf: &mut [u8]) -> Result<usize> {
        let socket = self.socket.as_ref().ok_or(TransportError::Closed)?;
        Ok(socket.recv(buf)?)
    }

    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_ref().map(|s| s.as_raw_fd()).unwrap_or(-1)
    }

    fn peer_cred(&self) -> Result<PeerCred> {
        Err(TransportError::NoPeerCred)
    }
}

#[cfg(test)]
#[path = "datagram_unix_tests.rs"]
mod tests;
