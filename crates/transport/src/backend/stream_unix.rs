// SPDX-License-Identifier: MIT

#![allow(unsafe_code)]

use std::net::Shutdown;
use std::os::fd::{AsRawFd, FromRawFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};

use nix::sys::socket::{getsockopt, sockopt::PeerCredentials};

use super::{Accepted, Backend, PeerCred};
use crate::address::Address;
use crate::error::{Result, TransportError};

#[derive(Debug)]
enum State {
    Unbound,
    Listening(UnixListener),
    Connected(UnixStream),
    Closed,
}

/// `SOCK_STREAM` over `AF_UNIX` (spec §4.3's "stream-unix" backend).
#[derive(Debug)]
pub struct StreamUnixBackend {
    state: State,
}

impl StreamUnixBackend {
    pub fn new() -> Self {
        Self { state: State::Unbound }
    }

    /// Adopt a pre-opened listening fd (socket activation, SPEC_FULL.md §3).
    pub fn from_raw_fd(fd: RawFd) -> Result<Self> {
        // SAFETY: caller (the supervising init via socket activation, or a
        // test) guarantees `fd` is a valid, open AF_UNIX SOCK_STREAM socket
        // it is handing over ownership of.
        let listener = unsafe { UnixListener::from_raw_fd(fd) };
        listener.set_nonblocking(true)?;
        Ok(Self { state: State::Listening(listener) })
    }
}

impl Default for StreamUnixBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn path_of<'a>(addr: &'a Address, spec: &str) -> Result<&'a std::path::Path> {
    match addr {
        Address::StreamUnix(path) => Ok(path.as_path()),
        _ => Err(TransportError::BadAddress(spec.to_string())),
    }
}

impl Backend for StreamUnixBackend {
    fn bind(&mut self, addr: &Address) -> Result<()> {
        let path = path_of(addr, "stream-unix bind")?;
        // Binding to a stale socket path from a previous, uncleanly
        // terminated run must not fail; remove it first like the source's
        // transport layer does before calling `bind(2)`.
        let _ = std::fs::remove_file(path);
        let listener = UnixListener::bind(path)?;
        listener.set_nonblocking(true)?;
        self.state = State::Listening(listener);
        Ok(())
    }

    fn listen(&mut self, _backlog: i32) -> Result<()> {
        // `UnixListener::bind` already listens; nothing further to do.
        match self.state {
            State::Listening(_) => Ok(()),
            _ => Err(TransportError::BadAddress("listen() called before bind()".into())),
        }
    }

    fn accept(&mut self) -> Result<Option<Accepted>> {
        let State::Listening(listener) = &self.state else {
            return Err(TransportError::BadAddress("accept() called on a non-listening backend".into()));
        };
        match listener.accept() {
            Ok((stream, _addr)) => {
                stream.set_nonblocking(true)?;
                Ok(Some(Accepted { backend: Box::new(StreamUnixBackend { state: State::Connected(stream) }) }))
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn connect(&mut self, addr: &Address) -> Result<()> {
        let path = path_of(addr, "stream-unix connect")?;
        let stream = UnixStream::connect(path)?;
        stream.set_nonblocking(true)?;
        self.state = State::Connected(stream);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        if let State::Connected(stream) = &self.state {
            let _ = stream.shutdown(Shutdown::Both);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.state = State::Closed;
        Ok(())
    }

    fn send_raw(&mut self, buf: &[u8]) -> Result<usize> {
        match &mut self.state {
            State::Connected(stream) => Ok(std::io::Write::write(stream, buf)?),
            _ => Err(TransportError::Closed),
        }
    }

    fn recv_raw(&mut self, buf: &mut [u8]) -> Result<usize> {
        match &mut self.state {
            State::Connected(stream) => Ok(std::io::Read::read(stream, buf)?),
            _ => Err(TransportError::Closed),
        }
    }

    fn as_raw_fd(&self) -> RawFd {
        match &self.state {
            State::Listening(listener) => listener.as_raw_fd(),
            State::Connected(stream) => stream.as_raw_fd(),
            State::Unbound | State::Closed => -1,
        }
    }

    fn peer_cred(&self) -> Result<PeerCred> {
        let State::Connected(stream) = &self.state else {
            return Err(TransportError::NoPeerCred);
        };
        let cred = getsockopt(stream, PeerCredentials)?;
        Ok(PeerCred { uid: cred.uid(), gid: cred.gid(), pid: cred.pid() })
    }

    fn is_listening(&self) -> bool {
        matches!(self.state, State::Listening(_))
    }
}

#[cfg(test)]
#[path = "stream_unix_tests.rs"]
mod tests;
