// SPDX-License-Identifier: MIT

#![allow(unsafe_code)]

use std::net::{Shutdown, TcpListener, TcpStream};
use std::os::fd::{AsRawFd, FromRawFd, RawFd};

use super::{Accepted, Backend, PeerCred};
use crate::address::Address;
use crate::error::{Result, TransportError};

#[derive(Debug)]
enum State {
    Unbound,
    Listening(TcpListener),
    Connected(TcpStream),
    Closed,
}

/// Plain TCP (spec §4.3's "TCP" backend) — no peer-credential support; the
/// kernel has nothing comparable to `SO_PEERCRED` across a TCP connection.
#[derive(Debug)]
pub struct TcpBackend {
    state: State,
}

impl TcpBackend {
    pub fn new() -> Self {
        Self { state: State::Unbound }
    }

    pub fn from_raw_fd(fd: RawFd) -> Result<Self> {
        // SAFETY: see `StreamUnixBackend::from_raw_fd`.
        let listener = unsafe { TcpListener::from_raw_fd(fd) };
        listener.set_nonblocking(true)?;
        Ok(Self { state: State::Listening(listener) })
    }
}

impl Default for TcpBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn socket_addr(addr: &Address, spec: &str) -> Result<std::net::SocketAddr> {
    match addr {
        Address::Tcp(a) => Ok(*a),
        _ => Err(TransportError::BadAddress(spec.to_string())),
    }
}

impl Backend for TcpBackend {
    fn bind(&mut self, addr: &Address) -> Result<()> {
        let listener = TcpListener::bind(socket_addr(addr, "tcp bind")?)?;
        listener.set_nonblocking(true)?;
        self.state = State::Listening(listener);
        Ok(())
    }

    fn listen(&mut self, _backlog: i32) -> Result<()> {
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
                Ok(Some(Accepted { backend: Box::new(TcpBackend { state: State::Connected(stream) }) }))
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn connect(&mut self, addr: &Address) -> Result<()> {
        let stream = TcpStream::connect(socket_addr(addr, "tcp connect")?)?;
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

    fn is_listening(&self) -> bool {
        matches!(self.state, State::Listening(_))
    }
}

#[cfg(test)]
#[path = "tcp_tests.rs"]
mod tests;
