// SPDX-License-Identifier: MIT

//! "Internal loopback" backend (spec §4.3): in-process delivery between two
//! transports with no real kernel socket path involved, named by an
//! arbitrary string both ends dial. Implemented over `socketpair(2)` so it
//! still produces a real fd the reactor can register an io watch on — the
//! "internal" part is only that no filesystem path or network address is
//! needed to find the peer.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;

use super::{Accepted, Backend, PeerCred};
use crate::address::Address;
use crate::error::{Result, TransportError};

thread_local! {
    // Reactor is single-threaded (spec §5); a thread-local rendezvous table
    // is the direct analogue of the source's process-wide transport registry.
    static PENDING: RefCell<HashMap<String, VecDeque<UnixStream>>> = RefCell::new(HashMap::new());
}

#[derive(Debug)]
enum State {
    Unbound,
    Listening(String),
    Connected(UnixStream),
    Closed,
}

#[derive(Debug)]
pub struct InternalBackend {
    state: State,
}

impl InternalBackend {
    pub fn new() -> Self {
        Self { state: State::Unbound }
    }
}

impl Default for InternalBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn name_of<'a>(addr: &'a Address, spec: &str) -> Result<&'a str> {
    match addr {
        Address::Internal(name) => Ok(name.as_str()),
        _ => Err(TransportError::BadAddress(spec.to_string())),
    }
}

impl Backend for InternalBackend {
    fn bind(&mut self, addr: &Address) -> Result<()> {
        let name = name_of(addr, "internal bind")?.to_string();
        PENDING.with(|p| p.borrow_mut().entry(name.clone()).or_default());
        self.state = State::Listening(name);
        Ok(())
    }

    fn listen(&mut self, _backlog: i32) -> Result<()> {
        Ok(())
    }

    fn accept(&mut self) -> Result<Option<Accepted>> {
        let State::Listening(name) = &self.state else {
            return Err(TransportError::BadAddress("accept() called on a non-listening backend".into()));
        };
        let stream = PENDING.with(|p| p.borrow_mut().get_mut(name).and_then(VecDeque::pop_front));
        Ok(stream.map(|stream| Accepted { backend: Box::new(InternalBackend { state: State::Connected(stream) }) }))
    }

    fn connect(&mut self, addr: &Address) -> Result<()> {
        let name = name_of(addr, "internal connect")?;
        let (ours, theirs) = UnixStream::pair()?;
        ours.set_nonblocking(true)?;
        theirs.set_nonblocking(true)?;
        PENDING.with(|p| p.borrow_mut().entry(name.to_string()).or_default().push_back(theirs));
        self.state = State::Connected(ours);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.state = State::Closed;
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
            State::Connected(stream) => stream.as_raw_fd(),
            State::Unbound | State::Listening(_) | State::Closed => -1,
        }
    }

    fn peer_cred(&self) -> Result<PeerCred> {
        let State::Connected(stream) = &self.state else {
            return Err(TransportError::NoPeerCred);
        };
        let cred = nix::sys::socket::getsockopt(stream, nix::sys::socket::sockopt::PeerCredentials)?;
        Ok(PeerCred { uid: cred.uid(), gid: cred.gid(), pid: cred.pid() })
    }

    fn is_listening(&self) -> bool {
        matches!(self.state, State::Listening(_))
    }
}

#[cfg(test)]
#[path = "internal_tests.rs"]
mod tests;
