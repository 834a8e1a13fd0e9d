// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! iotfw-transport: framed JSON messages over stream/datagram sockets
//! (spec §4.3).
//!
//! Layered in two halves: [`backend`] is the name-registered backend
//! vtable (stream-unix, datagram-unix, tcp, internal loopback) that talks
//! to the kernel; [`Transport`] wraps one backend with self-delimited
//! framing and destroy-safety. Neither half depends on `iotfw-reactor` —
//! registering a transport's fd with an io watch and driving `Transport::poll`
//! on readiness is the launcher crate's job (see DESIGN.md).

pub mod address;
pub mod backend;
pub mod error;
mod transport;

pub use address::{resolve, Address};
pub use backend::{Accepted, Backend, PeerCred};
pub use error::{Result, TransportError};
pub use transport::{CallbackGuard, Framing, Incoming, Transport, MAX_MESSAGE_BYTES};
