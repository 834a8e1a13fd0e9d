// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! IPC protocol for the application launcher (spec §4.7, §6).
//!
//! Wire format: self-delimited JSON objects, one per message, with no
//! length prefix (spec §4.3). Every message carries `type` and `seqno`;
//! requests are client → daemon, the `status` reply answers a specific
//! `seqno`, `event` notifications are unsolicited and always carry
//! `seqno: 0`.

mod event;
mod reply;
mod request;
mod wire;

pub use event::{EventBody, Notification};
pub use reply::{Reply, Status};
pub use request::{ClientKind, Request};
pub use wire::{decode, encode, read_message, read_request, write_message, write_reply, ProtocolError, MAX_MESSAGE_BYTES};
