// SPDX-License-Identifier: MIT

//! Self-delimited JSON framing (spec §4.3: "each message is a self-delimited
//! object; the transport hands complete objects to `recv_json`"). There is
//! no length prefix: a message ends where its closing brace does, and
//! `serde_json`'s streaming deserializer — built for exactly this,
//! concatenated-JSON-on-a-stream — finds that boundary for us.
//!
//! The teacher's own IPC crate frames with a 4-byte length prefix instead;
//! that convention is dropped here because the spec is explicit about
//! self-delimiting framing, not a length-prefixed one, for this transport.

use std::io::{self, Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::reply::Reply;
use crate::request::Request;

/// Generous cap on a single message's JSON payload, applied while scanning
/// for its closing delimiter. The spec bounds manifests at 128 KiB (§6) but
/// is silent on wire message size; this is a multiple of that bound, large
/// enough for any request this protocol defines plus a `dbg` blob.
pub const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed or truncated json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialize `value` to one self-delimited JSON document.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(value)?)
}

/// Parse one self-delimited JSON document. Trailing bytes (the start of the
/// next message, if any) are ignored, matching `read_message`'s contract.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    let mut stream = serde_json::Deserializer::from_slice(bytes).into_iter::<T>();
    match stream.next() {
        Some(result) => result.map_err(Into::into),
        None => Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
    }
}

/// Write one JSON message with no framing beyond its own `{...}` boundary.
pub fn write_message<W: Write, T: Serialize>(w: &mut W, value: &T) -> Result<(), ProtocolError> {
    serde_json::to_writer(&mut *w, value)?;
    Ok(())
}

/// Read exactly one self-delimited JSON message from `r`, stopping at its
/// closing brace so a following call picks up the next message. `r` is
/// capped at [`MAX_MESSAGE_BYTES`] to bound how far a malformed or hostile
/// stream can be scanned before giving up.
pub fn read_message<R: Read, T: DeserializeOwned>(r: &mut R) -> Result<T, ProtocolError> {
    let bounded = r.by_ref().take(MAX_MESSAGE_BYTES as u64);
    let mut stream = serde_json::Deserializer::from_reader(bounded).into_iter::<T>();
    match stream.next() {
        Some(result) => result.map_err(Into::into),
        None => Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
    }
}

pub fn read_request<R: Read>(r: &mut R) -> Result<Request, ProtocolError> {
    read_message(r)
}

pub fn write_reply<W: Write>(w: &mut W, reply: &Reply) -> Result<(), ProtocolError> {
    write_message(w, reply)
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
