// SPDX-License-Identifier: MIT

//! Transport address resolution (spec §4.3's `resolve-fn`): turns a
//! `type:address` string, the form the launcher's configuration carries
//! (spec §6), into the concrete address a backend binds or connects to.

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::{Result, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// `unix:/path/to.sock` — `SOCK_STREAM` over `AF_UNIX`.
    StreamUnix(PathBuf),
    /// `unixd:/path/to.sock` — `SOCK_DGRAM` over `AF_UNIX`.
    DatagramUnix(PathBuf),
    /// `tcp:host:port`.
    Tcp(SocketAddr),
    /// `internal:name` — in-process delivery with no real socket; two
    /// backends dial the same name to get a connected pair.
    Internal(String),
}

/// Parse a `type:address` string into an [`Address`]. The type prefix picks
/// the backend family the way the source's `iot_transport_resolve` picks a
/// backend by registered type name.
pub fn resolve(spec: &str) -> Result<Address> {
    let (kind, rest) = spec.split_once(':').ok_or_else(|| TransportError::BadAddress(spec.to_string()))?;
    match kind {
        "unix" => Ok(Address::StreamUnix(PathBuf::from(rest))),
        "unixd" => Ok(Address::DatagramUnix(PathBuf::from(rest))),
        "tcp" => rest.parse().map(Address::Tcp).map_err(|_| TransportError::BadAddress(spec.to_string())),
        "internal" => Ok(Address::Internal(rest.to_string())),
        _ => Err(TransportError::BadAddress(spec.to_string())),
    }
}

#[cfg(test)]
#[path = "address_tests.rs"]
mod tests;
