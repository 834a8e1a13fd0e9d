// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("socket option error: {0}")]
    Sys(#[from] nix::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] iotfw_wire::ProtocolError),
    #[error("unrecognised transport address '{0}'")]
    BadAddress(String),
    #[error("peer credentials are not available on this backend")]
    NoPeerCred,
    #[error("peer security label is not available on this backend")]
    NoPeerSecurityLabel,
    #[error("transport is closed")]
    Closed,
    #[error("message exceeds maximum size before a frame boundary was found")]
    TooLarge,
}

pub type Result<T> = std::result::Result<T, TransportError>;
