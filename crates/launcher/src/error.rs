// SPDX-License-Identifier: MIT

//! Launcher-level error classification (spec §7). Every variant maps onto a
//! POSIX errno carried in a [`iotfw_wire::Status::status`] field — the wire
//! protocol has no separate error-code space of its own.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LauncherError {
    #[error("malformed request: {0}")]
    Invalid(&'static str),

    #[error("permission denied: {0}")]
    Denied(&'static str),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already in progress: {0}")]
    Busy(&'static str),

    #[error("resource exhausted: {0}")]
    Resource(&'static str),

    #[error("privilege oracle unavailable")]
    OracleUnavailable,

    #[error("manifest error: {0}")]
    Manifest(#[from] iotfw_manifest::ManifestError),

    #[error("cgroup controller error: {0}")]
    Cgroup(#[from] crate::cgroup::CgroupError),

    #[error("transport error: {0}")]
    Transport(#[from] iotfw_transport::TransportError),

    #[error("reactor error: {0}")]
    Reactor(#[from] iotfw_reactor::ReactorError),
}

impl LauncherError {
    /// The errno this error is reported to a client as (spec §7's
    /// classification table).
    pub fn errno(&self) -> i32 {
        match self {
            LauncherError::Invalid(_) => libc::EINVAL,
            LauncherError::Denied(_) => libc::EPERM,
            LauncherError::NotFound(_) => libc::ENOENT,
            LauncherError::Busy(_) => libc::EBUSY,
            LauncherError::Resource(_) => libc::ENOMEM,
            LauncherError::OracleUnavailable => libc::ENOTCONN,
            LauncherError::Manifest(_) => libc::ENOENT,
            LauncherError::Cgroup(_) => libc::EIO,
            LauncherError::Transport(_) => libc::EIO,
            LauncherError::Reactor(_) => libc::EIO,
        }
    }

    pub fn to_reply(&self, seqno: u64) -> iotfw_wire::Reply {
        iotfw_wire::Reply::error(seqno, self.errno(), self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LauncherError>;
