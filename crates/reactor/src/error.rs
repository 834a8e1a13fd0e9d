// SPDX-License-Identifier: MIT

//! Reactor error classification (spec §7: invalid input vs. resource
//! exhaustion for everything the reactor itself can reject).

#[derive(Debug, thiserror::Error)]
pub enum ReactorError {
    #[error("invalid argument: {0}")]
    Invalid(&'static str),

    #[error("resource error: {0}")]
    Resource(String),
}

pub type Result<T> = std::result::Result<T, ReactorError>;
