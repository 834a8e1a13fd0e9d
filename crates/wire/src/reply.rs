// SPDX-License-Identifier: MIT

//! Daemon → client replies (spec §6, §7). The wire only ever carries one
//! reply shape, `status`, whose `status` field is 0 on success or a POSIX
//! errno on failure (spec §7's error classification).

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Reply {
    Status { seqno: u64, status: Status },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Status {
    pub status: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Reply {
    pub const OK: i32 = 0;

    pub fn ok(seqno: u64, data: Option<Value>) -> Self {
        Reply::Status { seqno, status: Status { status: Self::OK, message: String::new(), data } }
    }

    pub fn error(seqno: u64, status: i32, message: impl Into<String>) -> Self {
        Reply::Status { seqno, status: Status { status, message: message.into(), data: None } }
    }

    pub fn seqno(&self) -> u64 {
        match self {
            Reply::Status { seqno, .. } => *seqno,
        }
    }

    pub fn is_ok(&self) -> bool {
        match self {
            Reply::Status { status, .. } => status.status == Self::OK,
        }
    }
}

#[cfg(test)]
#[path = "reply_tests.rs"]
mod tests;
