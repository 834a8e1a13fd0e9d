// SPDX-License-Identifier: MIT

//! Daemon → client event notifications (spec §4.8, §6). Unsolicited: always
//! carries `seqno: 0`, never answers a specific request.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Notification {
    Event { seqno: u64, event: EventBody },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventBody {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Notification {
    pub fn new(event: impl Into<String>, data: Option<Value>) -> Self {
        Notification::Event { seqno: 0, event: EventBody { event: event.into(), data } }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
