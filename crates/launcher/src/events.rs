// SPDX-License-Identifier: MIT

//! Event routing (spec §4.8): name interning plus destination-descriptor
//! matching against a client's identity.

use std::collections::HashMap;

/// An interned event id. Fits in a bounded table (default
/// [`DEFAULT_MAX_EVENTS`]) the way the source bounds its event-name table.
pub type EventId = u32;

pub const DEFAULT_MAX_EVENTS: usize = 1024;

/// Append-only event-name interning table (spec §4.8 "interned to an id on
/// first use"). Process-wide for the lifetime of the launcher (spec §9
/// "Global mutable state").
#[derive(Debug)]
pub struct EventTable {
    by_name: HashMap<String, EventId>,
    names: Vec<String>,
    max_events: usize,
}

impl EventTable {
    pub fn new(max_events: usize) -> Self {
        Self { by_name: HashMap::new(), names: Vec::new(), max_events }
    }

    /// Intern `name`, returning its id. Returns `None` once the table is
    /// full rather than growing without bound.
    pub fn intern(&mut self, name: &str) -> Option<EventId> {
        if let Some(&id) = self.by_name.get(name) {
            return Some(id);
        }
        if self.names.len() >= self.max_events {
            return None;
        }
        let id = self.names.len() as EventId;
        self.names.push(name.to_string());
        self.by_name.insert(name.to_string(), id);
        Some(id)
    }

    pub fn lookup(&self, name: &str) -> Option<EventId> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, id: EventId) -> Option<&str> {
        self.names.get(id as usize).map(String::as_str)
    }
}

impl Default for EventTable {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EVENTS)
    }
}

/// A client's identity as far as event routing cares (spec §4.8): the
/// fields a `send-event` destination descriptor can filter on.
#[derive(Debug, Clone, Default)]
pub struct ClientIdentity {
    pub label: Option<String>,
    pub appid: Option<String>,
    pub uid: u32,
    pub gid: u32,
    pub pid: i32,
}

/// A `send-event` request's optional target filter (spec §4.8, §6
/// `send-event`'s `{label?, appid?, user?, group?, process?}`). A field
/// left `None` is a wildcard; present fields are matched by conjunction.
#[derive(Debug, Clone, Default)]
pub struct Destination {
    pub label: Option<String>,
    pub appid: Option<String>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub pid: Option<i32>,
}

impl Destination {
    pub fn matches(&self, identity: &ClientIdentity) -> bool {
        if let Some(label) = &self.label {
            if identity.label.as_deref() != Some(label.as_str()) {
                return false;
            }
        }
        if let Some(appid) = &self.appid {
            if identity.appid.as_deref() != Some(appid.as_str()) {
                return false;
            }
        }
        if let Some(uid) = self.uid {
            if identity.uid != uid {
                return false;
            }
        }
        if let Some(gid) = self.gid {
            if identity.gid != gid {
                return false;
            }
        }
        if let Some(pid) = self.pid {
            if identity.pid != pid {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
