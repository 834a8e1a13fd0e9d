// SPDX-License-Identifier: MIT

//! Client sessions (spec §4.7 "Sessions"): one per connected transport,
//! carrying the peer's resolved identity and its event subscription set.

use std::collections::HashSet;

use iotfw_transport::{PeerCred, Transport};
use iotfw_wire::ClientKind;

use crate::events::EventId;

/// One connected client (spec §4.7). Holds the [`Transport`] it arrived
/// on, its credentials as read via the transport's peer introspection
/// (spec §4.3), and — for application clients — the cgroup subpath
/// resolved at connection time so later requests can be tied back to a
/// specific live application.
pub struct ClientSession {
    pub transport: Transport,
    pub kind: ClientKind,
    pub peer: PeerCred,
    pub label: Option<String>,
    /// Resolved once at connection time for `ClientKind::Application`
    /// sessions (spec §4.7); `None` for launcher-helper sessions, which
    /// aren't themselves a running application.
    pub cgroup_path: Option<String>,
    subscriptions: HashSet<EventId>,
}

impl ClientSession {
    pub fn new(transport: Transport, kind: ClientKind, peer: PeerCred, label: Option<String>, cgroup_path: Option<String>) -> Self {
        Self { transport, kind, peer, label, cgroup_path, subscriptions: HashSet::new() }
    }

    pub fn subscribe(&mut self, id: EventId) {
        self.subscriptions.insert(id);
    }

    pub fn is_subscribed(&self, id: EventId) -> bool {
        self.subscriptions.contains(&id)
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
