// SPDX-License-Identifier: MIT

//! Live application records (spec §4.7): one per successfully set-up
//! application, tracked from `setup` through `cleanup`.

use iotfw_core::Key;

/// An application instantiated by `setup` and not yet `cleanup`-ed (spec
/// §4.7, §4.4).
pub struct LiveApplication {
    pub package: String,
    pub application: String,
    pub uid: u32,
    pub gid: u32,
    pub exec: Vec<String>,
    /// Relative path under the cgroup controller's root (spec §4.4's
    /// `mkdir` result) — the canonical id this application is addressed
    /// by for `cleanup`.
    pub cgroup_path: String,
    pub pid: i32,
    /// Set by `stop`; the reactor timer armed to escalate to SIGKILL if
    /// the application hasn't gone away by the time it fires (spec §4.7
    /// "Graceful stop").
    pub stop_timer: Option<Key>,
    /// The pid that requested `stop`, so `cleanup` can deliver the
    /// `stopped` event to the right recipient (spec §4.7, §4.8).
    pub stop_requester_pid: Option<i32>,
}

impl LiveApplication {
    /// The `pkg:app` identifier requests address this application by
    /// (spec §6 `stop`'s `"app":"pkg:app"`).
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.package, self.application)
    }

    pub fn is_stopping(&self) -> bool {
        self.stop_timer.is_some()
    }
}

#[cfg(test)]
#[path = "app_tests.rs"]
mod tests;
