// SPDX-License-Identifier: MIT

//! The privilege gate (spec §4.6): an opaque capability oracle callers
//! consult before honouring a request that needs more than "you are who
//! your credentials say you are" — e.g. the `list-apps` capability spec
//! §4.7 requires for `list` requests.
//!
//! Modelled as a trait so a system access-control service and an
//! always-allow stub are interchangeable, per the spec's "callers must
//! not distinguish the two". All gate calls are synchronous and
//! non-blocking from the reactor's perspective — an implementation must
//! not do blocking I/O in `check`.

/// The outcome of a `check` call (spec §4.6's `{1, 0, -1}` return).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
    OracleUnavailable,
}

pub trait PrivilegeGate {
    /// Run once at launcher startup.
    fn init(&mut self) -> crate::error::Result<()> {
        Ok(())
    }

    /// Run once at launcher shutdown.
    fn exit(&mut self) {}

    /// Is `uid` (carrying security `label`, if any) allowed `privilege`?
    fn check(&self, label: Option<&str>, uid: u32, privilege: &str) -> Decision;
}

/// Always allows. The default gate when no access-control backend is
/// configured (spec §4.6 "stubbed to always-allow").
#[derive(Debug, Default)]
pub struct AllowAllGate;

impl PrivilegeGate for AllowAllGate {
    fn check(&self, _label: Option<&str>, _uid: u32, _privilege: &str) -> Decision {
        Decision::Allow
    }
}

#[cfg(test)]
#[path = "privilege_tests.rs"]
mod tests;
