// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! iotfw-launcher: the application launcher daemon (spec §4.4, §4.6–§4.8).
//!
//! Wires a manifest [`Store`], a [`CgroupController`], a [`PrivilegeGate`]
//! and a [`HookRegistry`] into an [`iotfw_reactor::Reactor`], accepting
//! launcher-helper and application clients on two separate transports and
//! dispatching the requests in `iotfw-wire` against them (spec §4.7).

mod app;
mod cgroup;
mod config;
mod core;
mod dispatch;
mod error;
mod events;
mod hooks;
mod privilege;
mod session;

pub use app::LiveApplication;
pub use cgroup::{owned_by, CgroupController, CgroupError};
pub use config::Config;
pub use core::Launcher;
pub use error::{LauncherError, Result};
pub use events::{ClientIdentity, Destination, EventId, EventTable, DEFAULT_MAX_EVENTS};
pub use hooks::{ApplicationHook, CleanupContext, HookRegistry, SetupContext};
pub use privilege::{AllowAllGate, Decision, PrivilegeGate};
pub use session::ClientSession;

pub use iotfw_manifest::Store;
