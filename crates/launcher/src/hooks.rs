// SPDX-License-Identifier: MIT

//! Application hooks (spec §4.7): a registry of named extensions, each
//! consulted in registration order at the four points in an application's
//! life the launcher core can't itself know how to extend — daemon
//! startup/shutdown, and per-application setup/cleanup.
//!
//! Modelled as a trait object registry (spec §9 "App hooks are best
//! modelled as a registered enum of implementations selected at runtime;
//! each case carries the four lifecycle functions") — a trait with default
//! no-op bodies serves the same purpose with less boilerplate for hooks
//! that only care about one or two of the four points.

use crate::error::Result;

/// What a `setup` hook needs to know about the application being started.
pub struct SetupContext<'a> {
    pub package: &'a str,
    pub application: &'a str,
    pub uid: u32,
    pub gid: u32,
    pub exec: &'a [String],
    pub cgroup_path: &'a str,
    pub pid: i32,
}

/// What a `cleanup` hook needs to know about the application being torn
/// down.
pub struct CleanupContext<'a> {
    pub package: &'a str,
    pub application: &'a str,
    pub cgroup_path: &'a str,
}

pub trait ApplicationHook {
    fn name(&self) -> &str;

    /// Runs once at launcher startup, before any application is set up.
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Runs once at launcher shutdown.
    fn exit(&mut self) {}

    /// Runs after the application's cgroup exists and its identity is
    /// resolved, before it is linked into the live-apps list. A failure
    /// aborts that setup (spec §4.7 "A hook failure during setup surfaces
    /// as errno in the reply and aborts that setup").
    fn setup(&mut self, ctx: &SetupContext) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Runs after the application has terminated, before its cgroup
    /// directory is removed.
    fn cleanup(&mut self, ctx: &CleanupContext) {
        let _ = ctx;
    }
}

/// Registration-ordered set of hooks (spec §4.7 "consulted in registration
/// order").
#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<Box<dyn ApplicationHook>>,
}

impl HookRegistry {
    pub fn register(&mut self, hook: Box<dyn ApplicationHook>) {
        self.hooks.push(hook);
    }

    pub fn init_all(&mut self) -> Result<()> {
        for hook in &mut self.hooks {
            hook.init()?;
        }
        Ok(())
    }

    pub fn exit_all(&mut self) {
        for hook in &mut self.hooks {
            hook.exit();
        }
    }

    /// Run every hook's `setup` in order. On the first failure, `cleanup`
    /// is run (in reverse order) for every hook that already succeeded, so
    /// a failed setup leaves no hook believing it owns live state for this
    /// application (spec §7 "On any partial failure the operation reverts
    /// to the pre-call state").
    pub fn setup_all(&mut self, ctx: &SetupContext) -> Result<()> {
        for (index, hook) in self.hooks.iter_mut().enumerate() {
            if let Err(err) = hook.setup(ctx) {
                let cleanup_ctx = CleanupContext {
                    package: ctx.package,
                    application: ctx.application,
                    cgroup_path: ctx.cgroup_path,
                };
                for hook in self.hooks[..index].iter_mut().rev() {
                    hook.cleanup(&cleanup_ctx);
                }
                return Err(err);
            }
        }
        Ok(())
    }

    pub fn cleanup_all(&mut self, ctx: &CleanupContext) {
        for hook in self.hooks.iter_mut().rev() {
            hook.cleanup(ctx);
        }
    }
}

#[cfg(test)]
#[path = "hooks_tests.rs"]
mod tests;
