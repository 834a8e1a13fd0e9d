// SPDX-License-Identifier: MIT

//! The launcher core (spec §4.7): wires the reactor, transport, manifest
//! store, cgroup controller, privilege gate, hooks and event table
//! together and drives the daemon's request/reply/event loop.
//!
//! **Re-entrancy.** Io-watch and timer callbacks stored inside [`Reactor`]
//! only ever touch [`LauncherState`] through the shared `Rc<RefCell<_>>` —
//! never the `Reactor` itself, which is already mid-borrow for the
//! duration of the callback that's running (`Reactor::iterate` holds
//! `&mut self.io` across `IoTable::dispatch`, and a callback trying to
//! re-enter the same `Reactor` would panic the `RefCell`, or simply
//! couldn't compile, depending on how it got there). Anything a callback
//! needs the reactor to do — arm or cancel a timer, watch a freshly
//! accepted connection's fd — is instead recorded as a [`PendingAction`]
//! and applied by [`Launcher::drain_actions`] right after `iterate()`
//! returns, when the reactor is not borrowed by anything.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::os::fd::RawFd;
use std::rc::Rc;

use iotfw_core::{Arena, Key, Mask};
use iotfw_manifest::Store;
use iotfw_reactor::{Reactor, TriggerMode, MASK_IN};
use iotfw_transport::backend::open as open_backend;
use iotfw_transport::{Framing, Incoming, Transport};
use iotfw_wire::{ClientKind, Request};

use crate::cgroup::CgroupController;
use crate::error::{LauncherError, Result};
use crate::events::EventTable;
use crate::hooks::HookRegistry;
use crate::privilege::PrivilegeGate;
use crate::session::ClientSession;

/// An action a callback wants applied to the [`Reactor`] once it's safe to
/// borrow (see module docs).
pub(crate) enum PendingAction {
    WatchSession(Key),
    ArmStopTimer { app_key: Key, delay_usec: i64 },
    CancelTimer(Key),
    CloseSession(Key),
}

struct ListenerEntry {
    transport: Transport,
    kind: ClientKind,
}

/// Everything a request handler or io callback can mutate. Shared via
/// `Rc<RefCell<_>>` between the [`Launcher`] and every callback registered
/// on its reactor.
pub(crate) struct LauncherState {
    pub(crate) store: Store,
    pub(crate) cgroup: CgroupController,
    /// The cgroup subsystem name this controller was mounted under — what
    /// `/proc/<pid>/cgroup`'s subsystems column names it (spec §4.4).
    pub(crate) cgroup_name: String,
    pub(crate) gate: Box<dyn PrivilegeGate>,
    pub(crate) hooks: HookRegistry,
    pub(crate) events: EventTable,
    pub(crate) sessions: Arena<ClientSession>,
    pub(crate) apps: Arena<crate::app::LiveApplication>,
    listeners: Arena<ListenerEntry>,
    pub(crate) stop_timeout_usec: i64,
    pub(crate) actions: VecDeque<PendingAction>,
    pub(crate) quit: Option<i32>,
}

impl LauncherState {
    pub(crate) fn find_app_by_name(&self, qualified: &str) -> Option<Key> {
        self.apps.iter_live().find(|(_, app)| app.qualified_name() == qualified).map(|(k, _)| k)
    }

    pub(crate) fn find_app_by_cgroup(&self, cgroup_path: &str) -> Option<Key> {
        self.apps.iter_live().find(|(_, app)| app.cgroup_path == cgroup_path).map(|(k, _)| k)
    }
}

pub struct Launcher {
    reactor: Reactor,
    state: Rc<RefCell<LauncherState>>,
}

impl Launcher {
    pub fn new(
        store: Store,
        cgroup: CgroupController,
        cgroup_name: String,
        gate: Box<dyn PrivilegeGate>,
        stop_timeout_usec: i64,
    ) -> Result<Self> {
        let mut reactor = Reactor::new()?;
        let state = Rc::new(RefCell::new(LauncherState {
            store,
            cgroup,
            cgroup_name,
            gate,
            hooks: HookRegistry::default(),
            events: EventTable::default(),
            sessions: Arena::new(),
            apps: Arena::new(),
            listeners: Arena::new(),
            stop_timeout_usec,
            actions: VecDeque::new(),
            quit: None,
        }));

        for signal in [nix::sys::signal::Signal::SIGTERM, nix::sys::signal::Signal::SIGINT] {
            let state = state.clone();
            reactor.add_sighandler(signal, Box::new(move |_signal| state.borrow_mut().quit = Some(0)))?;
        }

        Ok(Self { reactor, state })
    }

    pub fn register_hook(&mut self, hook: Box<dyn crate::hooks::ApplicationHook>) {
        self.state.borrow_mut().hooks.register(hook);
    }

    pub fn init_hooks(&mut self) -> Result<()> {
        self.state.borrow_mut().hooks.init_all()
    }

    /// Bind and start accepting connections on `address`, tagging every
    /// client that connects there as `kind` (spec §4.7 "Sessions" — which
    /// transport a client arrived on determines which requests it may
    /// send).
    pub fn listen(&mut self, address: &str, kind: ClientKind) -> Result<()> {
        let addr = iotfw_transport::resolve(address).map_err(LauncherError::Transport)?;
        let mut backend = open_backend(&addr);
        backend.bind(&addr).map_err(LauncherError::Transport)?;
        backend.listen(128).map_err(LauncherError::Transport)?;
        let transport = Transport::new(backend, Framing::Json);
        let fd = transport.as_raw_fd();

        let key = self.state.borrow_mut().listeners.insert(ListenerEntry { transport, kind });
        let state = self.state.clone();
        self.reactor.add_io_watch(
            fd,
            Mask::bit(MASK_IN),
            TriggerMode::Level,
            Box::new(move |_io, _mask| on_listener_ready(&state, key)),
        )?;
        Ok(())
    }

    /// Run the daemon until a `quit` is requested, returning the exit code
    /// (spec §6 "Exit codes").
    pub fn run(&mut self) -> Result<i32> {
        loop {
            self.reactor.iterate()?;
            self.drain_actions()?;
            if let Some(code) = self.state.borrow_mut().quit.take() {
                self.state.borrow_mut().hooks.exit_all();
                return Ok(code);
            }
        }
    }

    fn drain_actions(&mut self) -> Result<()> {
        loop {
            let action = self.state.borrow_mut().actions.pop_front();
            let Some(action) = action else { break };
            match action {
                PendingAction::WatchSession(session_key) => self.watch_session(session_key)?,
                PendingAction::ArmStopTimer { app_key, delay_usec } => {
                    let state = self.state.clone();
                    let timer_key = self.reactor.add_timer(delay_usec, None, Box::new(move |_| on_stop_timeout(&state, app_key)))?;
                    if let Some(app) = self.state.borrow_mut().apps.get_mut(app_key) {
                        app.stop_timer = Some(timer_key);
                    }
                }
                PendingAction::CancelTimer(timer_key) => self.reactor.del_timer(timer_key),
                PendingAction::CloseSession(session_key) => {
                    self.state.borrow_mut().sessions.mark_dead(session_key);
                    self.state.borrow_mut().sessions.sweep();
                }
            }
        }
        Ok(())
    }

    fn watch_session(&mut self, session_key: Key) -> Result<()> {
        let fd: RawFd = {
            let state = self.state.borrow();
            let Some(session) = state.sessions.get(session_key) else { return Ok(()) };
            session.transport.as_raw_fd()
        };
        let state = self.state.clone();
        self.reactor.add_io_watch(
            fd,
            Mask::bit(MASK_IN),
            TriggerMode::Level,
            Box::new(move |_io, _mask| on_session_ready(&state, session_key)),
        )?;
        Ok(())
    }
}

fn on_listener_ready(state: &Rc<RefCell<LauncherState>>, listener_key: Key) {
    let incoming = {
        let mut s = state.borrow_mut();
        let Some(entry) = s.listeners.get_mut(listener_key) else { return };
        entry.transport.poll().unwrap_or_default()
    };
    let kind = {
        let s = state.borrow();
        s.listeners.get(listener_key).map(|e| e.kind).unwrap_or(ClientKind::Application)
    };
    for item in incoming {
        let Incoming::Connection(backend) = item else { continue };
        accept_connection(state, backend, kind);
    }
}

fn accept_connection(state: &Rc<RefCell<LauncherState>>, backend: Box<dyn iotfw_transport::Backend>, kind: ClientKind) {
    let transport = Transport::new(backend, Framing::Json);
    let Ok(peer) = transport.peer_cred() else { return };
    let label = transport.peer_security_label().ok();

    let cgroup_path = if kind == ClientKind::Application {
        let s = state.borrow();
        let name = s.cgroup_name.clone();
        s.cgroup.resolve_cgroup_of(&name, peer.pid).ok().flatten()
    } else {
        None
    };

    let session = ClientSession::new(transport, kind, peer, label, cgroup_path);
    let session_key = state.borrow_mut().sessions.insert(session);
    state.borrow_mut().actions.push_back(PendingAction::WatchSession(session_key));
}

fn on_session_ready(state: &Rc<RefCell<LauncherState>>, session_key: Key) {
    let incoming = {
        let mut s = state.borrow_mut();
        let Some(session) = s.sessions.get_mut(session_key) else { return };
        match session.transport.poll() {
            Ok(items) => items,
            Err(_) => {
                s.actions.push_back(PendingAction::CloseSession(session_key));
                return;
            }
        }
    };

    for item in incoming {
        match item {
            Incoming::Json(value) => {
                let request: Request = match serde_json::from_value(value) {
                    Ok(r) => r,
                    Err(_) => continue,
                };
                let reply = crate::dispatch::handle(state, session_key, &request);
                let mut s = state.borrow_mut();
                if let Some(session) = s.sessions.get_mut(session_key) {
                    let _ = session.transport.send_json(&reply);
                }
            }
            Incoming::Closed => {
                state.borrow_mut().actions.push_back(PendingAction::CloseSession(session_key));
            }
            Incoming::Raw(_) | Incoming::Connection(_) => {}
        }
    }
}

fn on_stop_timeout(state: &Rc<RefCell<LauncherState>>, app_key: Key) {
    let mut s = state.borrow_mut();
    let Some(app) = s.apps.get_mut(app_key) else { return };
    app.stop_timer = None;
    let cgroup_path = app.cgroup_path.clone();
    let _ = s.cgroup.signal(&cgroup_path, nix::sys::signal::Signal::SIGKILL);
}

#[cfg(test)]
#[path = "core_tests.rs"]
mod tests;
