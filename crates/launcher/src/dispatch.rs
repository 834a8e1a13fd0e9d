// SPDX-License-Identifier: MIT

//! Request dispatch (spec §4.7, §6): one function per [`Request`] variant,
//! each pulling whatever it needs out of [`LauncherState`] and returning
//! the [`Reply`] to send back. Kept separate from `core.rs` so the reactor
//! wiring and the request semantics can be read (and changed) independently
//! of one another.

use std::cell::RefCell;
use std::rc::Rc;

use iotfw_core::Key;
use iotfw_manifest::Owner;
use iotfw_wire::{Notification, Reply, Request};
use serde_json::json;

use crate::app::LiveApplication;
use crate::core::{LauncherState, PendingAction};
use crate::events::{ClientIdentity, Destination};
use crate::hooks::{CleanupContext, SetupContext};

const LIST_APPS_PRIVILEGE: &str = "list-apps";

/// Handle one request from `session_key`'s session, returning the reply to
/// send back on its own transport.
pub(crate) fn handle(state: &Rc<RefCell<LauncherState>>, session_key: Key, request: &Request) -> Reply {
    let seqno = request.seqno();

    let actual_kind = {
        let s = state.borrow();
        match s.sessions.get(session_key) {
            Some(session) => session.kind,
            None => return Reply::error(seqno, libc::ENOTCONN, "session gone"),
        }
    };
    if actual_kind != request.required_client_kind() {
        return Reply::error(seqno, libc::EPERM, "request not permitted on this transport");
    }

    let result = match request {
        Request::Setup { seqno, manifest, app, user, group, exec, .. } => setup(state, session_key, *seqno, manifest, app, user, group, exec),
        Request::Cleanup { seqno, cgroup } => cleanup(state, *seqno, cgroup),
        Request::SubscribeEvents { seqno, events } => subscribe_events(state, session_key, *seqno, events),
        Request::SendEvent { seqno, event, label, appid, user, group, process, data } => {
            send_event(state, *seqno, event, label.clone(), appid.clone(), *user, *group, *process, data.clone())
        }
        Request::ListRunning { seqno } => list_running(state, session_key, *seqno),
        Request::ListInstalled { seqno } => list_installed(state, session_key, *seqno),
        Request::Stop { seqno, app } => stop(state, session_key, *seqno, app),
    };

    match result {
        Ok(reply) => reply,
        Err(err) => err.to_reply(seqno),
    }
}

fn setup(
    state: &Rc<RefCell<LauncherState>>,
    session_key: Key,
    seqno: u64,
    manifest: &str,
    app_name: &str,
    user: &str,
    group: &str,
    exec: &[String],
) -> crate::error::Result<Reply> {
    use crate::error::LauncherError;

    let uid: u32 = user.parse().map_err(|_| LauncherError::Invalid("user is not a numeric uid"))?;
    let gid: u32 = group.parse().map_err(|_| LauncherError::Invalid("group is not a numeric gid"))?;

    let owner = if uid == 0 { Owner::Common } else { Owner::User { uid, name: user.to_string() } };

    let mut s = state.borrow_mut();
    let manifest = s.store.get(owner, manifest)?;
    let application = manifest.application(app_name).ok_or_else(|| LauncherError::NotFound(app_name.to_string()))?;
    if !application.status.is_loadable() {
        return Err(LauncherError::Invalid("application failed manifest validation"));
    }

    let requester_pid = s.sessions.get(session_key).map(|sess| sess.peer.pid).unwrap_or(0);
    let cgroup_path = s.cgroup.mkdir(uid, app_name, requester_pid)?;

    let setup_exec = if exec.is_empty() { application.execute.clone() } else { exec.to_vec() };
    let ctx = SetupContext {
        package: &manifest.package,
        application: app_name,
        uid,
        gid,
        exec: &setup_exec,
        cgroup_path: &cgroup_path,
        pid: requester_pid,
    };
    if let Err(err) = s.hooks.setup_all(&ctx) {
        let _ = s.cgroup.rmdir(&cgroup_path);
        return Err(err);
    }

    let live = LiveApplication {
        package: manifest.package.clone(),
        application: app_name.to_string(),
        uid,
        gid,
        exec: setup_exec,
        cgroup_path: cgroup_path.clone(),
        pid: requester_pid,
        stop_timer: None,
        stop_requester_pid: None,
    };
    s.apps.insert(live);

    Ok(Reply::ok(seqno, Some(json!({ "cgroup": cgroup_path }))))
}

fn cleanup(state: &Rc<RefCell<LauncherState>>, seqno: u64, cgroup: &str) -> crate::error::Result<Reply> {
    use crate::error::LauncherError;

    let mut s = state.borrow_mut();
    let app_key = s.find_app_by_cgroup(cgroup).ok_or_else(|| LauncherError::NotFound(cgroup.to_string()))?;
    let app = s.apps.get(app_key).expect("looked up by find_app_by_cgroup");
    let stop_timer = app.stop_timer;
    let stop_requester_pid = app.stop_requester_pid;
    let package = app.package.clone();
    let application = app.application.clone();
    let qualified_name = app.qualified_name();

    let ctx = CleanupContext { package: &package, application: &application, cgroup_path: cgroup };
    s.hooks.cleanup_all(&ctx);
    s.cgroup.rmdir(cgroup)?;
    s.apps.mark_dead(app_key);
    s.apps.sweep();

    if let Some(timer_key) = stop_timer {
        s.actions.push_back(PendingAction::CancelTimer(timer_key));
    }

    if let Some(requester_pid) = stop_requester_pid {
        notify(&mut s, "stopped", Destination { pid: Some(requester_pid), ..Default::default() }, Some(json!({ "app": qualified_name })));
    }

    Ok(Reply::ok(seqno, None))
}

/// Intern `event` and deliver it to every subscribed session whose identity
/// matches `destination` (spec §4.7, §4.8 — the same routing `send-event`
/// uses, reused here for launcher-originated events like `stopped`).
fn notify(s: &mut LauncherState, event: &str, destination: Destination, data: Option<serde_json::Value>) {
    let Some(event_id) = s.events.intern(event) else { return };
    let notification = Notification::new(event.to_string(), data);

    let keys: Vec<Key> = s.sessions.iter_live().map(|(k, _)| k).collect();
    for key in keys {
        let matches = {
            let Some(session) = s.sessions.get(key) else { continue };
            if !session.is_subscribed(event_id) {
                continue;
            }
            let app_id = session.cgroup_path.clone();
            let identity = ClientIdentity { label: session.label.clone(), appid: app_id, uid: session.peer.uid, gid: session.peer.gid, pid: session.peer.pid };
            destination.matches(&identity)
        };
        if matches {
            if let Some(session) = s.sessions.get_mut(key) {
                let _ = session.transport.send_json(&notification);
            }
        }
    }
}

fn subscribe_events(state: &Rc<RefCell<LauncherState>>, session_key: Key, seqno: u64, events: &[String]) -> crate::error::Result<Reply> {
    use crate::error::LauncherError;

    let mut s = state.borrow_mut();
    let mut ids = Vec::with_capacity(events.len());
    for name in events {
        let id = s.events.intern(name).ok_or(LauncherError::Resource("event table is full"))?;
        ids.push(id);
    }
    let Some(session) = s.sessions.get_mut(session_key) else {
        return Err(LauncherError::NotFound("session gone".to_string()));
    };
    for id in ids {
        session.subscribe(id);
    }
    Ok(Reply::ok(seqno, None))
}

#[allow(clippy::too_many_arguments)]
fn send_event(
    state: &Rc<RefCell<LauncherState>>,
    seqno: u64,
    event: &str,
    label: Option<String>,
    appid: Option<String>,
    user: Option<u32>,
    group: Option<u32>,
    process: Option<i32>,
    data: Option<serde_json::Value>,
) -> crate::error::Result<Reply> {
    use crate::error::LauncherError;

    let destination = Destination { label, appid, uid: user, gid: group, pid: process };

    let mut s = state.borrow_mut();
    if s.events.intern(event).is_none() {
        return Err(LauncherError::Resource("event table is full"));
    }
    notify(&mut s, event, destination, data);
    Ok(Reply::ok(seqno, None))
}

/// Check the caller holds the `list-apps` capability (spec §4.7: `list`
/// requests are gated on it; every other application request only needs a
/// valid session). `Decision::Deny` and `Decision::OracleUnavailable` are
/// both refused — an oracle the gate can't reach is not the same as
/// "allowed", per spec §4.6.
fn require_list_apps(s: &LauncherState, session_key: Key) -> crate::error::Result<()> {
    use crate::error::LauncherError;
    use crate::privilege::Decision;

    let Some(session) = s.sessions.get(session_key) else {
        return Err(LauncherError::NotFound("session gone".to_string()));
    };
    match s.gate.check(session.label.as_deref(), session.peer.uid, LIST_APPS_PRIVILEGE) {
        Decision::Allow => Ok(()),
        Decision::Deny => Err(LauncherError::Denied("missing list-apps privilege")),
        Decision::OracleUnavailable => Err(LauncherError::OracleUnavailable),
    }
}

fn list_running(state: &Rc<RefCell<LauncherState>>, session_key: Key, seqno: u64) -> crate::error::Result<Reply> {
    let s = state.borrow();
    require_list_apps(&s, session_key)?;
    let apps: Vec<_> = s
        .apps
        .iter_live()
        .map(|(_, app)| {
            json!({
                "app": app.qualified_name(),
                "pid": app.pid,
                "cgroup": app.cgroup_path,
                "stopping": app.is_stopping(),
            })
        })
        .collect();
    Ok(Reply::ok(seqno, Some(json!({ "apps": apps }))))
}

fn list_installed(state: &Rc<RefCell<LauncherState>>, session_key: Key, seqno: u64) -> crate::error::Result<Reply> {
    let s = state.borrow();
    require_list_apps(&s, session_key)?;
    let packages: Vec<_> = s
        .store
        .discover()
        .into_iter()
        .map(|(owner, package)| {
            let owner_json = match owner {
                Owner::Common => json!("common"),
                Owner::User { uid, name } => json!({ "uid": uid, "name": name }),
            };
            json!({ "package": package, "owner": owner_json })
        })
        .collect();
    Ok(Reply::ok(seqno, Some(json!({ "packages": packages }))))
}

fn stop(state: &Rc<RefCell<LauncherState>>, session_key: Key, seqno: u64, app_name: &str) -> crate::error::Result<Reply> {
    use crate::cgroup::owned_by;
    use crate::error::LauncherError;

    let mut s = state.borrow_mut();
    let requester = s.sessions.get(session_key).ok_or_else(|| LauncherError::NotFound("session gone".to_string()))?;
    let requester_pid = requester.peer.pid;
    let requester_uid = requester.peer.uid;

    let app_key = s.find_app_by_name(app_name).ok_or_else(|| LauncherError::NotFound(app_name.to_string()))?;
    let already_stopping = s.apps.get(app_key).map(|app| app.is_stopping()).unwrap_or(false);
    if already_stopping {
        return Err(LauncherError::Busy("stop already in progress"));
    }

    let cgroup_path = s.apps.get(app_key).expect("looked up by find_app_by_name").cgroup_path.clone();
    if requester_uid != 0 && !owned_by(&s.cgroup.root().join(&cgroup_path), requester_uid) {
        return Err(LauncherError::Denied("not the owner of this application"));
    }
    s.cgroup.signal(&cgroup_path, nix::sys::signal::Signal::SIGTERM)?;

    if let Some(app) = s.apps.get_mut(app_key) {
        app.stop_requester_pid = Some(requester_pid);
    }
    let stop_timeout_usec = s.stop_timeout_usec;
    s.actions.push_back(PendingAction::ArmStopTimer { app_key, delay_usec: stop_timeout_usec });

    Ok(Reply::ok(seqno, None))
}
