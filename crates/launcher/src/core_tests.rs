use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use iotfw_transport::backend::InternalBackend;
use iotfw_transport::{Address, Backend, Framing, PeerCred, Transport};
use iotfw_wire::{ClientKind, Reply, Request};
use tempfile::tempdir;

use super::*;
use crate::privilege::AllowAllGate;

fn make_launcher(root: &Path) -> Launcher {
    make_launcher_with_gate(root, Box::new(AllowAllGate))
}

fn make_launcher_with_gate(root: &Path, gate: Box<dyn crate::privilege::PrivilegeGate>) -> Launcher {
    let store = Store::new(root.join("common"), root.join("users"), true);
    let cgroup = CgroupController::attached(root.join("cgroup"));
    Launcher::new(store, cgroup, "testctl".to_string(), gate, 50_000).unwrap()
}

fn make_executable(dir: &Path, name: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"#!/bin/sh\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn write_manifest(dir: &Path, filename: &str, app: &str, exe: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    let json = serde_json::json!({ "application": app, "execute": [exe.to_string_lossy()] });
    std::fs::write(dir.join(filename), serde_json::to_vec(&json).unwrap()).unwrap();
}

fn connect_session(name: &str, kind: ClientKind) -> ClientSession {
    connect_session_as(name, kind, 0)
}

fn connect_session_as(name: &str, kind: ClientKind, uid: u32) -> ClientSession {
    let mut backend = InternalBackend::new();
    backend.connect(&Address::Internal(name.to_string())).unwrap();
    let transport = Transport::new(Box::new(backend), Framing::Json);
    let peer = PeerCred { uid, gid: 0, pid: std::process::id() as i32 };
    ClientSession::new(transport, kind, peer, None, None)
}

/// Like [`connect_session`] but also hands back a `Transport` for the other
/// end of the pair, so a test can observe what the daemon writes to it.
fn connect_session_with_peer(name: &str, kind: ClientKind) -> (ClientSession, Transport) {
    let session = connect_session(name, kind);
    let mut listener = InternalBackend::new();
    listener.bind(&Address::Internal(name.to_string())).unwrap();
    let accepted = listener.accept().unwrap().unwrap();
    (session, Transport::new(accepted.backend, Framing::Json))
}

struct DenyGate;

impl crate::privilege::PrivilegeGate for DenyGate {
    fn check(&self, _label: Option<&str>, _uid: u32, _privilege: &str) -> crate::privilege::Decision {
        crate::privilege::Decision::Deny
    }
}

#[test]
fn new_launcher_starts_with_no_sessions_or_apps() {
    let root = tempdir().unwrap();
    let launcher = make_launcher(root.path());
    let s = launcher.state.borrow();
    assert_eq!(s.sessions.len_live(), 0);
    assert_eq!(s.apps.len_live(), 0);
}

#[test]
fn listen_rejects_an_unparsable_address() {
    let root = tempdir().unwrap();
    let mut launcher = make_launcher(root.path());
    assert!(launcher.listen("not-an-address", ClientKind::Application).is_err());
}

#[test]
fn setup_creates_a_live_application_and_a_cgroup_directory() {
    let root = tempdir().unwrap();
    let launcher = make_launcher(root.path());

    let exe = make_executable(root.path(), "app-bin");
    write_manifest(&root.path().join("common"), "app.manifest", "app", &exe);

    let session_key = launcher.state.borrow_mut().sessions.insert(connect_session("setup-test", ClientKind::LauncherHelper));
    let request = Request::Setup {
        seqno: 1,
        manifest: "app".to_string(),
        app: "app".to_string(),
        user: "0".to_string(),
        group: "0".to_string(),
        exec: vec![],
        dbg: None,
    };
    let reply = crate::dispatch::handle(&launcher.state, session_key, &request);
    assert!(reply.is_ok(), "{reply:?}");

    let s = launcher.state.borrow();
    assert_eq!(s.apps.len_live(), 1);
    let (_, app) = s.apps.iter_live().next().unwrap();
    assert_eq!(app.qualified_name(), "app:app");
    assert!(root.path().join("cgroup").join(&app.cgroup_path).exists());
}

#[test]
fn setup_for_an_unknown_application_is_rejected() {
    let root = tempdir().unwrap();
    let launcher = make_launcher(root.path());
    std::fs::create_dir_all(root.path().join("common")).unwrap();
    std::fs::create_dir_all(root.path().join("users")).unwrap();

    let session_key = launcher.state.borrow_mut().sessions.insert(connect_session("setup-missing", ClientKind::LauncherHelper));
    let request = Request::Setup {
        seqno: 2,
        manifest: "nope".to_string(),
        app: "nope".to_string(),
        user: "0".to_string(),
        group: "0".to_string(),
        exec: vec![],
        dbg: None,
    };
    let reply = crate::dispatch::handle(&launcher.state, session_key, &request);
    assert!(!reply.is_ok());
}

#[test]
fn request_on_the_wrong_transport_kind_is_rejected() {
    let root = tempdir().unwrap();
    let launcher = make_launcher(root.path());
    // list-running is application-only; send it from a launcher-helper session.
    let session_key = launcher.state.borrow_mut().sessions.insert(connect_session("wrong-kind", ClientKind::LauncherHelper));
    let reply = crate::dispatch::handle(&launcher.state, session_key, &Request::ListRunning { seqno: 3 });
    match reply {
        Reply::Status { status, .. } => assert_eq!(status.status, libc::EPERM),
    }
}

#[test]
fn stop_then_cleanup_cancels_the_pending_escalation_timer() {
    let root = tempdir().unwrap();
    let mut launcher = make_launcher(root.path());

    let exe = make_executable(root.path(), "app-bin");
    write_manifest(&root.path().join("common"), "app.manifest", "app", &exe);

    let helper_key = launcher.state.borrow_mut().sessions.insert(connect_session("stop-helper", ClientKind::LauncherHelper));
    let app_key = launcher.state.borrow_mut().sessions.insert(connect_session("stop-app", ClientKind::Application));

    let setup_reply = crate::dispatch::handle(
        &launcher.state,
        helper_key,
        &Request::Setup { seqno: 1, manifest: "app".to_string(), app: "app".to_string(), user: "0".to_string(), group: "0".to_string(), exec: vec![], dbg: None },
    );
    assert!(setup_reply.is_ok(), "{setup_reply:?}");
    let cgroup_path = {
        let s = launcher.state.borrow();
        s.apps.iter_live().next().unwrap().1.cgroup_path.clone()
    };

    let stop_reply = crate::dispatch::handle(&launcher.state, app_key, &Request::Stop { seqno: 2, app: "app:app".to_string() });
    assert!(stop_reply.is_ok(), "{stop_reply:?}");

    // `stop` queued a PendingAction::ArmStopTimer; draining it needs the reactor.
    launcher.drain_actions().unwrap();
    assert!(launcher.state.borrow().apps.iter_live().next().unwrap().1.is_stopping());

    let cleanup_reply = crate::dispatch::handle(&launcher.state, helper_key, &Request::Cleanup { seqno: 3, cgroup: cgroup_path.clone() });
    assert!(cleanup_reply.is_ok(), "{cleanup_reply:?}");
    launcher.drain_actions().unwrap();

    assert_eq!(launcher.state.borrow().apps.len_live(), 0);
    assert!(!root.path().join("cgroup").join(&cgroup_path).exists());
}

#[test]
fn stopping_the_same_application_twice_is_rejected_as_busy() {
    let root = tempdir().unwrap();
    let mut launcher = make_launcher(root.path());

    let exe = make_executable(root.path(), "app-bin");
    write_manifest(&root.path().join("common"), "app.manifest", "app", &exe);

    let helper_key = launcher.state.borrow_mut().sessions.insert(connect_session("busy-helper", ClientKind::LauncherHelper));
    let app_key = launcher.state.borrow_mut().sessions.insert(connect_session("busy-app", ClientKind::Application));

    crate::dispatch::handle(
        &launcher.state,
        helper_key,
        &Request::Setup { seqno: 1, manifest: "app".to_string(), app: "app".to_string(), user: "0".to_string(), group: "0".to_string(), exec: vec![], dbg: None },
    );

    let first = crate::dispatch::handle(&launcher.state, app_key, &Request::Stop { seqno: 2, app: "app:app".to_string() });
    assert!(first.is_ok());
    launcher.drain_actions().unwrap();

    let second = crate::dispatch::handle(&launcher.state, app_key, &Request::Stop { seqno: 3, app: "app:app".to_string() });
    match second {
        Reply::Status { status, .. } => assert_eq!(status.status, libc::EBUSY),
    }
}

#[test]
fn stop_by_a_non_owning_uid_is_denied() {
    let root = tempdir().unwrap();
    let launcher = make_launcher(root.path());

    let exe = make_executable(root.path(), "app-bin");
    write_manifest(&root.path().join("common"), "app.manifest", "app", &exe);

    let helper_key = launcher.state.borrow_mut().sessions.insert(connect_session("owner-helper", ClientKind::LauncherHelper));
    let setup_reply = crate::dispatch::handle(
        &launcher.state,
        helper_key,
        &Request::Setup { seqno: 1, manifest: "app".to_string(), app: "app".to_string(), user: "0".to_string(), group: "0".to_string(), exec: vec![], dbg: None },
    );
    assert!(setup_reply.is_ok(), "{setup_reply:?}");

    let cgroup_path = {
        let s = launcher.state.borrow();
        s.apps.iter_live().next().unwrap().1.cgroup_path.clone()
    };
    let cgroup_dir = root.path().join("cgroup").join(&cgroup_path);
    let owner_uid = std::fs::metadata(&cgroup_dir).unwrap().uid();
    let other_uid = owner_uid.wrapping_add(1).max(1);

    let app_key = launcher.state.borrow_mut().sessions.insert(connect_session_as("non-owner-app", ClientKind::Application, other_uid));
    let reply = crate::dispatch::handle(&launcher.state, app_key, &Request::Stop { seqno: 2, app: "app:app".to_string() });
    assert!(!reply.is_ok());
    match reply {
        Reply::Status { status, .. } => assert_eq!(status.status, libc::EPERM),
    }
    assert!(cgroup_dir.exists());
}

#[test]
fn stopped_event_is_delivered_to_the_stop_requester() {
    let root = tempdir().unwrap();
    let mut launcher = make_launcher(root.path());

    let exe = make_executable(root.path(), "app-bin");
    write_manifest(&root.path().join("common"), "app.manifest", "app", &exe);

    let helper_key = launcher.state.borrow_mut().sessions.insert(connect_session("requester-helper", ClientKind::LauncherHelper));
    let (app_session, mut app_peer) = connect_session_with_peer("requester-app", ClientKind::Application);
    let app_key = launcher.state.borrow_mut().sessions.insert(app_session);

    crate::dispatch::handle(
        &launcher.state,
        helper_key,
        &Request::Setup { seqno: 1, manifest: "app".to_string(), app: "app".to_string(), user: "0".to_string(), group: "0".to_string(), exec: vec![], dbg: None },
    );
    let cgroup_path = {
        let s = launcher.state.borrow();
        s.apps.iter_live().next().unwrap().1.cgroup_path.clone()
    };

    let subscribe = crate::dispatch::handle(&launcher.state, app_key, &Request::SubscribeEvents { seqno: 2, events: vec!["stopped".to_string()] });
    assert!(subscribe.is_ok(), "{subscribe:?}");

    let stop_reply = crate::dispatch::handle(&launcher.state, app_key, &Request::Stop { seqno: 3, app: "app:app".to_string() });
    assert!(stop_reply.is_ok(), "{stop_reply:?}");
    launcher.drain_actions().unwrap();

    let cleanup_reply = crate::dispatch::handle(&launcher.state, helper_key, &Request::Cleanup { seqno: 4, cgroup: cgroup_path });
    assert!(cleanup_reply.is_ok(), "{cleanup_reply:?}");

    let incoming = app_peer.poll().unwrap();
    let notification = incoming.iter().find_map(|item| match item {
        iotfw_transport::Incoming::Json(value) => Some(value.clone()),
        _ => None,
    });
    assert_eq!(notification.unwrap()["event"]["event"], "stopped");
}

#[test]
fn subscribed_clients_receive_a_matching_send_event() {
    let root = tempdir().unwrap();
    let launcher = make_launcher(root.path());

    let (session, mut peer) = connect_session_with_peer("event-sub", ClientKind::Application);
    let session_key = launcher.state.borrow_mut().sessions.insert(session);

    let subscribe = crate::dispatch::handle(&launcher.state, session_key, &Request::SubscribeEvents { seqno: 1, events: vec!["app-ready".to_string()] });
    assert!(subscribe.is_ok(), "{subscribe:?}");

    let send = crate::dispatch::handle(
        &launcher.state,
        session_key,
        &Request::SendEvent { seqno: 2, event: "app-ready".to_string(), label: None, appid: None, user: None, group: None, process: None, data: None },
    );
    assert!(send.is_ok(), "{send:?}");

    let incoming = peer.poll().unwrap();
    let notification = incoming.iter().find_map(|item| match item {
        iotfw_transport::Incoming::Json(value) => Some(value.clone()),
        _ => None,
    });
    assert_eq!(notification.unwrap()["event"]["event"], "app-ready");
}

#[test]
fn send_event_does_not_reach_an_unsubscribed_client() {
    let root = tempdir().unwrap();
    let launcher = make_launcher(root.path());

    let (session, mut peer) = connect_session_with_peer("event-no-sub", ClientKind::Application);
    let session_key = launcher.state.borrow_mut().sessions.insert(session);

    let send = crate::dispatch::handle(
        &launcher.state,
        session_key,
        &Request::SendEvent { seqno: 1, event: "app-ready".to_string(), label: None, appid: None, user: None, group: None, process: None, data: None },
    );
    assert!(send.is_ok());
    assert!(peer.poll().unwrap().is_empty());
}

#[test]
fn list_running_is_denied_without_the_list_apps_privilege() {
    let root = tempdir().unwrap();
    let launcher = make_launcher_with_gate(root.path(), Box::new(DenyGate));
    let session_key = launcher.state.borrow_mut().sessions.insert(connect_session("list-denied", ClientKind::Application));

    let reply = crate::dispatch::handle(&launcher.state, session_key, &Request::ListRunning { seqno: 1 });
    assert!(!reply.is_ok());
    match reply {
        Reply::Status { status, .. } => assert_eq!(status.status, libc::EPERM),
    }
}

#[test]
fn list_installed_enumerates_discovered_packages() {
    let root = tempdir().unwrap();
    let launcher = make_launcher(root.path());
    let exe = make_executable(root.path(), "app-bin");
    write_manifest(&root.path().join("common"), "app.manifest", "app", &exe);

    let session_key = launcher.state.borrow_mut().sessions.insert(connect_session("list-installed", ClientKind::Application));
    let reply = crate::dispatch::handle(&launcher.state, session_key, &Request::ListInstalled { seqno: 1 });
    assert!(reply.is_ok(), "{reply:?}");
    match reply {
        Reply::Status { status, .. } => {
            let packages = status.data.unwrap();
            assert_eq!(packages["packages"][0]["package"], "app");
        }
    }
}
