use nix::sys::signal::Signal;
use nix::unistd::Pid;
use tempfile::tempdir;

use super::*;

#[test]
fn mkdir_creates_dir_and_writes_tasks_file() {
    let root = tempdir().unwrap();
    let ctl = CgroupController::attached(root.path().to_path_buf());
    let relpath = ctl.mkdir(1000, "myapp", 4242).unwrap();
    assert_eq!(relpath, "user-1000/myapp-4242");
    let tasks = std::fs::read_to_string(root.path().join(&relpath).join("tasks")).unwrap();
    assert_eq!(tasks.trim(), "4242");
}

#[test]
fn rmdir_is_idempotent_on_missing_directory() {
    let root = tempdir().unwrap();
    let ctl = CgroupController::attached(root.path().to_path_buf());
    assert!(ctl.rmdir("user-1000/gone-1").is_ok());
}

#[test]
fn rmdir_removes_an_existing_directory() {
    let root = tempdir().unwrap();
    let ctl = CgroupController::attached(root.path().to_path_buf());
    let relpath = ctl.mkdir(1000, "myapp", 1).unwrap();
    ctl.rmdir(&relpath).unwrap();
    assert!(!root.path().join(&relpath).exists());
}

#[test]
fn mkdir_rejects_path_escape_attempts() {
    let root = tempdir().unwrap();
    let ctl = CgroupController::attached(root.path().to_path_buf());
    let err = ctl.rmdir("../escape").unwrap_err();
    assert!(matches!(err, CgroupError::PathEscape(_)));
}

#[test]
fn signal_reads_pids_from_tasks_and_signals_self() {
    let root = tempdir().unwrap();
    let ctl = CgroupController::attached(root.path().to_path_buf());
    let pid = nix::unistd::getpid().as_raw();
    let relpath = ctl.mkdir(1000, "self", pid).unwrap();
    // SIGCONT on our own pid is harmless and lets the test observe the
    // controller actually parsed and signalled the listed pid.
    ctl.signal(&relpath, Signal::SIGCONT).unwrap();
    let _ = Pid::from_raw(pid);
}

#[test]
fn signal_tolerates_a_missing_tasks_file() {
    let root = tempdir().unwrap();
    let ctl = CgroupController::attached(root.path().to_path_buf());
    assert!(ctl.signal("user-1000/nope-1", Signal::SIGTERM).is_ok());
}

#[test]
fn resolve_cgroup_of_returns_none_for_a_dead_pid() {
    let root = tempdir().unwrap();
    let ctl = CgroupController::attached(root.path().to_path_buf());
    // Pid 0 never has a /proc entry.
    assert_eq!(ctl.resolve_cgroup_of("myctl", 0).unwrap(), None);
}

#[test]
fn owned_by_matches_current_process_uid() {
    let root = tempdir().unwrap();
    let uid = nix::unistd::getuid().as_raw();
    assert!(owned_by(root.path(), uid));
    assert!(!owned_by(root.path(), uid + 12345));
}
