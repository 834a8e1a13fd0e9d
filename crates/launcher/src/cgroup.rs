// SPDX-License-Identifier: MIT

//! The cgroup controller (spec §4.4): an isolated named cgroup hierarchy
//! the launcher owns exclusively at runtime, used to give every launched
//! application a kill-able process group.
//!
//! [`CgroupController::mount`] does the real remount-rw / mkdir / mount /
//! remount-ro dance against the kernel and needs root; it is grounded
//! directly on the spec's init sequence and is not exercised by this
//! crate's own tests, which instead construct a controller over a plain
//! temp directory via [`CgroupController::attached`] — every other
//! operation (`mkdir`/`rmdir`/`signal`/`resolve_cgroup_of`) only touches
//! files under `root` and is indifferent to whether that root is a real
//! cgroupfs mount or not.

use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use nix::mount::{mount, umount, MsFlags};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CgroupError {
    #[error("i/o error at {path:?}: {source}")]
    Io { path: PathBuf, #[source] source: io::Error },
    #[error("mount error: {0}")]
    Mount(#[from] nix::Error),
    #[error("cgroup relative path {0:?} escapes the controller root")]
    PathEscape(String),
}

type Result<T> = std::result::Result<T, CgroupError>;

fn io_err(path: &Path, source: io::Error) -> CgroupError {
    CgroupError::Io { path: path.to_path_buf(), source }
}

/// Owns one named cgroup subtree (spec §4.4). `root` is
/// `<controller-mount>/<NAME>/`.
pub struct CgroupController {
    root: PathBuf,
}

impl CgroupController {
    /// Remount the controller's filesystem read-write, create and mount
    /// `<fs_mount_point>/<name>/` as its own cgroup filesystem with
    /// `notify_on_release=1` and the given release-agent path, then
    /// remount the root read-only (spec §4.4 "On init").
    pub fn mount(fs_mount_point: &Path, name: &str, release_agent: &Path) -> Result<Self> {
        mount(
            None::<&str>,
            fs_mount_point,
            None::<&str>,
            MsFlags::MS_REMOUNT,
            None::<&str>,
        )?;

        let root = fs_mount_point.join(name);
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;

        mount(Some("cgroup"), &root, Some("cgroup"), MsFlags::empty(), None::<&str>)?;
        fs::write(root.join("notify_on_release"), b"1\n").map_err(|e| io_err(&root, e))?;
        fs::write(root.join("release_agent"), release_agent.as_os_str().as_encoded_bytes())
            .map_err(|e| io_err(&root, e))?;

        mount(
            None::<&str>,
            fs_mount_point,
            None::<&str>,
            MsFlags::MS_REMOUNT | MsFlags::MS_RDONLY,
            None::<&str>,
        )?;

        Ok(Self { root })
    }

    /// Wrap an already-prepared directory as the controller root, skipping
    /// the real mount sequence. Used for non-root test environments where
    /// only the directory-tree bookkeeping (not an actual cgroupfs) is
    /// under test.
    pub fn attached(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn unmount(&self) -> Result<()> {
        umount(&self.root)?;
        Ok(())
    }

    fn resolve(&self, relpath: &str) -> Result<PathBuf> {
        if relpath.contains("..") {
            return Err(CgroupError::PathEscape(relpath.to_string()));
        }
        Ok(self.root.join(relpath))
    }

    /// Create `<root>/user-<uid>/<base>-<pid>/`, write `pid` into its
    /// `tasks` file, and return the relative path as the application's
    /// canonical cgroup id (spec §4.4).
    pub fn mkdir(&self, uid: u32, base: &str, pid: i32) -> Result<String> {
        let relpath = format!("user-{uid}/{base}-{pid}");
        let dir = self.resolve(&relpath)?;
        if let Err(e) = fs::create_dir_all(&dir) {
            return Err(io_err(&dir, e));
        }
        let tasks = dir.join("tasks");
        if let Err(e) = fs::write(&tasks, format!("{pid}\n")) {
            let _ = fs::remove_dir_all(&dir);
            return Err(io_err(&tasks, e));
        }
        Ok(relpath)
    }

    /// Remove a per-application cgroup directory. Idempotent: a directory
    /// already gone (raced by the kernel's release-agent notification, or
    /// by a prior call) is not an error (spec §4.4).
    pub fn rmdir(&self, relpath: &str) -> Result<()> {
        let dir = self.resolve(relpath)?;
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&dir, e)),
        }
    }

    /// Broadcast `signo` to every pid listed in `<relpath>/tasks`.
    pub fn signal(&self, relpath: &str, signo: Signal) -> Result<()> {
        let dir = self.resolve(relpath)?;
        let tasks_path = dir.join("tasks");
        let contents = match fs::read_to_string(&tasks_path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(io_err(&tasks_path, e)),
        };
        for line in contents.lines() {
            let Ok(pid) = line.trim().parse::<i32>() else { continue };
            // A pid that already exited is not a controller failure; the
            // kernel reaps cgroup membership on process exit regardless.
            let _ = kill(Pid::from_raw(pid), signo);
        }
        Ok(())
    }

    /// Parse `/proc/<pid>/cgroup` to find this controller's relative path
    /// for a running process (spec §4.4 `resolve_cgroup_of`).
    pub fn resolve_cgroup_of(&self, controller_name: &str, pid: i32) -> Result<Option<String>> {
        let proc_path = PathBuf::from(format!("/proc/{pid}/cgroup"));
        let contents = match fs::read_to_string(&proc_path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(&proc_path, e)),
        };
        for line in contents.lines() {
            // Format: hierarchy-id:subsystems:path
            let mut parts = line.splitn(3, ':');
            let (_, subsystems, path) = match (parts.next(), parts.next(), parts.next()) {
                (Some(h), Some(s), Some(p)) => (h, s, p),
                _ => continue,
            };
            if subsystems.split(',').any(|s| s == controller_name) {
                return Ok(Some(path.trim_start_matches('/').to_string()));
            }
        }
        Ok(None)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Whether `path`'s owner matches `uid` — used by the launcher to confirm
/// an application's cgroup directory is actually owned by the uid it
/// claims (defence against a forged `cleanup`/`stop` target).
pub fn owned_by(path: &Path, uid: u32) -> bool {
    fs::metadata(path).map(|m| m.uid() == uid).unwrap_or(false)
}

#[cfg(test)]
#[path = "cgroup_tests.rs"]
mod tests;
