// SPDX-License-Identifier: MIT

//! The manifest store (spec §4.5 "Lifecycle"): locates, reads, validates
//! and caches manifests.
//!
//! Spec §3 models manifests as explicitly reference-counted with a
//! `get`/`unref` pair. This port uses `Rc<Manifest>` instead: cloning the
//! `Rc` *is* the ref, dropping the last clone *is* the unref, and the
//! cache holds only a [`std::rc::Weak`] so a manifest whose refcount drops
//! to zero is simply gone the next time anyone looks — there is no
//! separate collection pass to run (see DESIGN.md).

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use crate::error::{ManifestError, Result};
use crate::manifest::{Manifest, Owner};

/// Manifest bodies are bounded to ~128 KiB (spec §4.5 "Format").
pub const MAX_MANIFEST_BYTES: u64 = 128 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    uid: Option<u32>,
    package: String,
}

/// Locates and loads manifests from a common directory and a per-user
/// subtree (spec §4.5 "Locations", §6 "Manifest file layout"), with an
/// optional process-wide cache.
pub struct Store {
    common_dir: PathBuf,
    user_root: PathBuf,
    caching: bool,
    cache: RefCell<HashMap<CacheKey, Weak<Manifest>>>,
}

impl Store {
    pub fn new(common_dir: impl Into<PathBuf>, user_root: impl Into<PathBuf>, caching: bool) -> Self {
        Self { common_dir: common_dir.into(), user_root: user_root.into(), caching, cache: RefCell::new(HashMap::new()) }
    }

    /// Resolve `package` for `owner`: the per-user directory first (if
    /// `owner` names a user), then the common directory (spec §4.5, §6
    /// "the first readable match wins user-first").
    fn locate(&self, owner: &Owner, package: &str) -> Result<PathBuf> {
        let filename = format!("{package}.manifest");
        if let Owner::User { name, .. } = owner {
            let candidate = self.user_root.join(name).join(&filename);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        let candidate = self.common_dir.join(&filename);
        if candidate.is_file() {
            return Ok(candidate);
        }
        Err(ManifestError::NotFound(package.to_string()))
    }

    fn read_bounded(path: &Path) -> Result<Vec<u8>> {
        let meta = std::fs::metadata(path).map_err(|source| ManifestError::Io { path: path.to_path_buf(), source })?;
        if meta.len() > MAX_MANIFEST_BYTES {
            return Err(ManifestError::TooLarge { path: path.to_path_buf(), limit: MAX_MANIFEST_BYTES as usize });
        }
        std::fs::read(path).map_err(|source| ManifestError::Io { path: path.to_path_buf(), source })
    }

    /// Resolve, load and validate `package` for `owner`. Returns a cached
    /// `Rc` if one is still alive and caching is enabled; otherwise loads
    /// from disk and, on success, caches a `Weak` handle for future
    /// lookups (spec §4.5 "Lifecycle").
    pub fn get(&self, owner: Owner, package: &str) -> Result<Rc<Manifest>> {
        let uid = match &owner {
            Owner::Common => None,
            Owner::User { uid, .. } => Some(*uid),
        };
        let key = CacheKey { uid, package: package.to_string() };

        if self.caching {
            if let Some(existing) = self.cache.borrow().get(&key).and_then(Weak::upgrade) {
                return Ok(existing);
            }
        }

        let path = self.locate(&owner, package)?;
        let bytes = Self::read_bounded(&path)?;
        let manifest = Rc::new(Manifest::parse(package, owner, path, &bytes));

        if self.caching {
            self.cache.borrow_mut().insert(key, Rc::downgrade(&manifest));
        }
        Ok(manifest)
    }

    /// Enumerate every `.manifest` file visible in the common directory
    /// plus every per-user directory, without loading them (spec §4.7
    /// `list:installed`'s discovery pass). Errors reading one directory
    /// don't abort the scan of the rest.
    pub fn discover(&self) -> Vec<(Owner, String)> {
        let mut found = Vec::new();
        if let Ok(entries) = std::fs::read_dir(&self.common_dir) {
            for entry in entries.flatten() {
                if let Some(package) = package_name_of(&entry.path()) {
                    found.push((Owner::Common, package));
                }
            }
        }
        if let Ok(users) = std::fs::read_dir(&self.user_root) {
            for user_entry in users.flatten() {
                let Ok(meta) = user_entry.metadata() else { continue };
                if !meta.is_dir() {
                    continue;
                }
                let Some(name) = user_entry.file_name().to_str().map(str::to_string) else { continue };
                if let Ok(entries) = std::fs::read_dir(user_entry.path()) {
                    for entry in entries.flatten() {
                        if let Some(package) = package_name_of(&entry.path()) {
                            // Real uid resolution is a `getpwnam`-style
                            // lookup the launcher crate owns (spec §4.7's
                            // peer-identity plumbing); the store only
                            // needs the directory name to locate files.
                            found.push((Owner::User { uid: 0, name: name.clone() }, package));
                        }
                    }
                }
            }
        }
        found
    }

    pub fn cached_len(&self) -> usize {
        self.cache.borrow().values().filter(|w| w.strong_count() > 0).count()
    }
}

fn package_name_of(path: &Path) -> Option<String> {
    if path.extension().and_then(|e| e.to_str()) != Some("manifest") {
        return None;
    }
    path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
