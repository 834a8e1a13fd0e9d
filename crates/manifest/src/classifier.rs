// SPDX-License-Identifier: MIT

//! The per-manifest path classifier (spec §4.5): maps a file path to
//! `(application, security type)`.
//!
//! Built once at manifest load time from each application's `file-types`
//! map. Classification proceeds in three stages, checked in order: an
//! exact-path hash, an ordered list of glob patterns compiled to regexes
//! (first match wins — see the "known limitation" note on
//! [`PathClassifier::classify_with_mode`]), then a root-prefix fallback
//! that derives a default type from the path's file mode.

use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

/// The five security types a path can be classified as (spec §1, §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileType {
    Private,
    Public,
    PublicRo,
    Rw,
    Ro,
}

impl FileType {
    /// Parse a `file-types` map key (spec §4.5's recognised keys).
    pub fn from_manifest_key(key: &str) -> Option<FileType> {
        match key {
            "private" => Some(FileType::Private),
            "public" => Some(FileType::Public),
            "public-ro" => Some(FileType::PublicRo),
            "rw" => Some(FileType::Rw),
            "ro" => Some(FileType::Ro),
            _ => None,
        }
    }
}

/// `(application-index, type)` — the outcome of every classification
/// stage. The application index is into [`crate::Manifest::applications`].
pub type Slot = (usize, FileType);

/// Characters that make a `file-types` pattern a glob rather than a
/// literal path (spec §4.5 "Any pattern without glob metacharacters
/// (`*?[{`)").
const GLOB_METACHARS: [char; 4] = ['*', '?', '[', '{'];

fn is_glob(pattern: &str) -> bool {
    pattern.chars().any(|c| GLOB_METACHARS.contains(&c))
}

/// Translate a shell-style glob into an anchored regex. Supports `*`
/// (any run of characters), `?` (one character), `[...]` character
/// classes passed through verbatim, and non-nested `{a,b,c}` alternation.
fn glob_to_regex(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    let mut out = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '.' | '+' | '(' | ')' | '|' | '^' | '$' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '[' => {
                out.push('[');
                for c2 in chars.by_ref() {
                    out.push(c2);
                    if c2 == ']' {
                        break;
                    }
                }
            }
            '{' => {
                out.push('(');
                for c2 in chars.by_ref() {
                    match c2 {
                        ',' => out.push('|'),
                        '}' => {
                            out.push(')');
                            break;
                        }
                        other => out.push(other),
                    }
                }
            }
            other => out.push(other),
        }
    }
    out.push('$');
    Regex::new(&out)
}

/// Built once per manifest load (spec §4.5): application roots, the exact
/// hash, and the ordered regex list.
#[derive(Debug)]
pub struct PathClassifier {
    /// `(application-index, root)` in declaration order.
    roots: Vec<(usize, PathBuf)>,
    exact: HashMap<PathBuf, Slot>,
    /// Declaration order; classification takes the first match.
    regexes: Vec<(Regex, Slot)>,
}

impl PathClassifier {
    pub fn builder() -> PathClassifierBuilder {
        PathClassifierBuilder::default()
    }

    /// Classify `path` given its file mode (as `st_mode`'s permission
    /// bits), if known — `None` when the path doesn't exist (the root
    /// fallback then defaults to [`FileType::Private`], the most
    /// restrictive outcome, rather than guessing).
    ///
    /// Known limitation (spec §9 open question): the regex stage returns
    /// the *first* declaration-order match, not the longest; this mirrors
    /// the source rather than picking a safer tie-breaker.
    pub fn classify_with_mode(&self, path: &Path, mode: Option<u32>) -> Option<Slot> {
        if let Some(&slot) = self.exact.get(path) {
            return Some(slot);
        }
        let path_str = path.to_string_lossy();
        for (re, slot) in &self.regexes {
            if re.is_match(path_str.as_ref()) {
                return Some(*slot);
            }
        }
        self.classify_by_root(path, mode)
    }

    /// Stat `path` on disk and classify it. Convenience wrapper around
    /// [`PathClassifier::classify_with_mode`] for callers that don't
    /// already have the file's mode bits.
    pub fn classify(&self, path: &Path) -> Option<Slot> {
        let mode = std::fs::metadata(path).ok().map(|m| m.permissions().mode());
        self.classify_with_mode(path, mode)
    }

    fn classify_by_root(&self, path: &Path, mode: Option<u32>) -> Option<Slot> {
        let path_str = path.to_string_lossy();
        let mut best: Option<(usize, usize)> = None;
        for (app_index, root) in &self.roots {
            let root_str = root.to_string_lossy();
            let matches = path_str.as_ref() == root_str.as_ref()
                || path_str.starts_with(&format!("{root_str}/"));
            if !matches {
                continue;
            }
            let len = root_str.len();
            let better = match best {
                Some((_, best_len)) => len > best_len,
                None => true,
            };
            if better {
                best = Some((*app_index, len));
            }
        }
        let (app_index, _) = best?;
        let file_type = mode.map(default_type_from_mode).unwrap_or(FileType::Private);
        Some((app_index, file_type))
    }

    pub fn application_root(&self, app_index: usize) -> Option<&Path> {
        self.roots.iter().find(|(i, _)| *i == app_index).map(|(_, p)| p.as_path())
    }
}

/// Root-fallback default type from `st_mode` permission bits (spec §4.5's
/// table). Executable files are never assigned a writable type.
fn default_type_from_mode(mode: u32) -> FileType {
    const S_IXUSR: u32 = 0o100;
    const S_IXGRP: u32 = 0o010;
    const S_IXOTH: u32 = 0o001;
    const S_IRGRP: u32 = 0o040;
    const S_IWGRP: u32 = 0o020;
    const S_IROTH: u32 = 0o004;
    const S_IWOTH: u32 = 0o002;

    let executable = mode & (S_IXUSR | S_IXGRP | S_IXOTH) != 0;
    let other_readable = mode & S_IROTH != 0;
    let other_writable = mode & S_IWOTH != 0;
    let group_readable = mode & S_IRGRP != 0;
    let group_writable = mode & S_IWGRP != 0;

    if executable {
        if other_readable {
            FileType::PublicRo
        } else if group_readable {
            FileType::Ro
        } else {
            FileType::Private
        }
    } else if group_readable && group_writable && other_readable && other_writable {
        FileType::Public
    } else if other_readable {
        FileType::PublicRo
    } else if group_readable && group_writable {
        FileType::Rw
    } else if group_readable {
        FileType::Ro
    } else {
        FileType::Private
    }
}

#[derive(Default)]
pub struct PathClassifierBuilder {
    roots: Vec<(usize, PathBuf)>,
    exact: HashMap<PathBuf, Slot>,
    regexes: Vec<(Regex, Slot)>,
}

impl PathClassifierBuilder {
    /// Register `app_index`'s root, derived from its `execute[0]` (spec
    /// §4.5 stage 1): the argv path's directory, collapsed to its parent
    /// when that directory is named `bin`. A standard user-home prefix in
    /// `execute0` resolves to the same directory by the same rule — the
    /// distilled spec draws a distinction here the original source's
    /// behaviour doesn't actually require (see DESIGN.md).
    pub fn add_root(&mut self, app_index: usize, execute0: &Path) -> &mut Self {
        let dir = match execute0.parent() {
            Some(d) if !d.as_os_str().is_empty() => d,
            _ => Path::new("/"),
        };
        let root = if dir.file_name().map(|n| n == "bin").unwrap_or(false) {
            dir.parent().unwrap_or(dir).to_path_buf()
        } else {
            dir.to_path_buf()
        };
        self.roots.push((app_index, root));
        self
    }

    /// Register one `file-types` pattern for `app_index`, routing it to
    /// the exact-path hash or the regex list by whether it contains glob
    /// metacharacters (spec §4.5 stages 2/3).
    pub fn add_pattern(&mut self, app_index: usize, pattern: &str, file_type: FileType) -> std::result::Result<(), regex::Error> {
        let slot = (app_index, file_type);
        if is_glob(pattern) {
            self.regexes.push((glob_to_regex(pattern)?, slot));
        } else {
            self.exact.insert(PathBuf::from(pattern), slot);
        }
        Ok(())
    }

    pub fn build(self) -> PathClassifier {
        PathClassifier { roots: self.roots, exact: self.exact, regexes: self.regexes }
    }
}

#[cfg(test)]
#[path = "classifier_tests.rs"]
mod tests;
