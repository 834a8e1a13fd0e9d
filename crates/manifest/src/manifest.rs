// SPDX-License-Identifier: MIT

//! The `Manifest` value (spec §3, §4.5): one package's parsed, validated
//! applications plus the path classifier built from their `file-types`
//! declarations.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::classifier::{FileType, PathClassifier, PathClassifierBuilder};
use crate::validate::ValidationStatus;

/// Who a manifest belongs to — the common (shared) tree, or a specific
/// user's per-user tree (spec §4.5 "Locations").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Owner {
    Common,
    User { uid: u32, name: String },
}

/// One application's validated fields (spec §3 "Manifest", §4.5 "Format").
#[derive(Debug, Clone)]
pub struct Application {
    pub name: String,
    pub description: Option<String>,
    pub privileges: Vec<String>,
    pub execute: Vec<String>,
    pub desktop: Option<PathBuf>,
    /// Declaration order preserved, since it also drives the classifier's
    /// regex match order (spec §4.5 stage 3).
    pub file_types: Vec<(FileType, Vec<String>)>,
    pub status: ValidationStatus,
}

impl Application {
    fn empty(name: String, status: ValidationStatus) -> Self {
        Self { name, description: None, privileges: Vec::new(), execute: Vec::new(), desktop: None, file_types: Vec::new(), status }
    }
}

/// A loaded, validated manifest (spec §3 "Manifest"). Always constructible
/// — a manifest that fails validation is still a `Manifest`, just one
/// whose `status` is non-empty and, when [`ValidationStatus::is_loadable`]
/// is false, unusable by the launcher (spec §4.5).
#[derive(Debug)]
pub struct Manifest {
    pub package: String,
    pub owner: Owner,
    pub path: PathBuf,
    pub applications: Vec<Application>,
    pub status: ValidationStatus,
    classifier: PathClassifier,
}

impl Manifest {
    pub fn application(&self, name: &str) -> Option<&Application> {
        self.applications.iter().find(|a| a.name == name)
    }

    /// Classify `path`, statting it on disk for the root-fallback stage
    /// (spec §4.5 stage 3).
    pub fn classify<'a>(&'a self, path: &Path) -> Option<(&'a Application, FileType)> {
        let (idx, file_type) = self.classifier.classify(path)?;
        self.applications.get(idx).map(|app| (app, file_type))
    }

    /// Classify `path` given an already-known file mode, for callers that
    /// stat once and classify many paths (or tests with no real files).
    pub fn classify_with_mode<'a>(&'a self, path: &Path, mode: Option<u32>) -> Option<(&'a Application, FileType)> {
        let (idx, file_type) = self.classifier.classify_with_mode(path, mode)?;
        self.applications.get(idx).map(|app| (app, file_type))
    }

    /// Parse and validate raw JSON bytes into a `Manifest`. `package` is
    /// the `.manifest` filename's stem; `expected_single_app_name`, when
    /// `Some`, is the application name the single-object form's
    /// `application` field must equal (spec §4.5 "a manifest filename
    /// `foo.manifest` declares a package named `foo`").
    pub fn parse(package: &str, owner: Owner, path: PathBuf, bytes: &[u8]) -> Manifest {
        let mut status = ValidationStatus::EMPTY;
        let value: Value = match serde_json::from_slice(bytes) {
            Ok(v) => v,
            Err(_) => {
                status |= ValidationStatus::MALFORMED | ValidationStatus::UNLOADABLE;
                return Manifest { package: package.to_string(), owner, path, applications: Vec::new(), status, classifier: PathClassifier::builder().build() };
            }
        };

        let raw_apps: Vec<Value> = match &value {
            Value::Array(items) => items.clone(),
            Value::Object(_) => vec![value],
            _ => {
                status |= ValidationStatus::MALFORMED | ValidationStatus::UNLOADABLE;
                return Manifest { package: package.to_string(), owner, path, applications: Vec::new(), status, classifier: PathClassifier::builder().build() };
            }
        };
        let single_app_form = raw_apps.len() == 1 && matches!(&value, Value::Object(_));

        let mut builder = PathClassifier::builder();
        let mut applications = Vec::with_capacity(raw_apps.len());
        let mut seen_names = std::collections::HashSet::new();

        for (index, raw) in raw_apps.iter().enumerate() {
            let (app, app_status) = validate_application(raw, &mut builder, index);
            status |= app_status;

            let name_required = if single_app_form { Some(package) } else { None };
            if let Some(expected) = name_required {
                if app.name != expected {
                    status |= ValidationStatus::MISNAMED;
                }
            }
            if !seen_names.insert(app.name.clone()) {
                // Open question (spec §9): the original source doesn't
                // cross-check application-name uniqueness across a
                // multi-app manifest; this port enforces it.
                status |= ValidationStatus::MALFORMED | ValidationStatus::UNLOADABLE;
            }
            applications.push(app);
        }
        // Multi-app form: the filename stem (`package`) already equals
        // the package name by construction (see `Store::get`); no
        // per-application field is compared against it.

        Manifest { package: package.to_string(), owner, path, applications, status, classifier: builder.build() }
    }
}

fn validate_application(raw: &Value, builder: &mut PathClassifierBuilder, app_index: usize) -> (Application, ValidationStatus) {
    let mut status = ValidationStatus::EMPTY;
    let Some(obj) = raw.as_object() else {
        status |= ValidationStatus::MALFORMED | ValidationStatus::UNLOADABLE;
        return (Application::empty(String::new(), status), status);
    };

    let name = match obj.get("application") {
        Some(Value::String(s)) => s.clone(),
        Some(_) => {
            status |= ValidationStatus::INVALID_FIELD | ValidationStatus::UNLOADABLE;
            String::new()
        }
        None => {
            status |= ValidationStatus::MISSING_FIELD | ValidationStatus::UNLOADABLE;
            String::new()
        }
    };

    let description = match obj.get("description") {
        None => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            status |= ValidationStatus::INVALID_FIELD;
            None
        }
    };

    let mut privileges = Vec::new();
    match obj.get("privileges") {
        None => {}
        Some(Value::Array(items)) => {
            for item in items {
                match item.as_str() {
                    Some(s) => privileges.push(s.to_string()),
                    None => status |= ValidationStatus::INVALID_PRIVILEGE,
                }
            }
        }
        Some(_) => status |= ValidationStatus::INVALID_FIELD | ValidationStatus::INVALID_PRIVILEGE,
    }

    let mut execute = Vec::new();
    match obj.get("execute") {
        None => status |= ValidationStatus::MISSING_FIELD | ValidationStatus::UNLOADABLE,
        Some(Value::Array(items)) if !items.is_empty() => {
            let mut all_strings = true;
            for item in items {
                match item.as_str() {
                    Some(s) => execute.push(s.to_string()),
                    None => all_strings = false,
                }
            }
            if !all_strings {
                status |= ValidationStatus::INVALID_FIELD | ValidationStatus::UNLOADABLE;
                execute.clear();
            } else if !is_executable_regular_file(Path::new(&execute[0])) {
                status |= ValidationStatus::INVALID_BINARY;
            }
        }
        Some(_) => status |= ValidationStatus::INVALID_FIELD | ValidationStatus::UNLOADABLE,
    }

    let desktop = match obj.get("desktop") {
        None => None,
        Some(Value::String(s)) => {
            let p = PathBuf::from(s);
            if is_regular_file(&p) {
                Some(p)
            } else {
                status |= ValidationStatus::INVALID_DESKTOP;
                Some(p)
            }
        }
        Some(_) => {
            status |= ValidationStatus::INVALID_FIELD;
            None
        }
    };

    let mut file_types = Vec::new();
    match obj.get("file-types") {
        None => {}
        Some(Value::Object(map)) => {
            for (key, patterns) in map {
                let Some(file_type) = FileType::from_manifest_key(key) else {
                    status |= ValidationStatus::INVALID_FIELD;
                    continue;
                };
                let Some(patterns) = patterns.as_array() else {
                    status |= ValidationStatus::INVALID_FIELD;
                    continue;
                };
                let mut collected = Vec::with_capacity(patterns.len());
                for pattern in patterns {
                    match pattern.as_str() {
                        Some(p) => {
                            if builder.add_pattern(app_index, p, file_type).is_err() {
                                status |= ValidationStatus::INVALID_FIELD;
                            } else {
                                collected.push(p.to_string());
                            }
                        }
                        None => status |= ValidationStatus::INVALID_FIELD,
                    }
                }
                file_types.push((file_type, collected));
            }
        }
        Some(_) => status |= ValidationStatus::INVALID_FIELD,
    }

    if !execute.is_empty() {
        builder.add_root(app_index, Path::new(&execute[0]));
    }

    (Application { name, description, privileges, execute, desktop, file_types, status }, status)
}

fn is_executable_regular_file(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

fn is_regular_file(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
