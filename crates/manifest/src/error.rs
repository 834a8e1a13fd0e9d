// SPDX-License-Identifier: MIT

//! Manifest-store error classification (spec §7). Validation failures are
//! not modelled as [`ManifestError`] — a manifest that fails validation is
//! still a `Manifest` value, just one whose [`crate::ValidationStatus`] is
//! non-empty (spec §4.5 "Validation is purely local ... the sole authority
//! on whether a manifest is usable"). `ManifestError` covers the cases
//! where no `Manifest` can be produced at all.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest not found for package {0:?}")]
    NotFound(String),

    #[error("i/o error reading {path:?}: {source}")]
    Io { path: std::path::PathBuf, #[source] source: std::io::Error },

    #[error("manifest at {path:?} exceeds the {limit} byte size bound")]
    TooLarge { path: std::path::PathBuf, limit: usize },

    #[error("malformed json in {path:?}: {source}")]
    Json { path: std::path::PathBuf, #[source] source: serde_json::Error },
}

pub type Result<T> = std::result::Result<T, ManifestError>;
