// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types

use crate::kind::AssetKind;
use std::fmt;
use std::path::PathBuf;

/// Asset cache error type
///
/// Contract violations (invalid handles, wrong kinds, missing required
/// files) are not represented here: they panic at the call site.
#[derive(Debug, Clone)]
pub enum AssetError {
    /// Metadata file could not be read
    MetadataRead {
        asset: String,
        kind: AssetKind,
        reason: String,
    },

    /// Metadata file was read but could not be decoded
    MetadataParse {
        asset: String,
        kind: AssetKind,
        reason: String,
    },

    /// Metadata file could not be written
    MetadataWrite {
        asset: String,
        kind: AssetKind,
        reason: String,
    },

    /// The resource manager failed to create the native resource
    CreateFailed {
        asset: String,
        kind: AssetKind,
        reason: String,
    },

    /// The resource manager failed to release the native resource
    DeallocateFailed {
        asset: String,
        kind: AssetKind,
        reason: String,
    },

    /// A file the asset needs, such as its metadata document, does not exist
    MissingFile {
        asset: String,
        kind: AssetKind,
        path: PathBuf,
    },

    /// An exclusive operation is in flight; retry through the event queue
    LoadingLocked,

    /// The asset already has an in-flight create/reload/unload
    AlreadyLoading { asset: String, kind: AssetKind },

    /// Asset not found
    AssetNotFound(String),

    /// The reference view does not hold the asset
    NotReferenced { asset: String, kind: AssetKind },

    /// Reference view id is stale or was never created
    UnknownView,

    /// Invalid cache configuration
    Config(String),

    /// IO error (file operations, etc.)
    IoError(String),
}

impl AssetError {
    /// Name of the asset the error is about, if any
    pub fn asset_name(&self) -> Option<&str> {
        match self {
            AssetError::MetadataRead { asset, .. }
            | AssetError::MetadataParse { asset, .. }
            | AssetError::MetadataWrite { asset, .. }
            | AssetError::CreateFailed { asset, .. }
            | AssetError::DeallocateFailed { asset, .. }
            | AssetError::MissingFile { asset, .. }
            | AssetError::AlreadyLoading { asset, .. }
            | AssetError::NotReferenced { asset, .. } => Some(asset),
            AssetError::AssetNotFound(asset) => Some(asset),
            _ => None,
        }
    }

    /// True for failures that leave the cache consistent and may succeed on retry
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AssetError::MetadataRead { .. }
                | AssetError::MissingFile { .. }
                | AssetError::CreateFailed { .. }
                | AssetError::DeallocateFailed { .. }
                | AssetError::LoadingLocked
                | AssetError::AlreadyLoading { .. }
                | AssetError::IoError(_)
        )
    }
}

impl fmt::Display for AssetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetError::MetadataRead { asset, kind, reason } => {
                write!(f, "Failed to read {kind} metadata for '{asset}': {reason}")
            }
            AssetError::MetadataParse { asset, kind, reason } => {
                write!(f, "Malformed {kind} metadata for '{asset}': {reason}")
            }
            AssetError::MetadataWrite { asset, kind, reason } => {
                write!(f, "Failed to write {kind} metadata for '{asset}': {reason}")
            }
            AssetError::CreateFailed { asset, kind, reason } => {
                write!(f, "Failed to create {kind} '{asset}': {reason}")
            }
            AssetError::DeallocateFailed { asset, kind, reason } => {
                write!(f, "Failed to deallocate {kind} '{asset}': {reason}")
            }
            AssetError::MissingFile { asset, kind, path } => {
                write!(f, "Missing file for {kind} '{asset}': {}", path.display())
            }
            AssetError::LoadingLocked => write!(f, "Resource loading is currently locked"),
            AssetError::AlreadyLoading { asset, kind } => {
                write!(f, "{kind} '{asset}' is already being loaded")
            }
            AssetError::AssetNotFound(msg) => write!(f, "Asset not found: {msg}"),
            AssetError::NotReferenced { asset, kind } => {
                write!(f, "{kind} '{asset}' is not referenced by this view")
            }
            AssetError::UnknownView => write!(f, "Unknown reference view"),
            AssetError::Config(msg) => write!(f, "Configuration error: {msg}"),
            AssetError::IoError(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for AssetError {}

impl From<std::io::Error> for AssetError {
    fn from(err: std::io::Error) -> Self {
        AssetError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for AssetError {
    fn from(err: serde_json::Error) -> Self {
        AssetError::Config(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AssetError>;
