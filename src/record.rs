//! Asset records and resolved resource state.

use crate::handle::{AssetKey, AssetRef};
use crate::kind::AssetKind;
use crate::metadata::{AssetMetadata, DependencyList};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Opaque id of a native resource owned by the resource manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(pub u64);

/// What a record's resource pointer currently refers to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResourceState {
    /// Never loaded, or load failed
    #[default]
    Unloaded,
    Loaded(ResourceId),
    /// The resource was deallocated; any use of it is a bug
    Poisoned,
}

impl ResourceState {
    #[inline]
    pub fn is_loaded(&self) -> bool {
        matches!(self, ResourceState::Loaded(_))
    }

    #[inline]
    pub fn is_poisoned(&self) -> bool {
        matches!(self, ResourceState::Poisoned)
    }

    /// The live resource, if any. Poisoned state yields `None`.
    #[inline]
    pub fn resource(&self) -> Option<ResourceId> {
        match self {
            ResourceState::Loaded(id) => Some(*id),
            _ => None,
        }
    }
}

/// One tracked asset.
#[derive(Clone, Debug)]
pub struct AssetRecord {
    pub(crate) kind: AssetKind,
    pub(crate) name: String,
    pub(crate) file: Option<PathBuf>,
    pub(crate) metadata: AssetMetadata,
    pub(crate) resource: ResourceState,
    pub(crate) ref_count: u32,
    pub(crate) last_validated: Option<SystemTime>,
}

impl AssetRecord {
    pub(crate) fn new(name: String, file: Option<PathBuf>, kind: AssetKind) -> Self {
        Self {
            kind,
            name,
            file,
            metadata: AssetMetadata::default_for(kind),
            resource: ResourceState::Unloaded,
            ref_count: 1,
            last_validated: None,
        }
    }

    pub fn kind(&self) -> AssetKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn key(&self) -> AssetKey {
        AssetKey::new(self.name.clone(), self.file.as_deref())
    }

    pub fn metadata(&self) -> &AssetMetadata {
        &self.metadata
    }

    pub fn resource(&self) -> ResourceState {
        self.resource
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    /// When the on-disk state was last accepted as current
    pub fn last_validated(&self) -> Option<SystemTime> {
        self.last_validated
    }

    /// Reference count reached zero; the record is waiting to be evicted.
    pub fn is_pending_eviction(&self) -> bool {
        self.ref_count == 0
    }

    pub fn dependencies(&self) -> DependencyList {
        self.metadata.dependencies()
    }

    pub fn depends_on(&self, asset: AssetRef) -> bool {
        self.metadata
            .links()
            .iter()
            .any(|(kind, link)| *kind == asset.kind && link.handle == Some(asset.handle))
    }
}
