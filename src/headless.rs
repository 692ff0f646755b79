//! In-memory collaborators for tools, tests and benchmarks.
//!
//! `HeadlessResourceManager` hands out sequential resource ids, keeps a
//! live-resource table and lets callers inject create/deallocate failures
//! by asset name.

use ahash::{AHashMap, AHashSet};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use crate::backend::{
    AssetDescriptor, Collaborators, FileClock, FramePacing, GpuLock, MetadataStore,
    ResourceManager, TimeStampStore,
};
use crate::config::MountPoint;
use crate::error::{AssetError, Result};
use crate::kind::AssetKind;
use crate::metadata::AssetMetadata;
use crate::record::ResourceId;
use crate::tasks::InlineSubmitter;

/// One successful resource manager call, as journaled by
/// `HeadlessResourceManager::calls`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceCall {
    Create(AssetKind, String),
    Deallocate(AssetKind, String),
}

/// Resource manager that allocates nothing but ids.
pub struct HeadlessResourceManager {
    exclusive: Mutex<()>,
    stamps: Mutex<AHashMap<PathBuf, SystemTime>>,
    live: Mutex<AHashMap<ResourceId, (AssetKind, String)>>,
    fail_create: Mutex<AHashSet<String>>,
    fail_deallocate: Mutex<AHashSet<String>>,
    created: Mutex<Vec<(AssetKind, String)>>,
    calls: Mutex<Vec<ResourceCall>>,
    next_id: AtomicU64,
    creates: AtomicUsize,
    deallocations: AtomicUsize,
}

impl Default for HeadlessResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessResourceManager {
    pub fn new() -> Self {
        Self {
            exclusive: Mutex::new(()),
            stamps: Mutex::new(AHashMap::new()),
            live: Mutex::new(AHashMap::new()),
            fail_create: Mutex::new(AHashSet::new()),
            fail_deallocate: Mutex::new(AHashSet::new()),
            created: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            creates: AtomicUsize::new(0),
            deallocations: AtomicUsize::new(0),
        }
    }

    /// Every create for `name` fails until cleared
    pub fn fail_create(&self, name: &str) {
        self.fail_create.lock().insert(name.to_string());
    }

    /// Every deallocation for `name` fails until cleared
    pub fn fail_deallocate(&self, name: &str) {
        self.fail_deallocate.lock().insert(name.to_string());
    }

    pub fn clear_failures(&self) {
        self.fail_create.lock().clear();
        self.fail_deallocate.lock().clear();
    }

    pub fn is_live(&self, resource: ResourceId) -> bool {
        self.live.lock().contains_key(&resource)
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }

    /// Successful creates
    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    /// Successful deallocations
    pub fn deallocate_count(&self) -> usize {
        self.deallocations.load(Ordering::SeqCst)
    }

    /// Successfully created assets, in creation order
    pub fn created(&self) -> Vec<(AssetKind, String)> {
        self.created.lock().clone()
    }

    /// Creates and deallocations in the order they happened
    pub fn calls(&self) -> Vec<ResourceCall> {
        self.calls.lock().clone()
    }

    pub fn stamp_count(&self) -> usize {
        self.stamps.lock().len()
    }
}

impl TimeStampStore for HeadlessResourceManager {
    fn add_time_stamp(&self, path: &Path, stamp: SystemTime) -> bool {
        let mut stamps = self.stamps.lock();
        if stamps.contains_key(path) {
            return false;
        }
        stamps.insert(path.to_path_buf(), stamp);
        true
    }

    fn get_time_stamp(&self, path: &Path) -> Option<SystemTime> {
        self.stamps.lock().get(path).copied()
    }

    fn remove_time_stamp(&self, path: &Path) -> bool {
        self.stamps.lock().remove(path).is_some()
    }

    fn change_time_stamp(&self, path: &Path, stamp: SystemTime) -> bool {
        match self.stamps.lock().get_mut(path) {
            Some(existing) => {
                *existing = stamp;
                true
            }
            None => false,
        }
    }

    fn exists(&self, path: &Path) -> bool {
        self.stamps.lock().contains_key(path)
    }
}

impl ResourceManager for HeadlessResourceManager {
    fn exclusive(&self) -> &Mutex<()> {
        &self.exclusive
    }

    fn create_from_metadata(
        &self,
        asset: &AssetDescriptor,
        _mount: &MountPoint,
    ) -> Result<ResourceId> {
        if self.fail_create.lock().contains(&asset.name) {
            return Err(AssetError::CreateFailed {
                asset: asset.name.clone(),
                kind: asset.kind(),
                reason: "injected failure".to_string(),
            });
        }
        let id = ResourceId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.live.lock().insert(id, (asset.kind(), asset.name.clone()));
        self.created.lock().push((asset.kind(), asset.name.clone()));
        self.calls
            .lock()
            .push(ResourceCall::Create(asset.kind(), asset.name.clone()));
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    fn deallocate_from_metadata(
        &self,
        asset: &AssetDescriptor,
        resource: ResourceId,
        _mount: &MountPoint,
    ) -> Result<()> {
        let fail = |reason: &str| AssetError::DeallocateFailed {
            asset: asset.name.clone(),
            kind: asset.kind(),
            reason: reason.to_string(),
        };
        if self.fail_deallocate.lock().contains(&asset.name) {
            return Err(fail("injected failure"));
        }
        if self.live.lock().remove(&resource).is_none() {
            return Err(fail("resource is not live"));
        }
        self.calls
            .lock()
            .push(ResourceCall::Deallocate(asset.kind(), asset.name.clone()));
        self.deallocations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// File clock with hand-set modification times. Unknown paths read as
/// missing files.
#[derive(Default)]
pub struct ManualFileClock {
    times: Mutex<AHashMap<PathBuf, SystemTime>>,
}

impl ManualFileClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, path: &Path, modified: SystemTime) {
        self.times.lock().insert(path.to_path_buf(), modified);
    }

    pub fn remove(&self, path: &Path) {
        self.times.lock().remove(path);
    }
}

impl FileClock for ManualFileClock {
    fn modified(&self, path: &Path) -> std::io::Result<SystemTime> {
        self.times.lock().get(path).copied().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )
        })
    }
}

/// Metadata documents kept in memory. A document that was never inserted
/// reads as the kind's defaults.
#[derive(Default)]
pub struct MemoryMetadataStore {
    documents: Mutex<AHashMap<(AssetKind, String), AssetMetadata>>,
    fail_read: Mutex<AHashSet<String>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &str, metadata: AssetMetadata) {
        self.documents
            .lock()
            .insert((metadata.kind(), name.to_string()), metadata);
    }

    pub fn get(&self, kind: AssetKind, name: &str) -> Option<AssetMetadata> {
        self.documents.lock().get(&(kind, name.to_string())).cloned()
    }

    /// Reads of `name` fail until cleared
    pub fn fail_read(&self, name: &str) {
        self.fail_read.lock().insert(name.to_string());
    }

    pub fn clear_failures(&self) {
        self.fail_read.lock().clear();
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn read_metadata(
        &self,
        kind: AssetKind,
        name: &str,
        _file: Option<&Path>,
    ) -> Result<AssetMetadata> {
        if self.fail_read.lock().contains(name) {
            return Err(AssetError::MetadataRead {
                asset: name.to_string(),
                kind,
                reason: "injected failure".to_string(),
            });
        }
        Ok(self
            .get(kind, name)
            .unwrap_or_else(|| AssetMetadata::default_for(kind)))
    }

    fn write_metadata(
        &self,
        kind: AssetKind,
        name: &str,
        _file: Option<&Path>,
        metadata: &AssetMetadata,
    ) -> Result<()> {
        self.documents
            .lock()
            .insert((kind, name.to_string()), metadata.clone());
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockEvent {
    Locked(AssetKind),
    Unlocked(AssetKind),
}

/// GPU lock that records every transition
#[derive(Default)]
pub struct RecordingGpuLock {
    events: Mutex<Vec<LockEvent>>,
    held: AtomicUsize,
}

impl RecordingGpuLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LockEvent> {
        self.events.lock().clone()
    }

    /// Kinds currently locked
    pub fn held(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }
}

impl GpuLock for RecordingGpuLock {
    fn lock_for_kind(&self, kind: AssetKind) {
        self.held.fetch_add(1, Ordering::SeqCst);
        self.events.lock().push(LockEvent::Locked(kind));
    }

    fn unlock_for_kind(&self, kind: AssetKind) {
        self.held.fetch_sub(1, Ordering::SeqCst);
        self.events.lock().push(LockEvent::Unlocked(kind));
    }
}

#[derive(Default)]
pub struct RecordingPacing {
    elevated: AtomicBool,
    elevations: AtomicUsize,
}

impl RecordingPacing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_elevated(&self) -> bool {
        self.elevated.load(Ordering::SeqCst)
    }

    pub fn elevations(&self) -> usize {
        self.elevations.load(Ordering::SeqCst)
    }
}

impl FramePacing for RecordingPacing {
    fn elevate(&self) {
        self.elevated.store(true, Ordering::SeqCst);
        self.elevations.fetch_add(1, Ordering::SeqCst);
    }

    fn reset(&self) {
        self.elevated.store(false, Ordering::SeqCst);
    }
}

/// The full set of in-memory collaborators, kept reachable for inspection.
#[derive(Clone, Default)]
pub struct HeadlessBackend {
    pub resources: Arc<HeadlessResourceManager>,
    pub metadata: Arc<MemoryMetadataStore>,
    pub clock: Arc<ManualFileClock>,
    pub gpu: Arc<RecordingGpuLock>,
    pub pacing: Arc<RecordingPacing>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collaborators running every unit inline on the calling thread
    pub fn collaborators(&self) -> Collaborators {
        Collaborators::new(self.resources.clone(), self.metadata.clone())
            .with_tasks(Arc::new(InlineSubmitter))
            .with_gpu_lock(self.gpu.clone())
            .with_frame_pacing(self.pacing.clone())
            .with_clock(self.clock.clone())
    }
}
