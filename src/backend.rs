//! Interfaces of the collaborators the cache drives: the resource manager
//! and its timestamp store, the GPU lock, the frame-pacing hint, task
//! submission, metadata serialization and file clocks.

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::config::MountPoint;
use crate::error::Result;
use crate::handle::AssetRef;
use crate::kind::AssetKind;
use crate::metadata::AssetMetadata;
use crate::record::{AssetRecord, ResourceId};
use crate::tasks::InlineSubmitter;

/// Everything the resource manager needs to build one asset. Owned so it
/// can travel to worker threads.
#[derive(Clone, Debug)]
pub struct AssetDescriptor {
    pub asset: AssetRef,
    pub name: String,
    pub file: Option<PathBuf>,
    pub metadata: AssetMetadata,
    /// Resolved dependency resources, in link order
    pub dependencies: Vec<(AssetRef, Option<ResourceId>)>,
}

impl AssetDescriptor {
    pub fn kind(&self) -> AssetKind {
        self.asset.kind
    }

    /// Snapshot of a record; dependency resources are filled by the caller.
    pub fn from_record(asset: AssetRef, record: &AssetRecord) -> Self {
        Self {
            asset,
            name: record.name().to_string(),
            file: record.file().map(Path::to_path_buf),
            metadata: record.metadata().clone(),
            dependencies: Vec::new(),
        }
    }
}

/// Outcome of swapping an old resource for a new one.
#[derive(Debug)]
pub struct ReloadOutcome {
    pub deallocated: Result<()>,
    pub created: Result<ResourceId>,
}

/// Last-validated timestamps, keyed by metadata file path.
pub trait TimeStampStore: Send + Sync {
    /// Returns false if a stamp already existed
    fn add_time_stamp(&self, path: &Path, stamp: SystemTime) -> bool;
    fn get_time_stamp(&self, path: &Path) -> Option<SystemTime>;
    fn remove_time_stamp(&self, path: &Path) -> bool;
    /// Returns false if no stamp existed
    fn change_time_stamp(&self, path: &Path, stamp: SystemTime) -> bool;
    fn exists(&self, path: &Path) -> bool;

    /// Insert or overwrite
    fn set_time_stamp(&self, path: &Path, stamp: SystemTime) {
        if !self.change_time_stamp(path, stamp) {
            self.add_time_stamp(path, stamp);
        }
    }
}

/// The engine-side allocator of native resources.
pub trait ResourceManager: TimeStampStore {
    /// Exclusive lock serializing every structural create/destroy
    fn exclusive(&self) -> &Mutex<()>;

    fn create_from_metadata(
        &self,
        asset: &AssetDescriptor,
        mount: &MountPoint,
    ) -> Result<ResourceId>;

    fn deallocate_from_metadata(
        &self,
        asset: &AssetDescriptor,
        resource: ResourceId,
        mount: &MountPoint,
    ) -> Result<()>;

    /// Replace `old_resource` with a resource built from `new`
    fn reload_from_metadata(
        &self,
        old: &AssetDescriptor,
        old_resource: Option<ResourceId>,
        new: &AssetDescriptor,
        mount: &MountPoint,
    ) -> ReloadOutcome {
        let deallocated = match old_resource {
            Some(resource) => self.deallocate_from_metadata(old, resource, mount),
            None => Ok(()),
        };
        let created = self.create_from_metadata(new, mount);
        ReloadOutcome {
            deallocated,
            created,
        }
    }
}

/// Per-kind advisory GPU lock, taken after the resource-manager lock.
pub trait GpuLock: Send + Sync {
    fn lock_for_kind(&self, kind: AssetKind);
    fn unlock_for_kind(&self, kind: AssetKind);
}

/// Frame-pacing hint raised while exclusive work runs.
pub trait FramePacing: Send + Sync {
    fn elevate(&self);
    fn reset(&self);
}

pub struct NoGpuLock;

impl GpuLock for NoGpuLock {
    fn lock_for_kind(&self, _kind: AssetKind) {}
    fn unlock_for_kind(&self, _kind: AssetKind) {}
}

pub struct NoFramePacing;

impl FramePacing for NoFramePacing {
    fn elevate(&self) {}
    fn reset(&self) {}
}

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Background work submission.
pub trait TaskSubmitter: Send + Sync {
    fn submit_background(&self, task: Task);
    /// Submit a group of tasks that may run in parallel
    fn submit_and_wake_many(&self, tasks: Vec<Task>);
}

/// Per-kind metadata reader/writer.
pub trait MetadataStore: Send + Sync {
    fn read_metadata(
        &self,
        kind: AssetKind,
        name: &str,
        file: Option<&Path>,
    ) -> Result<AssetMetadata>;

    fn write_metadata(
        &self,
        kind: AssetKind,
        name: &str,
        file: Option<&Path>,
        metadata: &AssetMetadata,
    ) -> Result<()>;
}

/// File modification times
pub trait FileClock: Send + Sync {
    fn modified(&self, path: &Path) -> std::io::Result<SystemTime>;
}

/// File clock backed by the real file system
pub struct SystemFileClock;

impl FileClock for SystemFileClock {
    fn modified(&self, path: &Path) -> std::io::Result<SystemTime> {
        std::fs::metadata(path)?.modified()
    }
}

/// Every collaborator the context drives, shared with worker threads.
#[derive(Clone)]
pub struct Collaborators {
    pub resources: Arc<dyn ResourceManager>,
    pub metadata: Arc<dyn MetadataStore>,
    pub tasks: Arc<dyn TaskSubmitter>,
    pub gpu: Arc<dyn GpuLock>,
    pub pacing: Arc<dyn FramePacing>,
    pub clock: Arc<dyn FileClock>,
}

impl Collaborators {
    /// Synchronous task execution, no GPU lock, no pacing, real file times
    pub fn new(resources: Arc<dyn ResourceManager>, metadata: Arc<dyn MetadataStore>) -> Self {
        Self {
            resources,
            metadata,
            tasks: Arc::new(InlineSubmitter),
            gpu: Arc::new(NoGpuLock),
            pacing: Arc::new(NoFramePacing),
            clock: Arc::new(SystemFileClock),
        }
    }

    pub fn with_tasks(mut self, tasks: Arc<dyn TaskSubmitter>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn with_gpu_lock(mut self, gpu: Arc<dyn GpuLock>) -> Self {
        self.gpu = gpu;
        self
    }

    pub fn with_frame_pacing(mut self, pacing: Arc<dyn FramePacing>) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn FileClock>) -> Self {
        self.clock = clock;
        self
    }
}
