//! Async load, reload and unload units.
//!
//! A unit runs on a worker thread inside an [`ExclusiveSection`]. It works
//! on a private staging copy of the record store and never touches the
//! primary store; the finished result travels back as a [`Continuation`]
//! that the context merges during its pump.

pub mod load;
pub mod reload;
pub mod unload;

use ahash::AHashMap;
use crossbeam::channel::Sender;
use std::sync::Arc;

use crate::backend::{
    AssetDescriptor, Collaborators, FramePacing, GpuLock, ResourceManager, TaskSubmitter,
};
use crate::config::MountPoint;
use crate::database::AssetDatabase;
use crate::handle::AssetRef;
use crate::kind::AssetKind;
use crate::locks::ExclusiveSection;

pub use load::LoadResult;
pub use reload::{ReloadRequest, ReloadResult};
pub use unload::{Teardown, UnloadResult};

/// What an in-flight unit is doing to an asset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadPhase {
    Loading,
    Reloading,
    Unloading,
}

/// Assets with an in-flight unit. Each asset appears at most once.
#[derive(Clone, Debug, Default)]
pub struct LoadingSet {
    entries: AHashMap<AssetRef, LoadPhase>,
}

impl LoadingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false, leaving the set untouched, if the asset is already in flight.
    pub fn try_insert(&mut self, asset: AssetRef, phase: LoadPhase) -> bool {
        if self.entries.contains_key(&asset) {
            return false;
        }
        self.entries.insert(asset, phase);
        true
    }

    /// All-or-nothing insert of a batch
    pub fn try_insert_all(&mut self, assets: &[AssetRef], phase: LoadPhase) -> bool {
        if assets.iter().any(|a| self.entries.contains_key(a)) {
            return false;
        }
        for &asset in assets {
            self.entries.insert(asset, phase);
        }
        true
    }

    pub fn remove(&mut self, asset: AssetRef) -> Option<LoadPhase> {
        self.entries.remove(&asset)
    }

    pub fn contains(&self, asset: AssetRef) -> bool {
        self.entries.contains_key(&asset)
    }

    pub fn phase(&self, asset: AssetRef) -> Option<LoadPhase> {
        self.entries.get(&asset).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AssetRef, LoadPhase)> + '_ {
        self.entries.iter().map(|(asset, phase)| (*asset, *phase))
    }
}

/// Finished unit, handed from a worker back to the serialized context.
pub enum Continuation {
    Loaded(LoadResult),
    Unloaded(UnloadResult),
    Reloaded(ReloadResult),
}

impl Continuation {
    pub fn label(&self) -> &'static str {
        match self {
            Continuation::Loaded(_) => "load",
            Continuation::Unloaded(_) => "unload",
            Continuation::Reloaded(_) => "reload",
        }
    }
}

/// The slice of the context a worker may touch.
#[derive(Clone)]
pub struct WorkerEnv {
    pub resources: Arc<dyn ResourceManager>,
    pub gpu: Arc<dyn GpuLock>,
    pub pacing: Arc<dyn FramePacing>,
    pub tasks: Arc<dyn TaskSubmitter>,
    pub mount: MountPoint,
    completions: Sender<Continuation>,
}

impl WorkerEnv {
    pub(crate) fn new(
        collaborators: &Collaborators,
        mount: MountPoint,
        completions: Sender<Continuation>,
    ) -> Self {
        Self {
            resources: collaborators.resources.clone(),
            gpu: collaborators.gpu.clone(),
            pacing: collaborators.pacing.clone(),
            tasks: collaborators.tasks.clone(),
            mount,
            completions,
        }
    }

    pub fn section(&self, kinds: &[AssetKind]) -> ExclusiveSection<'_> {
        ExclusiveSection::acquire(&*self.resources, &*self.gpu, &*self.pacing, kinds)
    }

    /// Post the continuation event for a finished unit
    pub(crate) fn complete(&self, continuation: Continuation) {
        let label = continuation.label();
        if self.completions.send(continuation).is_err() {
            tracing::warn!(unit = label, "asset context dropped before the unit finished");
        }
    }
}

/// Owned snapshot of a record with its dependencies' current resources.
pub fn describe(db: &AssetDatabase, asset: AssetRef) -> AssetDescriptor {
    let record = db.record(asset);
    let mut descriptor = AssetDescriptor::from_record(asset, record);
    descriptor.dependencies = record
        .dependencies()
        .into_iter()
        .map(|dep| (dep, db.get(dep).and_then(|r| r.resource().resource())))
        .collect();
    descriptor
}
