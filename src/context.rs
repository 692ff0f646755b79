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

//! The asset context: record store, reference views, loading set, event
//! queue and listeners behind one object.
//!
//! Every method runs on the serialized mutation context. Structural
//! operations come in two flavours: `try_*` runs now and fails with
//! [`AssetError::LoadingLocked`] while a unit is in flight, `post_*` goes
//! through the deferred event queue and reports through a callback.

use ahash::AHashMap;
use crossbeam::channel::{Receiver, Sender};
use slotmap::SlotMap;
use std::path::{Path, PathBuf};
use std::task::Poll;
use std::time::{Duration, Instant};

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::backend::{AssetDescriptor, Collaborators, TimeStampStore};
use crate::config::{CacheConfig, MountPoint};
use crate::database::{AssetDatabase, Registration};
use crate::dependency::{self, dependency_closure, dependent_closure, LoadPlan};
use crate::diagnostics::{Diagnostic, DiagnosticLog, Severity};
use crate::error::{AssetError, Result};
use crate::event::{EventQueue, Guard};
use crate::handle::{AssetGroups, AssetRef};
use crate::kind::AssetKind;
use crate::metadata::{AssetMetadata, DependencyList};
use crate::notify::{AssetListener, ListenerId, ListenerRegistry, PointerChange};
use crate::orchestrator::{
    describe, load, reload, unload, Continuation, LoadPhase, LoadResult, LoadingSet,
    ReloadRequest, ReloadResult, Teardown, UnloadResult, WorkerEnv,
};
use crate::record::{AssetRecord, ResourceId, ResourceState};
use crate::staleness::{self, StalenessScan};
use crate::view::{ReferenceView, StagedChange, ViewId};

/// A native resource whose deallocation failed after its record was evicted.
#[derive(Clone, Debug)]
pub struct QuarantinedResource {
    pub descriptor: AssetDescriptor,
    pub resource: ResourceId,
    pub error: AssetError,
}

/// Reference count that disagrees with views plus dependency links.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefCountMismatch {
    pub asset: AssetRef,
    pub name: String,
    pub expected: u32,
    pub actual: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReloadStatus {
    /// Metadata unchanged, files not newer, resource loaded
    UpToDate,
    /// A reload unit was submitted covering `scope` assets
    Submitted { scope: usize },
}

/// Outcome of the last completed reload unit
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReloadSummary {
    pub root: AssetRef,
    pub waves: usize,
    pub processed: usize,
    pub failed: usize,
    pub capped: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PumpReport {
    pub continuations: usize,
    pub events_run: usize,
    pub events_pending: usize,
}

pub struct AssetContext {
    config: CacheConfig,
    mount: MountPoint,
    collaborators: Collaborators,
    db: AssetDatabase,
    views: SlotMap<ViewId, ReferenceView>,
    global: ViewId,
    loading: LoadingSet,
    events: EventQueue,
    listeners: ListenerRegistry,
    diagnostics: DiagnosticLog,
    quarantine: Vec<QuarantinedResource>,
    completions: Sender<Continuation>,
    continuations: Receiver<Continuation>,
    in_flight: usize,
    last_reload: Option<ReloadSummary>,
}

impl AssetContext {
    pub fn new(config: CacheConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        let mount = config.mount_point();
        let mut views = SlotMap::with_key();
        let global = views.insert(ReferenceView::new("global"));
        let (completions, continuations) = crossbeam::channel::unbounded();
        tracing::info!(root = %mount.root().display(), "asset context created");
        Ok(Self {
            config,
            mount,
            collaborators,
            db: AssetDatabase::new(),
            views,
            global,
            loading: LoadingSet::new(),
            events: EventQueue::new(),
            listeners: ListenerRegistry::new(),
            diagnostics: DiagnosticLog::new(),
            quarantine: Vec::new(),
            completions,
            continuations,
            in_flight: 0,
            last_reload: None,
        })
    }

    // ---- accessors ----

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn mount(&self) -> &MountPoint {
        &self.mount
    }

    pub fn database(&self) -> &AssetDatabase {
        &self.db
    }

    pub fn loading(&self) -> &LoadingSet {
        &self.loading
    }

    pub fn is_loading(&self, asset: AssetRef) -> bool {
        self.loading.contains(asset)
    }

    /// True while any exclusive unit is in flight
    pub fn loading_prevented(&self) -> bool {
        self.in_flight > 0
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight == 0 && self.events.is_empty()
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    pub fn quarantined(&self) -> &[QuarantinedResource] {
        &self.quarantine
    }

    pub fn last_reload(&self) -> Option<ReloadSummary> {
        self.last_reload
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.diagnostics.entries()
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.diagnostics.take()
    }

    // ---- lookup ----

    pub fn find(&self, name: &str, file: Option<&Path>, kind: AssetKind) -> Option<AssetRef> {
        self.db
            .find(name, file, kind)
            .map(|handle| AssetRef::new(handle, kind))
    }

    /// Live and not waiting for eviction
    pub fn exists(&self, asset: AssetRef) -> bool {
        self.db
            .get(asset)
            .is_some_and(|record| !record.is_pending_eviction())
    }

    pub fn record(&self, asset: AssetRef) -> Option<&AssetRecord> {
        self.db.get(asset)
    }

    pub fn resource_of(&self, asset: AssetRef) -> ResourceState {
        self.db
            .get(asset)
            .map(|record| record.resource())
            .unwrap_or_default()
    }

    pub fn dependencies_of(&self, asset: AssetRef) -> DependencyList {
        dependency::dependencies_of(&self.db, asset)
    }

    pub fn dependents_of(&self, asset: AssetRef, include_self: bool) -> AssetGroups {
        dependency::dependents_of(&self.db, asset, include_self)
    }

    // ---- reference views ----

    pub fn global_view(&self) -> ViewId {
        self.global
    }

    pub fn create_view(&mut self, label: impl Into<String>) -> ViewId {
        self.views.insert(ReferenceView::new(label))
    }

    pub fn view(&self, view: ViewId) -> Option<&ReferenceView> {
        self.views.get(view)
    }

    /// For staging edits; committed with [`AssetContext::commit_view`]
    pub fn view_mut(&mut self, view: ViewId) -> Option<&mut ReferenceView> {
        self.views.get_mut(view)
    }

    /// Releases every entry of a sandbox view, tearing down what drops to zero.
    ///
    /// # Panics
    /// Panics when asked to destroy the global view.
    pub fn destroy_view(&mut self, view: ViewId) -> Result<()> {
        assert!(view != self.global, "the global reference view cannot be destroyed");
        self.ensure_unlocked()?;
        let mut removed = self.views.remove(view).ok_or(AssetError::UnknownView)?;
        tracing::debug!(
            view = removed.label(),
            entries = removed.len(),
            "destroying reference view"
        );

        let mut teardown = Vec::new();
        for asset in removed.drain() {
            if self.exists(asset) && self.db.remove_asset(asset) == 0 {
                teardown.extend(self.collect_teardown(asset, true));
            }
        }
        self.schedule_unload(teardown);
        Ok(())
    }

    /// Apply a view's staged adds and removes to the shared counts.
    /// Returns how many staged changes took effect.
    pub fn commit_view(&mut self, view: ViewId) -> Result<usize> {
        self.ensure_unlocked()?;
        let staged = self
            .views
            .get_mut(view)
            .ok_or(AssetError::UnknownView)?
            .take_staged();

        let mut applied = 0;
        let mut added = Vec::new();
        let mut teardown = Vec::new();
        for change in staged {
            match change {
                StagedChange::Add(asset) => {
                    if !self.exists(asset) {
                        self.diagnostics.report(
                            Severity::Warning,
                            &asset.to_string(),
                            asset.kind,
                            "staged reference to an asset that no longer exists",
                        );
                        continue;
                    }
                    self.db.increment(asset);
                    self.views[view].push(asset);
                    added.push(asset);
                }
                StagedChange::Remove(asset) => {
                    if !self.views[view].remove_one(asset) {
                        let name = self.display_name(asset);
                        self.diagnostics.report(
                            Severity::Warning,
                            &name,
                            asset.kind,
                            "staged removal of an asset the view does not hold",
                        );
                        continue;
                    }
                    if self.db.remove_asset(asset) == 0 {
                        teardown.extend(self.collect_teardown(asset, true));
                    }
                }
            }
            applied += 1;
        }

        self.schedule_unload(teardown);
        self.schedule_missing(&added);
        Ok(applied)
    }

    // ---- registration ----

    /// Find-or-create `asset` in `view`. A new record has its metadata read
    /// and its links registered; anything in its dependency closure that is
    /// not loaded is submitted as one load batch.
    ///
    /// # Panics
    /// Panics if `kind` requires a target file and none is given.
    pub fn try_register(
        &mut self,
        view: ViewId,
        name: &str,
        file: Option<&Path>,
        kind: AssetKind,
    ) -> Result<AssetRef> {
        self.ensure_unlocked()?;
        if !self.views.contains_key(view) {
            return Err(AssetError::UnknownView);
        }
        if let Some(existing) = self.find(name, file, kind) {
            if self.loading.contains(existing) {
                return Err(AssetError::AlreadyLoading {
                    asset: name.to_string(),
                    kind,
                });
            }
        }

        let registration = self.register_record(name, file, kind);
        let asset = AssetRef::new(registration.handle, kind);
        self.views[view].push(asset);
        tracing::debug!(
            asset = name,
            %kind,
            ref_count = registration.ref_count,
            created = registration.created,
            "asset registered"
        );
        self.schedule_missing(&[asset]);
        Ok(asset)
    }

    pub fn post_register<F>(
        &mut self,
        view: ViewId,
        name: impl Into<String>,
        file: Option<PathBuf>,
        kind: AssetKind,
        on_done: F,
    ) where
        F: FnOnce(&mut AssetContext, Result<AssetRef>) + 'static,
    {
        let name = name.into();
        let mut on_done = Some(on_done);
        self.events
            .post_when_unlocked(format!("register {kind} '{name}'"), move |ctx| {
                let result = ctx.try_register(view, &name, file.as_deref(), kind);
                settle(ctx, &mut on_done, result)
            });
    }

    /// Drop one reference held by `view`. At zero the resource is torn
    /// down; with `recurse` every dependency link is released too,
    /// otherwise the links move to the global view. Returns the remaining
    /// count.
    pub fn try_unregister(&mut self, view: ViewId, asset: AssetRef, recurse: bool) -> Result<u32> {
        self.ensure_unlocked()?;
        if self.loading.contains(asset) {
            return Err(AssetError::AlreadyLoading {
                asset: self.display_name(asset),
                kind: asset.kind,
            });
        }
        let removed = self
            .views
            .get_mut(view)
            .ok_or(AssetError::UnknownView)?
            .remove_one(asset);
        if !removed {
            return Err(AssetError::NotReferenced {
                asset: self.display_name(asset),
                kind: asset.kind,
            });
        }
        Ok(self.release(asset, recurse))
    }

    pub fn post_unregister<F>(&mut self, view: ViewId, asset: AssetRef, recurse: bool, on_done: F)
    where
        F: FnOnce(&mut AssetContext, Result<u32>) + 'static,
    {
        let mut on_done = Some(on_done);
        self.events
            .post_when_unlocked(format!("unregister {asset}"), move |ctx| {
                let result = ctx.try_unregister(view, asset, recurse);
                settle(ctx, &mut on_done, result)
            });
    }

    /// Submit loads for everything `view` references that is not loaded.
    pub fn load_missing(&mut self, view: ViewId) -> Result<usize> {
        self.ensure_unlocked()?;
        let roots = self
            .views
            .get(view)
            .ok_or(AssetError::UnknownView)?
            .entries()
            .to_vec();
        Ok(self.schedule_missing(&roots))
    }

    // ---- reload ----

    /// Re-read `asset`'s metadata and rebuild it and its dependents. Nothing
    /// happens when the metadata is unchanged, the files are not newer than
    /// the stored stamp and the resource is loaded.
    pub fn try_reload(&mut self, asset: AssetRef) -> Result<ReloadStatus> {
        self.ensure_unlocked()?;
        if !self.exists(asset) {
            return Err(AssetError::AssetNotFound(asset.to_string()));
        }
        let scope: Vec<AssetRef> = dependent_closure(&self.db, &[asset], true).iter().collect();
        if let Some(&busy) = scope.iter().find(|a| self.loading.contains(**a)) {
            return Err(AssetError::AlreadyLoading {
                asset: self.display_name(busy),
                kind: busy.kind,
            });
        }

        let record = self.db.record(asset);
        let name = record.name().to_string();
        let file = record.file().map(Path::to_path_buf);
        let fresh = match self.read_metadata(asset.kind, &name, file.as_deref()) {
            Ok(metadata) => metadata,
            Err(err) => {
                self.diagnostics.report_error(&name, asset.kind, &err);
                return Err(err);
            }
        };

        let changed = fresh != *self.db.record(asset).metadata();
        let stale = staleness::is_stale(
            &self.db,
            &*self.collaborators.resources,
            &*self.collaborators.clock,
            &self.mount,
            asset,
        );
        let loaded = self.db.record(asset).resource().is_loaded();
        if !changed && !stale && loaded {
            tracing::debug!(asset = %name, kind = %asset.kind, "reload skipped, asset up to date");
            return Ok(ReloadStatus::UpToDate);
        }

        let old_root = describe(&self.db, asset);
        let released = if changed {
            self.replace_metadata(asset, &name, fresh)
        } else {
            Vec::new()
        };

        let load_first: Vec<AssetRef> = dependency_closure(&self.db, &[asset])
            .into_iter()
            .filter(|dep| !scope.contains(dep) && self.needs_load(*dep))
            .collect();
        let request = ReloadRequest {
            root: asset,
            old_root,
            scope,
            load_first: LoadPlan::new(&self.db, &load_first),
            max_waves: self.max_reload_waves(),
            released,
        };
        for &member in &request.scope {
            self.loading.try_insert(member, LoadPhase::Reloading);
        }
        for &dep in &load_first {
            self.loading.try_insert(dep, LoadPhase::Loading);
        }
        for &dep in &request.released {
            self.loading.try_insert(dep, LoadPhase::Unloading);
        }

        let scope_len = request.scope.len();
        tracing::info!(
            asset = %name,
            kind = %asset.kind,
            changed,
            stale,
            scope = scope_len,
            "submitting reload"
        );
        self.in_flight += 1;
        reload::submit(&self.worker_env(), self.db.clone(), request);
        Ok(ReloadStatus::Submitted { scope: scope_len })
    }

    pub fn post_reload<F>(&mut self, asset: AssetRef, on_done: F)
    where
        F: FnOnce(&mut AssetContext, Result<ReloadStatus>) + 'static,
    {
        let mut on_done = Some(on_done);
        self.events.post_when_unlocked(format!("reload {asset}"), move |ctx| {
            let result = ctx.try_reload(asset);
            settle(ctx, &mut on_done, result)
        });
    }

    // ---- staleness ----

    pub fn find_out_of_date(
        &mut self,
        update_stamp: bool,
        include_dependencies: bool,
    ) -> AssetGroups {
        staleness::find_out_of_date(
            &mut self.db,
            &*self.collaborators.resources,
            &*self.collaborators.clock,
            &self.mount,
            StalenessScan {
                update_stamp,
                include_dependencies,
            },
        )
    }

    pub fn is_stale(&self, asset: AssetRef) -> bool {
        staleness::is_stale(
            &self.db,
            &*self.collaborators.resources,
            &*self.collaborators.clock,
            &self.mount,
            asset,
        )
    }

    // ---- metadata ----

    /// Write the in-memory metadata of `asset` back through the metadata store
    pub fn save_metadata(&mut self, asset: AssetRef) -> Result<()> {
        let record = self
            .db
            .get(asset)
            .ok_or_else(|| AssetError::AssetNotFound(asset.to_string()))?;
        let written = self.collaborators.metadata.write_metadata(
            asset.kind,
            record.name(),
            record.file(),
            record.metadata(),
        );
        if let Err(err) = &written {
            let name = record.name().to_string();
            self.diagnostics.report_error(&name, asset.kind, err);
        }
        written
    }

    // ---- audit and quarantine ----

    /// Recompute every reference count from views and dependency links.
    pub fn audit(&self) -> Vec<RefCountMismatch> {
        let mut expected: AHashMap<AssetRef, u32> = AHashMap::new();
        for (_, view) in self.views.iter() {
            for &asset in view.entries() {
                *expected.entry(asset).or_default() += 1;
            }
        }
        for (_, record) in self.db.iter_all() {
            if record.is_pending_eviction() {
                continue;
            }
            for dep in record.dependencies() {
                *expected.entry(dep).or_default() += 1;
            }
        }

        let mut mismatches = Vec::new();
        for (asset, record) in self.db.iter_all() {
            let count = expected.remove(&asset).unwrap_or(0);
            if count != record.ref_count() {
                mismatches.push(RefCountMismatch {
                    asset,
                    name: record.name().to_string(),
                    expected: count,
                    actual: record.ref_count(),
                });
            }
        }
        // What is left points at evicted records.
        for (asset, count) in expected {
            mismatches.push(RefCountMismatch {
                asset,
                name: asset.to_string(),
                expected: count,
                actual: 0,
            });
        }
        mismatches
    }

    /// Try again to deallocate quarantined resources. Returns how many
    /// were released; the rest stay quarantined.
    pub fn retry_quarantined(&mut self) -> Result<usize> {
        self.ensure_unlocked()?;
        if self.quarantine.is_empty() {
            return Ok(0);
        }
        let items: Vec<Teardown> = self
            .quarantine
            .drain(..)
            .map(|q| Teardown {
                descriptor: q.descriptor,
                resource: Some(q.resource),
            })
            .collect();

        let result = unload::run(&self.worker_env(), items);
        let mut released = 0;
        for (item, outcome) in result.outcomes {
            match (outcome, item.resource) {
                (Ok(()), _) => {
                    tracing::info!(asset = %item.descriptor.name, "quarantined resource released");
                    released += 1;
                }
                (Err(err), Some(resource)) => {
                    self.diagnostics
                        .report_error(&item.descriptor.name, item.descriptor.kind(), &err);
                    self.quarantine.push(QuarantinedResource {
                        descriptor: item.descriptor,
                        resource,
                        error: err,
                    });
                }
                (Err(_), None) => {}
            }
        }
        Ok(released)
    }

    // ---- listeners and events ----

    pub fn add_listener(&mut self, listener: Box<dyn AssetListener>) -> ListenerId {
        self.listeners.register(listener)
    }

    pub fn add_listener_fn<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(Option<ResourceId>, Option<ResourceId>, AssetKind) + Send + 'static,
    {
        self.listeners.register_fn(listener)
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> Option<Box<dyn AssetListener>> {
        self.listeners.unregister(id)
    }

    /// Post a custom deferred operation
    pub fn post<F>(&mut self, label: impl Into<String>, guard: Guard, op: F)
    where
        F: FnMut(&mut AssetContext) -> Poll<()> + 'static,
    {
        self.events.post(label, guard, op);
    }

    /// Merge finished units, then poll deferred operations once.
    pub fn pump(&mut self) -> PumpReport {
        #[cfg(feature = "profiling")]
        let _span = info_span!("asset_pump").entered();

        let mut report = PumpReport::default();
        while let Ok(continuation) = self.continuations.try_recv() {
            self.apply_continuation(continuation);
            report.continuations += 1;
        }

        let batch = self.events.take_batch(self.config.poll_budget);
        let mut pending = Vec::new();
        for mut op in batch {
            match op.poll(self) {
                Poll::Ready(()) => report.events_run += 1,
                Poll::Pending => pending.push(op),
            }
        }
        self.events.requeue_front(pending);
        report.events_pending = self.events.len();
        report
    }

    /// Pump until nothing is in flight and the queue is empty. Returns
    /// false if `timeout` ran out first.
    pub fn run_until_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.pump();
            if self.is_idle() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            if self.in_flight > 0 {
                if let Ok(continuation) = self.continuations.recv_timeout(deadline - now) {
                    self.apply_continuation(continuation);
                }
            } else {
                std::thread::yield_now();
            }
        }
    }

    // ---- internals ----

    fn ensure_unlocked(&self) -> Result<()> {
        if self.loading_prevented() {
            return Err(AssetError::LoadingLocked);
        }
        Ok(())
    }

    fn worker_env(&self) -> WorkerEnv {
        WorkerEnv::new(&self.collaborators, self.mount.clone(), self.completions.clone())
    }

    fn display_name(&self, asset: AssetRef) -> String {
        self.db
            .get(asset)
            .map(|record| record.name().to_string())
            .unwrap_or_else(|| asset.to_string())
    }

    fn max_reload_waves(&self) -> usize {
        if self.config.max_reload_waves > 0 {
            self.config.max_reload_waves
        } else {
            self.db.len().max(1)
        }
    }

    fn needs_load(&self, asset: AssetRef) -> bool {
        self.db.get(asset).is_some_and(|record| {
            !record.resource().is_loaded() && !record.is_pending_eviction()
        }) && !self.loading.contains(asset)
    }

    fn read_metadata(
        &self,
        kind: AssetKind,
        name: &str,
        file: Option<&Path>,
    ) -> Result<AssetMetadata> {
        let metadata = self.collaborators.metadata.read_metadata(kind, name, file)?;
        if metadata.kind() != kind {
            return Err(AssetError::MetadataParse {
                asset: name.to_string(),
                kind,
                reason: format!("document describes a {} asset", metadata.kind()),
            });
        }
        Ok(metadata)
    }

    fn register_record(
        &mut self,
        name: &str,
        file: Option<&Path>,
        kind: AssetKind,
    ) -> Registration {
        let registration = self.db.add_asset(name, file, kind);
        if registration.created {
            self.hydrate(AssetRef::new(registration.handle, kind));
        }
        registration
    }

    /// Read metadata for a fresh record and register its links, and the
    /// links of every record that creates, without recursion.
    fn hydrate(&mut self, root: AssetRef) {
        let mut pending = vec![root];
        while let Some(asset) = pending.pop() {
            let record = self.db.record(asset);
            let name = record.name().to_string();
            let file = record.file().map(Path::to_path_buf);
            let mut metadata = match self.read_metadata(asset.kind, &name, file.as_deref()) {
                Ok(metadata) => metadata,
                Err(err) => {
                    self.diagnostics.report(
                        Severity::Warning,
                        &name,
                        asset.kind,
                        format!("{err}; using default metadata"),
                    );
                    continue;
                }
            };
            pending.extend(self.resolve_links(&name, asset.kind, &mut metadata));
            self.db.record_mut(asset).metadata = metadata;
        }
    }

    /// Register every link of `metadata`, storing the resolved handles.
    /// Returns the records this created.
    fn resolve_links(
        &mut self,
        owner: &str,
        owner_kind: AssetKind,
        metadata: &mut AssetMetadata,
    ) -> Vec<AssetRef> {
        let mut created = Vec::new();
        for (kind, link) in metadata.links_mut() {
            link.handle = None;
            let file = link.file.clone().filter(|f| !f.as_os_str().is_empty());
            if kind.requires_file() && file.is_none() {
                self.diagnostics.report(
                    Severity::Warning,
                    owner,
                    owner_kind,
                    format!("{kind} link '{}' has no target file and was skipped", link.name),
                );
                continue;
            }
            let registration = self.db.add_asset(&link.name, file.as_deref(), kind);
            link.handle = Some(registration.handle);
            if registration.created {
                created.push(AssetRef::new(registration.handle, kind));
            }
        }
        created
    }

    /// Swap in re-read metadata. New links are registered before old ones
    /// are released, so a dependency kept by both never touches zero.
    /// Returns the records that dropped to zero; they are torn down only
    /// after the reload has rebuilt the root.
    fn replace_metadata(
        &mut self,
        asset: AssetRef,
        name: &str,
        mut fresh: AssetMetadata,
    ) -> Vec<AssetRef> {
        let introduced = self.resolve_links(name, asset.kind, &mut fresh);
        for &dep in &introduced {
            self.hydrate(dep);
        }

        let old_deps = self.db.record(asset).dependencies();
        self.db.record_mut(asset).metadata = fresh;

        let mut teardown = Vec::new();
        for dep in old_deps {
            if self.exists(dep) && self.db.remove_asset(dep) == 0 {
                teardown.extend(self.collect_teardown(dep, true));
            }
        }

        for &dep in &introduced {
            let record = self.db.record(dep);
            if let Some(stamp) =
                staleness::external_timestamp(&*self.collaborators.clock, &self.mount, record)
            {
                let key = staleness::stamp_key(&self.mount, record);
                self.collaborators.resources.add_time_stamp(&key, stamp);
            }
        }
        teardown
    }

    /// Drop one reference; at zero, tear the asset down.
    fn release(&mut self, asset: AssetRef, recurse: bool) -> u32 {
        let remaining = self.db.remove_asset(asset);
        tracing::debug!(
            asset = %self.display_name(asset),
            kind = %asset.kind,
            remaining,
            "asset released"
        );
        if remaining == 0 {
            let teardown = self.collect_teardown(asset, recurse);
            self.schedule_unload(teardown);
        }
        remaining
    }

    /// Everything that goes away with `root`, dependents before dependencies.
    fn collect_teardown(&mut self, root: AssetRef, recurse: bool) -> Vec<AssetRef> {
        let mut teardown = vec![root];
        let mut pending = vec![root];
        while let Some(asset) = pending.pop() {
            for dep in self.db.record(asset).dependencies() {
                if !self.exists(dep) {
                    continue;
                }
                if !recurse {
                    let global = self.global;
                    self.views[global].push(dep);
                    continue;
                }
                if self.db.remove_asset(dep) == 0 {
                    teardown.push(dep);
                    pending.push(dep);
                }
            }
        }
        teardown
    }

    /// Submit loads for whatever in the closure of `roots` is not loaded.
    fn schedule_missing(&mut self, roots: &[AssetRef]) -> usize {
        if roots.is_empty() {
            return 0;
        }
        let missing: Vec<AssetRef> = dependency_closure(&self.db, roots)
            .into_iter()
            .filter(|&asset| self.needs_load(asset))
            .collect();
        if missing.is_empty() {
            return 0;
        }
        for &asset in &missing {
            self.loading.try_insert(asset, LoadPhase::Loading);
        }
        let plan = LoadPlan::new(&self.db, &missing);
        tracing::debug!(
            assets = missing.len(),
            levels = plan.level_count(),
            "submitting load batch"
        );
        self.in_flight += 1;
        load::submit(&self.worker_env(), self.db.clone(), plan);
        missing.len()
    }

    fn schedule_unload(&mut self, teardown: Vec<AssetRef>) {
        if teardown.is_empty() {
            return;
        }
        let items: Vec<Teardown> = teardown
            .iter()
            .map(|&asset| Teardown {
                descriptor: describe(&self.db, asset),
                resource: self.db.record(asset).resource().resource(),
            })
            .collect();

        // Nothing native to release: evict right here.
        if items.iter().all(|item| item.resource.is_none()) {
            let outcomes = items.into_iter().map(|item| (item, Ok(()))).collect();
            self.apply_unload(UnloadResult { outcomes });
            return;
        }

        for &asset in &teardown {
            self.loading.try_insert(asset, LoadPhase::Unloading);
        }
        tracing::debug!(assets = teardown.len(), "submitting unload batch");
        self.in_flight += 1;
        unload::submit(&self.worker_env(), items);
    }

    fn apply_continuation(&mut self, continuation: Continuation) {
        self.in_flight = self.in_flight.saturating_sub(1);
        match continuation {
            Continuation::Loaded(result) => self.apply_load(result),
            Continuation::Unloaded(result) => self.apply_unload(result),
            Continuation::Reloaded(result) => self.apply_reload(result),
        }
    }

    fn apply_load(&mut self, result: LoadResult) {
        for &asset in &result.assets {
            self.loading.remove(asset);
        }
        for (asset, err) in &result.failures {
            self.report_failure(&result.staging, *asset, err);
        }
        let changes = self.db.copy_asset_pointers(&result.staging, Some(&result.mask));
        for asset in result.mask.iter() {
            self.mark_validated(asset);
        }
        tracing::info!(
            loaded = result.mask.len(),
            failed = result.failures.len(),
            "load batch finished"
        );
        self.listeners.dispatch(&changes);
    }

    fn apply_unload(&mut self, result: UnloadResult) {
        let mut changes = Vec::new();
        for (item, outcome) in result.outcomes {
            let asset = item.descriptor.asset;
            self.loading.remove(asset);
            let Some(record) = self.db.get(asset) else {
                continue;
            };
            if !record.is_pending_eviction() {
                // Referenced again while the unit ran; keep the record.
                if outcome.is_ok() && item.resource.is_some() {
                    let old = self.db.set_resource(asset, ResourceState::Unloaded);
                    changes.push(PointerChange {
                        asset,
                        name: item.descriptor.name.clone(),
                        old: old.resource(),
                        new: None,
                    });
                }
                continue;
            }

            let previous = self.db.randomize_pointer(asset);
            if let Err(err) = outcome {
                self.diagnostics
                    .report_error(&item.descriptor.name, asset.kind, &err);
                if let Some(resource) = item.resource {
                    tracing::warn!(
                        asset = %item.descriptor.name,
                        kind = %asset.kind,
                        resource = resource.0,
                        "deallocation failed; resource quarantined"
                    );
                    self.quarantine.push(QuarantinedResource {
                        descriptor: item.descriptor.clone(),
                        resource,
                        error: err,
                    });
                }
            }
            let key = self.mount.stamp_key(
                asset.kind,
                &item.descriptor.name,
                item.descriptor.file.as_deref(),
            );
            self.collaborators.resources.remove_time_stamp(&key);
            self.db.evict(asset);
            tracing::debug!(asset = %item.descriptor.name, kind = %asset.kind, "asset evicted");

            if let Some(old) = previous.resource() {
                changes.push(PointerChange {
                    asset,
                    name: item.descriptor.name,
                    old: Some(old),
                    new: None,
                });
            }
        }
        self.listeners.dispatch(&changes);
    }

    fn apply_reload(&mut self, result: ReloadResult) {
        for &asset in &result.assets {
            self.loading.remove(asset);
        }
        for (asset, err) in &result.failures {
            self.report_failure(&result.staging, *asset, err);
        }
        for (descriptor, resource, err) in result.leaked {
            self.diagnostics
                .report_error(&descriptor.name, descriptor.kind(), &err);
            self.quarantine.push(QuarantinedResource {
                descriptor,
                resource,
                error: err,
            });
        }

        let changes = self.db.copy_asset_pointers(&result.staging, Some(&result.mask));
        for asset in result.mask.iter() {
            if self.resource_of(asset).is_loaded() {
                self.mark_validated(asset);
            }
        }
        if result.capped {
            let name = self.display_name(result.root);
            self.diagnostics.report(
                Severity::Warning,
                &name,
                result.root.kind,
                format!("reload stopped after {} waves with dependents left", result.waves),
            );
        }
        tracing::info!(
            root = %self.display_name(result.root),
            waves = result.waves,
            processed = result.processed,
            failed = result.failures.len(),
            "reload finished"
        );
        self.last_reload = Some(ReloadSummary {
            root: result.root,
            waves: result.waves,
            processed: result.processed,
            failed: result.failures.len(),
            capped: result.capped,
        });
        self.listeners.dispatch(&changes);
        // The root no longer binds the dependencies its old metadata named.
        self.schedule_unload(result.released);
    }

    fn report_failure(&mut self, staging: &AssetDatabase, asset: AssetRef, err: &AssetError) {
        let name = staging
            .get(asset)
            .map(|record| record.name().to_string())
            .unwrap_or_else(|| asset.to_string());
        self.diagnostics.report_error(&name, asset.kind, err);
    }

    /// Stamp the asset's current file time as validated
    fn mark_validated(&mut self, asset: AssetRef) {
        let Some(record) = self.db.get(asset) else {
            return;
        };
        let Some(stamp) =
            staleness::external_timestamp(&*self.collaborators.clock, &self.mount, record)
        else {
            return;
        };
        let key = staleness::stamp_key(&self.mount, record);
        self.collaborators.resources.set_time_stamp(&key, stamp);
        self.db.record_mut(asset).last_validated = Some(stamp);
    }
}

/// Finish a deferred operation: locked means try again later, anything
/// else is handed to the callback.
fn settle<T, F>(ctx: &mut AssetContext, callback: &mut Option<F>, result: Result<T>) -> Poll<()>
where
    F: FnOnce(&mut AssetContext, Result<T>),
{
    if matches!(result, Err(AssetError::LoadingLocked)) {
        return Poll::Pending;
    }
    if let Some(callback) = callback.take() {
        callback(ctx, result);
    }
    Poll::Ready(())
}
