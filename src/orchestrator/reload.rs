//! Reload with dependent propagation.
//!
//! The root is rebuilt first, then every dependent whose dependency
//! pointer moved, one wave at a time. Each wave only holds what the
//! previous wave produced and lists an asset at most once, so no recursion
//! is needed and the number of waves is capped.

use rustc_hash::FxHashSet;

#[cfg(feature = "profiling")]
use tracing::info_span;

use super::{describe, load, Continuation, WorkerEnv};
use crate::backend::AssetDescriptor;
use crate::database::{AssetDatabase, SuccessMask};
use crate::dependency::{dependents_of, LoadPlan};
use crate::error::AssetError;
use crate::handle::AssetRef;
use crate::kind::AssetKind;
use crate::record::{ResourceId, ResourceState};

/// Everything a reload unit needs, prepared on the serialized context.
pub struct ReloadRequest {
    pub root: AssetRef,
    /// The root as it was before its metadata was replaced
    pub old_root: AssetDescriptor,
    /// Root plus every transitive dependent; propagation stays inside it
    pub scope: Vec<AssetRef>,
    /// Newly introduced dependencies, created before the root
    pub load_first: LoadPlan,
    pub max_waves: usize,
    /// Old dependencies that dropped to zero; released once the unit is merged
    pub released: Vec<AssetRef>,
}

impl ReloadRequest {
    /// Every asset the unit touches
    pub fn assets(&self) -> Vec<AssetRef> {
        self.scope
            .iter()
            .copied()
            .chain(self.load_first.assets())
            .collect()
    }
}

pub struct ReloadResult {
    pub root: AssetRef,
    pub staging: AssetDatabase,
    pub mask: SuccessMask,
    pub failures: Vec<(AssetRef, AssetError)>,
    /// Old resources whose deallocation failed
    pub leaked: Vec<(AssetDescriptor, ResourceId, AssetError)>,
    pub waves: usize,
    pub processed: usize,
    /// Propagation stopped at the wave cap with work left
    pub capped: bool,
    pub assets: Vec<AssetRef>,
    pub released: Vec<AssetRef>,
}

pub(crate) fn submit(env: &WorkerEnv, staging: AssetDatabase, request: ReloadRequest) {
    let worker = env.clone();
    env.tasks.submit_background(Box::new(move || {
        let result = run(&worker, staging, request);
        worker.complete(Continuation::Reloaded(result));
    }));
}

pub fn run(env: &WorkerEnv, mut staging: AssetDatabase, request: ReloadRequest) -> ReloadResult {
    #[cfg(feature = "profiling")]
    let _span = info_span!("reload", root = %request.root, scope = request.scope.len()).entered();

    let assets = request.assets();
    let kinds: Vec<AssetKind> = assets.iter().map(|a| a.kind).collect();
    let _section = env.section(&kinds);

    let mut mask = SuccessMask::new();
    let mut failures = Vec::new();
    let mut leaked = Vec::new();

    for level in request.load_first.levels() {
        let descriptors = level.assets.iter().map(|&a| describe(&staging, a)).collect();
        for (asset, outcome) in load::create_level(env, descriptors) {
            match outcome {
                Ok(resource) => {
                    staging.set_resource(asset, ResourceState::Loaded(resource));
                    mask.insert(asset);
                }
                Err(err) => failures.push((asset, err)),
            }
        }
    }

    // Dependents are rebuilt against their pre-reload descriptors.
    let original = staging.clone();
    let scope: FxHashSet<AssetRef> = request.scope.iter().copied().collect();
    let mut current = vec![request.root];
    let mut next = Vec::new();
    let mut waves = 0;
    let mut processed = 0;

    while !current.is_empty() {
        if waves == request.max_waves {
            tracing::warn!(
                root = %request.root,
                waves,
                remaining = current.len(),
                "reload propagation reached its wave cap"
            );
            break;
        }
        let mut queued = FxHashSet::default();
        for &asset in &current {
            let old = if asset == request.root {
                request.old_root.clone()
            } else {
                describe(&original, asset)
            };
            let old_resource = staging.record(asset).resource().resource();
            let new = describe(&staging, asset);

            let outcome = env
                .resources
                .reload_from_metadata(&old, old_resource, &new, &env.mount);
            processed += 1;

            if let (Err(err), Some(resource)) = (outcome.deallocated, old_resource) {
                leaked.push((old, resource, err));
            }
            let state = match outcome.created {
                Ok(resource) => ResourceState::Loaded(resource),
                Err(err) => {
                    failures.push((asset, err));
                    ResourceState::Unloaded
                }
            };
            staging.set_resource(asset, state);
            mask.insert(asset);

            for dependent in dependents_of(&staging, asset, false).iter() {
                if scope.contains(&dependent) && queued.insert(dependent) {
                    next.push(dependent);
                }
            }
        }
        waves += 1;
        current.clear();
        std::mem::swap(&mut current, &mut next);
    }

    ReloadResult {
        root: request.root,
        staging,
        mask,
        failures,
        leaked,
        waves,
        processed,
        capped: !current.is_empty(),
        assets,
        released: request.released,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MountPoint;
    use crate::dependency::dependent_closure;
    use crate::headless::HeadlessBackend;
    use crate::metadata::{AssetLink, AssetMetadata, MaterialMetadata, ShaderMetadata};
    use std::path::{Path, PathBuf};

    fn link(db: &AssetDatabase, asset: AssetRef) -> AssetLink {
        let record = db.record(asset);
        let mut link = AssetLink::new(record.name(), record.file().map(PathBuf::from));
        link.handle = Some(asset.handle);
        link
    }

    /// include <- shader <- material, everything loaded
    fn chain(backend: &HeadlessBackend, env: &WorkerEnv) -> (AssetDatabase, [AssetRef; 3]) {
        let mut db = AssetDatabase::new();
        let include = AssetRef::new(
            db.add_asset("common", Some(Path::new("common.wgsl")), AssetKind::Misc).handle,
            AssetKind::Misc,
        );
        let shader = AssetRef::new(
            db.add_asset("lit", Some(Path::new("lit.wgsl")), AssetKind::Shader).handle,
            AssetKind::Shader,
        );
        let material = AssetRef::new(
            db.add_asset("brick", None, AssetKind::Material).handle,
            AssetKind::Material,
        );
        let shader_meta = AssetMetadata::Shader(ShaderMetadata {
            includes: vec![Some(link(&db, include))],
            ..ShaderMetadata::default()
        });
        db.record_mut(shader).metadata = shader_meta;
        let material_meta = AssetMetadata::Material(MaterialMetadata {
            shader: Some(link(&db, shader)),
            ..MaterialMetadata::default()
        });
        db.record_mut(material).metadata = material_meta;

        let plan = LoadPlan::new(&db, &[include, shader, material]);
        let loaded = load::run(env, db.clone(), &plan);
        db.copy_asset_pointers(&loaded.staging, Some(&loaded.mask));
        assert_eq!(backend.resources.live_count(), 3);
        (db, [include, shader, material])
    }

    fn request(db: &AssetDatabase, root: AssetRef, max_waves: usize) -> ReloadRequest {
        ReloadRequest {
            root,
            old_root: describe(db, root),
            scope: dependent_closure(db, &[root], true).iter().collect(),
            load_first: LoadPlan::default(),
            max_waves,
            released: Vec::new(),
        }
    }

    fn env(backend: &HeadlessBackend) -> WorkerEnv {
        let (sender, _receiver) = crossbeam::channel::unbounded();
        WorkerEnv::new(&backend.collaborators(), MountPoint::new("root"), sender)
    }

    #[test]
    fn test_propagates_one_wave_per_level() {
        let backend = HeadlessBackend::new();
        let env = env(&backend);
        let (db, [include, shader, material]) = chain(&backend, &env);
        let before = db.record(material).resource().resource();

        let result = run(&env, db.clone(), request(&db, include, db.len()));

        assert_eq!(result.waves, 3);
        assert_eq!(result.processed, 3);
        assert!(!result.capped);
        assert!(result.failures.is_empty());
        for asset in [include, shader, material] {
            assert!(result.mask.contains(asset));
        }
        assert_ne!(result.staging.record(material).resource().resource(), before);
        assert_eq!(backend.resources.live_count(), 3);
    }

    #[test]
    fn test_wave_cap_stops_propagation() {
        let backend = HeadlessBackend::new();
        let env = env(&backend);
        let (db, [include, _, material]) = chain(&backend, &env);

        let result = run(&env, db.clone(), request(&db, include, 1));
        assert_eq!(result.waves, 1);
        assert!(result.capped);
        assert!(!result.mask.contains(material));
    }

    #[test]
    fn test_failed_create_leaves_root_unloaded() {
        let backend = HeadlessBackend::new();
        let env = env(&backend);
        let (db, [_, shader, material]) = chain(&backend, &env);
        backend.resources.fail_create("lit");

        let result = run(&env, db.clone(), request(&db, shader, db.len()));
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.staging.record(shader).resource(), ResourceState::Unloaded);
        // The material is still rebuilt against the missing shader.
        assert!(result.staging.record(material).resource().is_loaded());
    }
}
