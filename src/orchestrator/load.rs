//! Batch creation of missing resources.

use crossbeam::sync::WaitGroup;

#[cfg(feature = "profiling")]
use tracing::info_span;

use super::{describe, Continuation, WorkerEnv};
use crate::backend::{AssetDescriptor, Task};
use crate::database::{AssetDatabase, SuccessMask};
use crate::dependency::LoadPlan;
use crate::error::{AssetError, Result};
use crate::handle::AssetRef;
use crate::record::{ResourceId, ResourceState};

/// Result of a batch load, merged through its success mask.
pub struct LoadResult {
    pub staging: AssetDatabase,
    pub mask: SuccessMask,
    pub failures: Vec<(AssetRef, AssetError)>,
    pub assets: Vec<AssetRef>,
}

/// Run a batch load on a background thread
pub(crate) fn submit(env: &WorkerEnv, staging: AssetDatabase, plan: LoadPlan) {
    let worker = env.clone();
    env.tasks.submit_background(Box::new(move || {
        let result = run(&worker, staging, &plan);
        worker.complete(Continuation::Loaded(result));
    }));
}

/// Create every planned asset, level by level. A failure does not stop
/// the batch; later levels are still attempted with whatever their
/// dependencies resolved to.
pub fn run(env: &WorkerEnv, mut staging: AssetDatabase, plan: &LoadPlan) -> LoadResult {
    #[cfg(feature = "profiling")]
    let _span =
        info_span!("load_batch", assets = plan.len(), levels = plan.level_count()).entered();

    let mut mask = SuccessMask::new();
    let mut failures = Vec::new();
    let _section = env.section(&plan.kinds());

    for level in plan.levels() {
        let descriptors: Vec<AssetDescriptor> =
            level.assets.iter().map(|&asset| describe(&staging, asset)).collect();
        for (asset, outcome) in create_level(env, descriptors) {
            match outcome {
                Ok(resource) => {
                    tracing::debug!(asset = %asset, resource = resource.0, "asset created");
                    staging.set_resource(asset, ResourceState::Loaded(resource));
                    mask.insert(asset);
                }
                Err(err) => failures.push((asset, err)),
            }
        }
    }

    LoadResult {
        staging,
        mask,
        failures,
        assets: plan.assets().collect(),
    }
}

/// Creates one level. Several assets are fanned out to the task pool and
/// joined on a wait group; the caller's exclusive section covers them all.
pub(crate) fn create_level(
    env: &WorkerEnv,
    descriptors: Vec<AssetDescriptor>,
) -> Vec<(AssetRef, Result<ResourceId>)> {
    if descriptors.len() <= 1 {
        return descriptors
            .into_iter()
            .map(|desc| (desc.asset, env.resources.create_from_metadata(&desc, &env.mount)))
            .collect();
    }

    let (sender, receiver) = crossbeam::channel::unbounded();
    let wait_group = WaitGroup::new();
    let tasks: Vec<Task> = descriptors
        .into_iter()
        .map(|desc| {
            let sender = sender.clone();
            let wait_group = wait_group.clone();
            let resources = env.resources.clone();
            let mount = env.mount.clone();
            Box::new(move || {
                let outcome = resources.create_from_metadata(&desc, &mount);
                // The receiver outlives the wait group.
                let _ = sender.send((desc.asset, outcome));
                drop(wait_group);
            }) as Task
        })
        .collect();

    env.tasks.submit_and_wake_many(tasks);
    wait_group.wait();
    drop(sender);
    receiver.try_iter().collect()
}
