//! Resource teardown for records whose reference count reached zero.

#[cfg(feature = "profiling")]
use tracing::info_span;

use super::{Continuation, WorkerEnv};
use crate::backend::AssetDescriptor;
use crate::error::Result;
use crate::kind::AssetKind;
use crate::record::ResourceId;

/// One asset to tear down. `resource` is `None` for records that never loaded.
#[derive(Clone, Debug)]
pub struct Teardown {
    pub descriptor: AssetDescriptor,
    pub resource: Option<ResourceId>,
}

pub struct UnloadResult {
    pub outcomes: Vec<(Teardown, Result<()>)>,
}

pub(crate) fn submit(env: &WorkerEnv, items: Vec<Teardown>) {
    let worker = env.clone();
    env.tasks.submit_background(Box::new(move || {
        let result = run(&worker, items);
        worker.complete(Continuation::Unloaded(result));
    }));
}

/// Deallocate in the given order; dependents should come before their
/// dependencies.
pub fn run(env: &WorkerEnv, items: Vec<Teardown>) -> UnloadResult {
    #[cfg(feature = "profiling")]
    let _span = info_span!("unload_batch", assets = items.len()).entered();

    let kinds: Vec<AssetKind> = items.iter().map(|item| item.descriptor.kind()).collect();
    let _section = env.section(&kinds);

    let outcomes = items
        .into_iter()
        .map(|item| {
            let outcome = match item.resource {
                Some(resource) => {
                    env.resources
                        .deallocate_from_metadata(&item.descriptor, resource, &env.mount)
                }
                None => Ok(()),
            };
            (item, outcome)
        })
        .collect();
    UnloadResult { outcomes }
}
