//! Dependency graph walks over the record store.
//!
//! Edges are never stored; they are read from metadata links on demand.
//! Every traversal keeps a visited set, so an accidental cycle in
//! hand-edited metadata cannot hang a walk.

use rustc_hash::FxHashSet;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::database::AssetDatabase;
use crate::handle::{AssetGroups, AssetRef};
use crate::kind::AssetKind;
use crate::metadata::DependencyList;

/// Direct dependencies of a record, duplicates included.
pub fn dependencies_of(db: &AssetDatabase, asset: AssetRef) -> DependencyList {
    db.get(asset)
        .map(|record| record.dependencies())
        .unwrap_or_default()
}

/// Reverse edge: every dependency-capable record that links to `target`.
pub fn dependents_of(db: &AssetDatabase, target: AssetRef, include_self: bool) -> AssetGroups {
    let mut groups = AssetGroups::new();
    if include_self && db.contains(target) {
        groups.insert(target);
    }
    for kind in AssetKind::DEPENDENCY_CAPABLE {
        for (handle, record) in db.iter(kind) {
            if record.depends_on(target) {
                groups.insert(AssetRef::new(handle, kind));
            }
        }
    }
    groups
}

/// Forward closure of `roots`, dependencies before dependents.
pub fn dependency_closure(db: &AssetDatabase, roots: &[AssetRef]) -> Vec<AssetRef> {
    #[cfg(feature = "profiling")]
    let _span = info_span!("dependency_closure", roots = roots.len()).entered();

    let mut order = Vec::new();
    let mut visited = FxHashSet::default();
    for &root in roots {
        visit_post_order(db, root, &mut visited, &mut order);
    }
    order
}

fn visit_post_order(
    db: &AssetDatabase,
    root: AssetRef,
    visited: &mut FxHashSet<AssetRef>,
    order: &mut Vec<AssetRef>,
) {
    // Explicit stack: long include chains must not grow the call stack.
    let mut stack = vec![(root, false)];
    while let Some((asset, expanded)) = stack.pop() {
        if expanded {
            order.push(asset);
            continue;
        }
        if !db.contains(asset) || !visited.insert(asset) {
            continue;
        }
        stack.push((asset, true));
        for dep in dependencies_of(db, asset).into_iter().rev() {
            if !visited.contains(&dep) {
                stack.push((dep, false));
            }
        }
    }
}

/// Backward closure: everything that transitively depends on `roots`.
pub fn dependent_closure(
    db: &AssetDatabase,
    roots: &[AssetRef],
    include_self: bool,
) -> AssetGroups {
    let mut result = AssetGroups::new();
    let mut visited: FxHashSet<AssetRef> = roots.iter().copied().collect();
    let mut frontier: Vec<AssetRef> = roots.to_vec();

    if include_self {
        for &root in roots {
            if db.contains(root) {
                result.insert(root);
            }
        }
    }

    while let Some(asset) = frontier.pop() {
        for dependent in dependents_of(db, asset, false).iter() {
            if visited.insert(dependent) {
                result.insert(dependent);
                frontier.push(dependent);
            }
        }
    }
    result
}

/// Assets that can be created together: none depends on another in the
/// same level.
#[derive(Clone, Debug, Default)]
pub struct LoadLevel {
    pub assets: Vec<AssetRef>,
}

/// Creation order for a set of assets, grouped into levels.
#[derive(Clone, Debug, Default)]
pub struct LoadPlan {
    levels: Vec<LoadLevel>,
}

impl LoadPlan {
    /// Plan creation of `assets`. Dependencies outside the set are treated
    /// as already available.
    pub fn new(db: &AssetDatabase, assets: &[AssetRef]) -> Self {
        let levels = Self::build_levels(db, assets);
        Self { levels }
    }

    fn build_levels(db: &AssetDatabase, assets: &[AssetRef]) -> Vec<LoadLevel> {
        if assets.is_empty() {
            return vec![];
        }

        let members: FxHashSet<AssetRef> = assets.iter().copied().collect();
        let mut placed: FxHashSet<AssetRef> = FxHashSet::default();
        let mut levels = vec![];
        let mut remaining: Vec<AssetRef> = Vec::with_capacity(assets.len());
        for &asset in assets {
            if !remaining.contains(&asset) {
                remaining.push(asset);
            }
        }

        while !remaining.is_empty() {
            let mut level_assets = vec![];
            let mut next_remaining = vec![];

            for &asset in &remaining {
                let ready = dependencies_of(db, asset)
                    .iter()
                    .all(|dep| *dep == asset || !members.contains(dep) || placed.contains(dep));
                if ready {
                    level_assets.push(asset);
                } else {
                    next_remaining.push(asset);
                }
            }

            if level_assets.is_empty() {
                // Only a cycle leaves nothing ready; place the rest together.
                tracing::warn!(
                    remaining = next_remaining.len(),
                    "dependency cycle while planning asset creation"
                );
                levels.push(LoadLevel {
                    assets: next_remaining,
                });
                break;
            }

            placed.extend(level_assets.iter().copied());
            levels.push(LoadLevel {
                assets: level_assets,
            });
            remaining = next_remaining;
        }

        levels
    }

    pub fn levels(&self) -> &[LoadLevel] {
        &self.levels
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn len(&self) -> usize {
        self.levels.iter().map(|level| level.assets.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Every planned asset, level by level
    pub fn assets(&self) -> impl Iterator<Item = AssetRef> + '_ {
        self.levels.iter().flat_map(|level| level.assets.iter().copied())
    }

    /// Distinct kinds touched by the plan, in lock order
    pub fn kinds(&self) -> Vec<AssetKind> {
        let mut kinds: Vec<AssetKind> = self.assets().map(|a| a.kind).collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }
}
