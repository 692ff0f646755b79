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

//! Asset record store: reference-counted records keyed by handle, one
//! table per asset kind.
//!
//! The store never creates or destroys native resources. Dropping a
//! reference count to zero only marks the record; the orchestrator
//! deallocates the resource and then calls [`AssetDatabase::evict`].

use ahash::{AHashMap, AHashSet};
use slotmap::SlotMap;
use std::path::Path;

use crate::handle::{AssetHandle, AssetKey, AssetRef};
use crate::kind::{AssetKind, KindMap};
use crate::notify::PointerChange;
use crate::record::{AssetRecord, ResourceState};

/// Result of [`AssetDatabase::add_asset`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Registration {
    pub handle: AssetHandle,
    /// False when an existing record was found and its count incremented
    pub created: bool,
    pub ref_count: u32,
}

/// Per-kind set of handles whose staged resource should be merged.
#[derive(Clone, Debug, Default)]
pub struct SuccessMask {
    handles: KindMap<AHashSet<AssetHandle>>,
}

impl SuccessMask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, asset: AssetRef) -> bool {
        self.handles[asset.kind].insert(asset.handle)
    }

    pub fn contains(&self, asset: AssetRef) -> bool {
        self.handles[asset.kind].contains(&asset.handle)
    }

    pub fn len(&self) -> usize {
        self.handles.iter().map(|(_, set)| set.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = AssetRef> + '_ {
        self.handles
            .iter()
            .flat_map(|(kind, set)| set.iter().map(move |&h| AssetRef::new(h, kind)))
    }
}

/// The record store. Cloning it produces a staging snapshot whose handles
/// stay valid against the original.
#[derive(Clone, Default)]
pub struct AssetDatabase {
    tables: KindMap<SlotMap<AssetHandle, AssetRecord>>,
    lookup: KindMap<AHashMap<AssetKey, AssetHandle>>,
}

impl AssetDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find-or-create. An existing (name, file, kind) record gets its count
    /// incremented; otherwise a fresh unloaded record with count 1 is made.
    ///
    /// # Panics
    /// Panics if `kind` requires a target file and `file` is empty.
    pub fn add_asset(&mut self, name: &str, file: Option<&Path>, kind: AssetKind) -> Registration {
        let file = file.filter(|f| !f.as_os_str().is_empty());
        assert!(
            !kind.requires_file() || file.is_some(),
            "{kind} asset '{name}' registered without a target file"
        );

        let key = AssetKey::new(name, file);
        if let Some(&handle) = self.lookup[kind].get(&key) {
            let record = &mut self.tables[kind][handle];
            record.ref_count += 1;
            return Registration {
                handle,
                created: false,
                ref_count: record.ref_count,
            };
        }

        let record = AssetRecord::new(key.name.clone(), key.file.clone(), kind);
        let handle = self.tables[kind].insert(record);
        self.lookup[kind].insert(key, handle);
        Registration {
            handle,
            created: true,
            ref_count: 1,
        }
    }

    pub fn find(&self, name: &str, file: Option<&Path>, kind: AssetKind) -> Option<AssetHandle> {
        let file = file.filter(|f| !f.as_os_str().is_empty());
        self.lookup[kind].get(&AssetKey::new(name, file)).copied()
    }

    pub fn contains(&self, asset: AssetRef) -> bool {
        self.tables[asset.kind].contains_key(asset.handle)
    }

    pub fn get(&self, asset: AssetRef) -> Option<&AssetRecord> {
        self.tables[asset.kind].get(asset.handle)
    }

    pub fn get_mut(&mut self, asset: AssetRef) -> Option<&mut AssetRecord> {
        self.tables[asset.kind].get_mut(asset.handle)
    }

    /// # Panics
    /// Panics if the handle is not live in the kind's table.
    pub fn record(&self, asset: AssetRef) -> &AssetRecord {
        match self.tables[asset.kind].get(asset.handle) {
            Some(record) => record,
            None => panic!("invalid {} handle {:?}", asset.kind, asset.handle),
        }
    }

    /// # Panics
    /// Panics if the handle is not live in the kind's table.
    pub fn record_mut(&mut self, asset: AssetRef) -> &mut AssetRecord {
        match self.tables[asset.kind].get_mut(asset.handle) {
            Some(record) => record,
            None => panic!("invalid {} handle {:?}", asset.kind, asset.handle),
        }
    }

    /// Adds one reference to an existing record.
    pub fn increment(&mut self, asset: AssetRef) -> u32 {
        let record = self.record_mut(asset);
        record.ref_count += 1;
        record.ref_count
    }

    /// Drops one reference and returns the new count. At zero the record
    /// stays in the table; the caller owns deallocation and eviction.
    ///
    /// # Panics
    /// Panics if the count is already zero.
    pub fn remove_asset(&mut self, asset: AssetRef) -> u32 {
        let record = self.record_mut(asset);
        assert!(
            record.ref_count > 0,
            "{} '{}' released with zero references",
            asset.kind,
            record.name
        );
        record.ref_count -= 1;
        record.ref_count
    }

    /// Marks the resource as deallocated. Returns the previous state.
    pub fn randomize_pointer(&mut self, asset: AssetRef) -> ResourceState {
        std::mem::replace(&mut self.record_mut(asset).resource, ResourceState::Poisoned)
    }

    pub fn set_resource(&mut self, asset: AssetRef, state: ResourceState) -> ResourceState {
        std::mem::replace(&mut self.record_mut(asset).resource, state)
    }

    /// Removes a zero-count record and frees its key for re-registration.
    ///
    /// # Panics
    /// Panics if the record still has references.
    pub fn evict(&mut self, asset: AssetRef) -> Option<AssetRecord> {
        let record = self.tables[asset.kind].get(asset.handle)?;
        assert_eq!(
            record.ref_count, 0,
            "evicting {} '{}' with live references",
            asset.kind, record.name
        );
        let key = record.key();
        if self.lookup[asset.kind].get(&key) == Some(&asset.handle) {
            self.lookup[asset.kind].remove(&key);
        }
        self.tables[asset.kind].remove(asset.handle)
    }

    /// Copies resolved resource states from a staging snapshot. With a mask,
    /// only masked records are copied. Records missing from `self` are
    /// skipped. Returns one change per record whose resource moved.
    pub fn copy_asset_pointers(
        &mut self,
        from: &AssetDatabase,
        mask: Option<&SuccessMask>,
    ) -> Vec<PointerChange> {
        let mut changes = Vec::new();
        for (kind, table) in from.tables.iter() {
            for (handle, staged) in table.iter() {
                let asset = AssetRef::new(handle, kind);
                if mask.is_some_and(|m| !m.contains(asset)) {
                    continue;
                }
                let Some(record) = self.tables[kind].get_mut(handle) else {
                    continue;
                };
                if record.resource == staged.resource {
                    continue;
                }
                let old = std::mem::replace(&mut record.resource, staged.resource);
                changes.push(PointerChange {
                    asset,
                    name: record.name.clone(),
                    old: old.resource(),
                    new: staged.resource.resource(),
                });
            }
        }
        changes
    }

    pub fn iter(&self, kind: AssetKind) -> impl Iterator<Item = (AssetHandle, &AssetRecord)> {
        self.tables[kind].iter()
    }

    pub fn iter_mut(
        &mut self,
        kind: AssetKind,
    ) -> impl Iterator<Item = (AssetHandle, &mut AssetRecord)> {
        self.tables[kind].iter_mut()
    }

    /// Every record, in kind order
    pub fn iter_all(&self) -> impl Iterator<Item = (AssetRef, &AssetRecord)> {
        self.tables.iter().flat_map(|(kind, table)| {
            table
                .iter()
                .map(move |(handle, record)| (AssetRef::new(handle, kind), record))
        })
    }

    pub fn len_of(&self, kind: AssetKind) -> usize {
        self.tables[kind].len()
    }

    pub fn len(&self) -> usize {
        self.tables.iter().map(|(_, table)| table.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ResourceId;
    use std::path::PathBuf;

    #[test]
    fn test_duplicate_add_increments() {
        let mut db = AssetDatabase::new();
        let file = PathBuf::from("tex.png");
        let first = db.add_asset("T1", Some(file.as_path()), AssetKind::Texture);
        let second = db.add_asset("T1", Some(file.as_path()), AssetKind::Texture);
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.handle, second.handle);
        assert_eq!(second.ref_count, 2);
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn test_same_name_different_kind_is_distinct() {
        let mut db = AssetDatabase::new();
        let file = PathBuf::from("wood");
        db.add_asset("wood", Some(file.as_path()), AssetKind::Texture);
        db.add_asset("wood", None, AssetKind::Material);
        assert_eq!(db.len_of(AssetKind::Texture), 1);
        assert_eq!(db.len_of(AssetKind::Material), 1);
    }

    #[test]
    #[should_panic(expected = "without a target file")]
    fn test_missing_required_file_panics() {
        let mut db = AssetDatabase::new();
        db.add_asset("T1", None, AssetKind::Texture);
    }

    #[test]
    fn test_evict_frees_key() {
        let mut db = AssetDatabase::new();
        let reg = db.add_asset("M", None, AssetKind::Material);
        let asset = AssetRef::new(reg.handle, AssetKind::Material);
        assert_eq!(db.remove_asset(asset), 0);
        assert!(db.contains(asset));
        db.evict(asset);
        assert!(!db.contains(asset));
        assert_eq!(db.find("M", None, AssetKind::Material), None);

        let again = db.add_asset("M", None, AssetKind::Material);
        assert!(again.created);
        assert_eq!(again.ref_count, 1);
        assert_ne!(again.handle, reg.handle);
    }

    #[test]
    #[should_panic(expected = "zero references")]
    fn test_remove_below_zero_panics() {
        let mut db = AssetDatabase::new();
        let reg = db.add_asset("M", None, AssetKind::Material);
        let asset = AssetRef::new(reg.handle, AssetKind::Material);
        db.remove_asset(asset);
        db.remove_asset(asset);
    }

    #[test]
    fn test_randomize_pointer_poisons() {
        let mut db = AssetDatabase::new();
        let reg = db.add_asset("S", None, AssetKind::Sampler);
        let asset = AssetRef::new(reg.handle, AssetKind::Sampler);
        db.set_resource(asset, ResourceState::Loaded(ResourceId(9)));
        let previous = db.randomize_pointer(asset);
        assert_eq!(previous, ResourceState::Loaded(ResourceId(9)));
        assert!(db.record(asset).resource().is_poisoned());
    }

    #[test]
    fn test_copy_pointers_respects_mask() {
        let mut db = AssetDatabase::new();
        let a = AssetRef::new(
            db.add_asset("a", None, AssetKind::Sampler).handle,
            AssetKind::Sampler,
        );
        let b = AssetRef::new(
            db.add_asset("b", None, AssetKind::Sampler).handle,
            AssetKind::Sampler,
        );

        let mut staging = db.clone();
        staging.set_resource(a, ResourceState::Loaded(ResourceId(1)));
        staging.set_resource(b, ResourceState::Loaded(ResourceId(2)));

        let mut mask = SuccessMask::new();
        mask.insert(a);
        let changes = db.copy_asset_pointers(&staging, Some(&mask));

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].asset, a);
        assert_eq!(changes[0].old, None);
        assert_eq!(changes[0].new, Some(ResourceId(1)));
        assert_eq!(db.record(b).resource(), ResourceState::Unloaded);
    }
}
