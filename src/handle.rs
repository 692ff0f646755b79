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

//! Asset handles, typed references and lookup keys.

use crate::kind::{AssetKind, KindMap};
use slotmap::new_key_type;
use std::fmt;
use std::path::{Path, PathBuf};

new_key_type! {
    /// Index of a record within its kind's table, backed by slotmap's
    /// generational keys so evicted handles never alias a later record.
    pub struct AssetHandle;
}

/// A handle together with the table it indexes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetRef {
    pub kind: AssetKind,
    pub handle: AssetHandle,
}

impl AssetRef {
    #[inline]
    pub fn new(handle: AssetHandle, kind: AssetKind) -> Self {
        Self { kind, handle }
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{:?}", self.kind, self.handle)
    }
}

/// Identity of a record inside one kind's table: name plus optional target file.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AssetKey {
    pub name: String,
    pub file: Option<PathBuf>,
}

impl AssetKey {
    pub fn new(name: impl Into<String>, file: Option<&Path>) -> Self {
        Self {
            name: name.into(),
            file: file.map(Path::to_path_buf),
        }
    }
}

/// Handles grouped by kind, as returned by staleness and dependent queries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssetGroups {
    groups: KindMap<Vec<AssetHandle>>,
}

impl AssetGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the handle unless it is already present
    pub fn insert(&mut self, asset: AssetRef) -> bool {
        let group = &mut self.groups[asset.kind];
        if group.contains(&asset.handle) {
            return false;
        }
        group.push(asset.handle);
        true
    }

    pub fn contains(&self, asset: AssetRef) -> bool {
        self.groups[asset.kind].contains(&asset.handle)
    }

    pub fn of_kind(&self, kind: AssetKind) -> &[AssetHandle] {
        &self.groups[kind]
    }

    pub fn iter(&self) -> impl Iterator<Item = AssetRef> + '_ {
        self.groups.iter().flat_map(|(kind, handles)| {
            handles.iter().map(move |&handle| AssetRef::new(handle, kind))
        })
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|(_, handles)| handles.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<AssetRef> for AssetGroups {
    fn from_iter<I: IntoIterator<Item = AssetRef>>(iter: I) -> Self {
        let mut groups = AssetGroups::new();
        for asset in iter {
            groups.insert(asset);
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::{KeyData, SlotMap};

    #[test]
    fn test_groups_deduplicate() {
        let handle = AssetHandle::from(KeyData::from_ffi(1));
        let mut groups = AssetGroups::new();
        assert!(groups.insert(AssetRef::new(handle, AssetKind::Material)));
        assert!(!groups.insert(AssetRef::new(handle, AssetKind::Material)));
        assert!(groups.insert(AssetRef::new(handle, AssetKind::Shader)));
        assert_eq!(groups.len(), 2);
        assert_eq!(groups.of_kind(AssetKind::Material), &[handle]);
    }

    #[test]
    fn test_evicted_handle_does_not_alias() {
        let mut table: SlotMap<AssetHandle, u32> = SlotMap::with_key();
        let first = table.insert(1);
        table.remove(first);
        let second = table.insert(2);
        assert_ne!(first, second);
        assert!(table.get(first).is_none());
    }
}
