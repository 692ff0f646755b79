//! Reference views: per-consumer lists of handles that contribute to the
//! shared reference counts.
//!
//! A view only stores `(handle, kind)` pairs. It never owns record memory;
//! dropping an entry decrements a counter the store interprets.

use crate::handle::AssetRef;
use slotmap::new_key_type;

new_key_type! {
    /// Identifies one reference view inside an `AssetContext`.
    pub struct ViewId;
}

/// A change recorded against a view but not yet applied to shared counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StagedChange {
    Add(AssetRef),
    Remove(AssetRef),
}

/// Ordered list of assets held by one consumer (a sandbox, or the global
/// editor scope).
#[derive(Clone, Debug, Default)]
pub struct ReferenceView {
    label: String,
    entries: Vec<AssetRef>,
    staged: Vec<StagedChange>,
}

impl ReferenceView {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            entries: Vec::new(),
            staged: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Committed entries, in registration order
    pub fn entries(&self) -> &[AssetRef] {
        &self.entries
    }

    /// How many committed references this view holds on `asset`
    pub fn count_of(&self, asset: AssetRef) -> usize {
        self.entries.iter().filter(|e| **e == asset).count()
    }

    pub fn contains(&self, asset: AssetRef) -> bool {
        self.entries.contains(&asset)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queue a reference to be added on the next commit
    pub fn stage_add(&mut self, asset: AssetRef) {
        self.staged.push(StagedChange::Add(asset));
    }

    /// Queue a reference to be dropped on the next commit
    pub fn stage_remove(&mut self, asset: AssetRef) {
        self.staged.push(StagedChange::Remove(asset));
    }

    pub fn staged(&self) -> &[StagedChange] {
        &self.staged
    }

    pub fn has_staged(&self) -> bool {
        !self.staged.is_empty()
    }

    pub fn discard_staged(&mut self) {
        self.staged.clear();
    }

    pub(crate) fn take_staged(&mut self) -> Vec<StagedChange> {
        std::mem::take(&mut self.staged)
    }

    pub(crate) fn push(&mut self, asset: AssetRef) {
        self.entries.push(asset);
    }

    /// Removes the most recent occurrence of `asset`
    pub(crate) fn remove_one(&mut self, asset: AssetRef) -> bool {
        match self.entries.iter().rposition(|e| *e == asset) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn drain(&mut self) -> Vec<AssetRef> {
        std::mem::take(&mut self.entries)
    }
}
