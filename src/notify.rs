//! Consumer notification: pointer-change deltas delivered to everything
//! that holds a resource id.

use ahash::AHashMap;

use crate::handle::AssetRef;
use crate::kind::AssetKind;
use crate::record::ResourceId;

/// One record's resource moved from `old` to `new`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PointerChange {
    pub asset: AssetRef,
    pub name: String,
    pub old: Option<ResourceId>,
    pub new: Option<ResourceId>,
}

impl PointerChange {
    pub fn kind(&self) -> AssetKind {
        self.asset.kind
    }
}

/// Receives one call per changed record after a load, reload or unload
/// batch completes.
pub trait AssetListener: Send {
    fn on_asset_pointer_changed(
        &mut self,
        old: Option<ResourceId>,
        new: Option<ResourceId>,
        kind: AssetKind,
    );

    /// Get name for debugging
    fn name(&self) -> &str {
        "AssetListener"
    }
}

impl<F> AssetListener for F
where
    F: FnMut(Option<ResourceId>, Option<ResourceId>, AssetKind) + Send,
{
    fn on_asset_pointer_changed(
        &mut self,
        old: Option<ResourceId>,
        new: Option<ResourceId>,
        kind: AssetKind,
    ) {
        self(old, new, kind)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Registry that manages all listeners
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Vec<(ListenerId, Box<dyn AssetListener>)>,
    next_id: u64,
    delivered: u64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: Box<dyn AssetListener>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, listener));
        id
    }

    /// Register a closure listener
    pub fn register_fn<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(Option<ResourceId>, Option<ResourceId>, AssetKind) + Send + 'static,
    {
        self.register(Box::new(listener))
    }

    pub fn unregister(&mut self, id: ListenerId) -> Option<Box<dyn AssetListener>> {
        let index = self.listeners.iter().position(|(lid, _)| *lid == id)?;
        Some(self.listeners.remove(index).1)
    }

    /// Broadcast every change to every listener
    pub fn dispatch(&mut self, changes: &[PointerChange]) {
        for change in changes {
            tracing::debug!(
                asset = %change.name,
                kind = %change.asset.kind,
                old = ?change.old,
                new = ?change.new,
                "asset pointer changed"
            );
            for (_, listener) in &mut self.listeners {
                listener.on_asset_pointer_changed(change.old, change.new, change.asset.kind);
            }
            self.delivered += 1;
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Total changes delivered since creation
    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}

/// Opaque id of a consumer slot inside [`ResourceBindings`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BindingId(u64);

/// Component-side table of held resource ids. Feeding it pointer changes
/// rewrites every slot that held the old id.
#[derive(Debug, Default)]
pub struct ResourceBindings {
    slots: AHashMap<BindingId, (AssetKind, Option<ResourceId>)>,
    next_id: u64,
}

impl ResourceBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, kind: AssetKind, resource: Option<ResourceId>) -> BindingId {
        let id = BindingId(self.next_id);
        self.next_id += 1;
        self.slots.insert(id, (kind, resource));
        id
    }

    pub fn unbind(&mut self, id: BindingId) -> bool {
        self.slots.remove(&id).is_some()
    }

    pub fn get(&self, id: BindingId) -> Option<ResourceId> {
        self.slots.get(&id).and_then(|(_, resource)| *resource)
    }

    /// Rewrites matching slots; returns how many changed.
    pub fn apply(
        &mut self,
        old: Option<ResourceId>,
        new: Option<ResourceId>,
        kind: AssetKind,
    ) -> usize {
        // A fresh load has no old id to match against.
        let Some(old) = old else {
            return 0;
        };
        let mut updated = 0;
        for (slot_kind, resource) in self.slots.values_mut() {
            if *slot_kind == kind && *resource == Some(old) {
                *resource = new;
                updated += 1;
            }
        }
        updated
    }
}

impl AssetListener for ResourceBindings {
    fn on_asset_pointer_changed(
        &mut self,
        old: Option<ResourceId>,
        new: Option<ResourceId>,
        kind: AssetKind,
    ) {
        self.apply(old, new, kind);
    }

    fn name(&self) -> &str {
        "ResourceBindings"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::AssetHandle;
    use parking_lot::Mutex;
    use slotmap::KeyData;
    use std::sync::Arc;

    fn change(old: Option<u64>, new: Option<u64>) -> PointerChange {
        PointerChange {
            asset: AssetRef::new(AssetHandle::from(KeyData::from_ffi(1)), AssetKind::Texture),
            name: "brick".to_string(),
            old: old.map(ResourceId),
            new: new.map(ResourceId),
        }
    }

    #[test]
    fn test_dispatch_reaches_every_listener() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ListenerRegistry::new();
        for _ in 0..2 {
            let seen = seen.clone();
            registry.register_fn(move |old, new, kind| {
                seen.lock().push((old, new, kind));
            });
        }
        registry.dispatch(&[change(None, Some(5))]);
        assert_eq!(seen.lock().len(), 2);
        assert_eq!(registry.delivered(), 1);
    }

    #[test]
    fn test_unregister() {
        let mut registry = ListenerRegistry::new();
        let id = registry.register(Box::new(ResourceBindings::new()));
        assert_eq!(registry.listener_count(), 1);
        assert!(registry.unregister(id).is_some());
        assert!(registry.unregister(id).is_none());
    }

    #[test]
    fn test_bindings_follow_pointer_swap() {
        let mut bindings = ResourceBindings::new();
        let a = bindings.bind(AssetKind::Texture, Some(ResourceId(3)));
        let b = bindings.bind(AssetKind::Texture, Some(ResourceId(3)));
        let other = bindings.bind(AssetKind::Mesh, Some(ResourceId(3)));

        assert_eq!(bindings.apply(Some(ResourceId(3)), Some(ResourceId(8)), AssetKind::Texture), 2);
        assert_eq!(bindings.get(a), Some(ResourceId(8)));
        assert_eq!(bindings.get(b), Some(ResourceId(8)));
        assert_eq!(bindings.get(other), Some(ResourceId(3)));

        bindings.on_asset_pointer_changed(Some(ResourceId(8)), None, AssetKind::Texture);
        assert_eq!(bindings.get(a), None);
    }
}
