//! The exclusive section every orchestrator unit runs in.

use parking_lot::MutexGuard;
use smallvec::SmallVec;

use crate::backend::{FramePacing, GpuLock, ResourceManager};
use crate::kind::AssetKind;

/// Holds the resource-manager lock, then the GPU lock for each touched
/// kind, then the raised frame-pacing hint. Dropping it releases them in
/// reverse order on every exit path.
pub struct ExclusiveSection<'a> {
    gpu: &'a dyn GpuLock,
    pacing: &'a dyn FramePacing,
    kinds: SmallVec<[AssetKind; AssetKind::COUNT]>,
    // Declared last: the resource-manager lock is released after Drop runs.
    _resources: MutexGuard<'a, ()>,
}

impl<'a> ExclusiveSection<'a> {
    /// Blocks until the resource manager is free. GPU kinds are locked in
    /// `AssetKind` order so two sections can never deadlock.
    pub fn acquire(
        resources: &'a dyn ResourceManager,
        gpu: &'a dyn GpuLock,
        pacing: &'a dyn FramePacing,
        kinds: &[AssetKind],
    ) -> Self {
        let guard = resources.exclusive().lock();

        let mut sorted: SmallVec<[AssetKind; AssetKind::COUNT]> = kinds.iter().copied().collect();
        sorted.sort();
        sorted.dedup();
        for &kind in &sorted {
            gpu.lock_for_kind(kind);
        }
        pacing.elevate();

        Self {
            gpu,
            pacing,
            kinds: sorted,
            _resources: guard,
        }
    }

    pub fn kinds(&self) -> &[AssetKind] {
        &self.kinds
    }
}

impl Drop for ExclusiveSection<'_> {
    fn drop(&mut self) {
        self.pacing.reset();
        for &kind in self.kinds.iter().rev() {
            self.gpu.unlock_for_kind(kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{HeadlessResourceManager, LockEvent, RecordingGpuLock, RecordingPacing};

    #[test]
    fn test_release_order_is_reverse_of_acquire() {
        let resources = HeadlessResourceManager::new();
        let gpu = RecordingGpuLock::new();
        let pacing = RecordingPacing::new();
        {
            let section = ExclusiveSection::acquire(
                &resources,
                &gpu,
                &pacing,
                &[AssetKind::Material, AssetKind::Texture, AssetKind::Material],
            );
            assert_eq!(section.kinds(), &[AssetKind::Texture, AssetKind::Material]);
            assert!(resources.exclusive().try_lock().is_none());
            assert!(pacing.is_elevated());
        }
        assert_eq!(
            gpu.events(),
            vec![
                LockEvent::Locked(AssetKind::Texture),
                LockEvent::Locked(AssetKind::Material),
                LockEvent::Unlocked(AssetKind::Material),
                LockEvent::Unlocked(AssetKind::Texture),
            ]
        );
        assert!(!pacing.is_elevated());
        assert!(resources.exclusive().try_lock().is_some());
    }

    #[test]
    fn test_released_on_panic() {
        let resources = HeadlessResourceManager::new();
        let gpu = RecordingGpuLock::new();
        let pacing = RecordingPacing::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _section = ExclusiveSection::acquire(&resources, &gpu, &pacing, &[AssetKind::Mesh]);
            panic!("resource manager exploded");
        }));
        assert!(result.is_err());
        assert!(!pacing.is_elevated());
        assert_eq!(gpu.held(), 0);
        assert!(resources.exclusive().try_lock().is_some());
    }
}
