//! Staleness detection from file timestamps.
//!
//! An asset is out of date when the newest of its metadata file and
//! target file is newer than the stamp stored with the resource manager,
//! or when no stamp was ever stored.

use rustc_hash::FxHashSet;
use std::path::PathBuf;
use std::time::SystemTime;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::backend::{FileClock, TimeStampStore};
use crate::config::MountPoint;
use crate::database::AssetDatabase;
use crate::handle::{AssetGroups, AssetRef};
use crate::kind::AssetKind;
use crate::record::AssetRecord;

/// Scan options
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StalenessScan {
    /// Advance stored stamps to the file time of every flagged asset
    pub update_stamp: bool,
    /// Also flag everything that transitively depends on a flagged asset
    pub include_dependencies: bool,
}

/// `max(metadata mtime, target mtime)`. `None` when neither file can be read.
pub fn external_timestamp(
    clock: &dyn FileClock,
    mount: &MountPoint,
    record: &AssetRecord,
) -> Option<SystemTime> {
    let metadata = clock
        .modified(&mount.metadata_path(record.kind(), record.name()))
        .ok();
    let target = record
        .file()
        .and_then(|file| clock.modified(&mount.target_path(file)).ok());
    metadata.max(target)
}

/// Where the stamp of `record` lives in the time stamp store
pub fn stamp_key(mount: &MountPoint, record: &AssetRecord) -> PathBuf {
    mount.stamp_key(record.kind(), record.name(), record.file())
}

/// Single-asset check; never writes stamps.
pub fn is_stale<S: TimeStampStore + ?Sized>(
    db: &AssetDatabase,
    stamps: &S,
    clock: &dyn FileClock,
    mount: &MountPoint,
    asset: AssetRef,
) -> bool {
    let Some(record) = db.get(asset) else {
        return false;
    };
    let Some(external) = external_timestamp(clock, mount, record) else {
        return false;
    };
    match stamps.get_time_stamp(&stamp_key(mount, record)) {
        Some(stored) => external > stored,
        None => true,
    }
}

/// Scan every record and return the out-of-date set.
pub fn find_out_of_date<S: TimeStampStore + ?Sized>(
    db: &mut AssetDatabase,
    stamps: &S,
    clock: &dyn FileClock,
    mount: &MountPoint,
    scan: StalenessScan,
) -> AssetGroups {
    #[cfg(feature = "profiling")]
    let _span = info_span!("find_out_of_date", records = db.len()).entered();

    let mut flagged = FxHashSet::default();
    let mut out_of_date = AssetGroups::new();

    for kind in AssetKind::ALL {
        for (handle, record) in db.iter_mut(kind) {
            let Some(external) = external_timestamp(clock, mount, record) else {
                continue;
            };
            let path = stamp_key(mount, record);
            let stale = match stamps.get_time_stamp(&path) {
                // Never validated: flag once and start tracking.
                None => {
                    stamps.add_time_stamp(&path, external);
                    record.last_validated = Some(external);
                    true
                }
                Some(stored) if external > stored => {
                    if scan.update_stamp {
                        stamps.change_time_stamp(&path, external);
                        record.last_validated = Some(external);
                    }
                    true
                }
                Some(_) => false,
            };
            if stale {
                let asset = AssetRef::new(handle, kind);
                flagged.insert(asset);
                out_of_date.insert(asset);
            }
        }
    }

    if scan.include_dependencies && !flagged.is_empty() {
        propagate_to_dependents(db, &mut flagged, &mut out_of_date);
    }

    if !out_of_date.is_empty() {
        tracing::debug!(count = out_of_date.len(), "out-of-date assets found");
    }
    out_of_date
}

/// Fixed point over two alternating work lists. Each pass only looks at
/// what the previous pass added, and a record is flagged at most once, so
/// the loop runs at most once per record.
fn propagate_to_dependents(
    db: &AssetDatabase,
    flagged: &mut FxHashSet<AssetRef>,
    out_of_date: &mut AssetGroups,
) {
    let mut current: Vec<AssetRef> = flagged.iter().copied().collect();
    let mut next = Vec::new();

    while !current.is_empty() {
        for kind in AssetKind::DEPENDENCY_CAPABLE {
            for (handle, record) in db.iter(kind) {
                let asset = AssetRef::new(handle, kind);
                if flagged.contains(&asset) {
                    continue;
                }
                if record.dependencies().iter().any(|dep| current.contains(dep)) {
                    flagged.insert(asset);
                    out_of_date.insert(asset);
                    next.push(asset);
                }
            }
        }
        current.clear();
        std::mem::swap(&mut current, &mut next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{HeadlessResourceManager, ManualFileClock};
    use crate::metadata::{AssetLink, AssetMetadata, MaterialMetadata};
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    struct Fixture {
        db: AssetDatabase,
        stamps: HeadlessResourceManager,
        clock: ManualFileClock,
        mount: MountPoint,
        shader: AssetRef,
        material: AssetRef,
    }

    fn fixture() -> Fixture {
        let mount = MountPoint::new("root");
        let clock = ManualFileClock::new();
        let stamps = HeadlessResourceManager::new();
        let mut db = AssetDatabase::new();

        let shader_file = PathBuf::from("lit.wgsl");
        let shader = AssetRef::new(
            db.add_asset("lit", Some(&shader_file), AssetKind::Shader).handle,
            AssetKind::Shader,
        );
        let material = AssetRef::new(
            db.add_asset("brick", None, AssetKind::Material).handle,
            AssetKind::Material,
        );
        let mut link = AssetLink::new("lit", Some(shader_file.clone()));
        link.handle = Some(shader.handle);
        db.record_mut(material).metadata = AssetMetadata::Material(MaterialMetadata {
            shader: Some(link),
            ..MaterialMetadata::default()
        });

        for asset in [shader, material] {
            let record = db.record(asset);
            clock.set(&mount.metadata_path(asset.kind, record.name()), at(10));
            stamps.add_time_stamp(&stamp_key(&mount, record), at(10));
        }
        clock.set(&mount.target_path(Path::new("lit.wgsl")), at(10));

        Fixture {
            db,
            stamps,
            clock,
            mount,
            shader,
            material,
        }
    }

    #[test]
    fn test_nothing_stale_when_stamps_match() {
        let mut f = fixture();
        let result = find_out_of_date(
            &mut f.db,
            &f.stamps,
            &f.clock,
            &f.mount,
            StalenessScan::default(),
        );
        assert!(result.is_empty());
    }

    #[test]
    fn test_target_change_flags_dependents() {
        let mut f = fixture();
        f.clock.set(&f.mount.target_path(Path::new("lit.wgsl")), at(20));

        let direct = find_out_of_date(
            &mut f.db,
            &f.stamps,
            &f.clock,
            &f.mount,
            StalenessScan::default(),
        );
        assert!(direct.contains(f.shader));
        assert!(!direct.contains(f.material));

        let with_deps = find_out_of_date(
            &mut f.db,
            &f.stamps,
            &f.clock,
            &f.mount,
            StalenessScan {
                update_stamp: false,
                include_dependencies: true,
            },
        );
        assert!(with_deps.contains(f.shader));
        assert!(with_deps.contains(f.material));
    }

    #[test]
    fn test_update_stamp_makes_scan_idempotent() {
        let mut f = fixture();
        f.clock.set(&f.mount.target_path(Path::new("lit.wgsl")), at(20));
        let scan = StalenessScan {
            update_stamp: true,
            include_dependencies: true,
        };

        let first = find_out_of_date(&mut f.db, &f.stamps, &f.clock, &f.mount, scan);
        assert_eq!(first.len(), 2);
        assert_eq!(f.db.record(f.shader).last_validated(), Some(at(20)));

        let second = find_out_of_date(&mut f.db, &f.stamps, &f.clock, &f.mount, scan);
        assert!(second.is_empty());
    }

    #[test]
    fn test_never_validated_is_flagged_once() {
        let mut f = fixture();
        let path = stamp_key(&f.mount, f.db.record(f.shader));
        f.stamps.remove_time_stamp(&path);

        assert!(is_stale(&f.db, &f.stamps, &f.clock, &f.mount, f.shader));
        let first = find_out_of_date(
            &mut f.db,
            &f.stamps,
            &f.clock,
            &f.mount,
            StalenessScan::default(),
        );
        assert!(first.contains(f.shader));
        assert!(f.stamps.exists(&path));

        let second = find_out_of_date(
            &mut f.db,
            &f.stamps,
            &f.clock,
            &f.mount,
            StalenessScan::default(),
        );
        assert!(second.is_empty());
    }

    #[test]
    fn test_same_name_records_keep_separate_stamps() {
        let mut f = fixture();
        let mut wood = Vec::new();
        for file in ["a.png", "b.png"] {
            let reg = f.db.add_asset("wood", Some(Path::new(file)), AssetKind::Texture);
            f.clock.set(&f.mount.target_path(Path::new(file)), at(10));
            wood.push(AssetRef::new(reg.handle, AssetKind::Texture));
        }
        let first = find_out_of_date(
            &mut f.db,
            &f.stamps,
            &f.clock,
            &f.mount,
            StalenessScan::default(),
        );
        assert_eq!(first.len(), 2);

        let key = stamp_key(&f.mount, f.db.record(wood[0]));
        assert!(f.stamps.remove_time_stamp(&key));
        assert!(!is_stale(&f.db, &f.stamps, &f.clock, &f.mount, wood[1]));
    }

    #[test]
    fn test_unreadable_files_are_skipped() {
        let mut f = fixture();
        let reg = f
            .db
            .add_asset("ghost", Some(Path::new("ghost.png")), AssetKind::Texture);
        let ghost = AssetRef::new(reg.handle, AssetKind::Texture);
        assert!(!is_stale(&f.db, &f.stamps, &f.clock, &f.mount, ghost));
        let result = find_out_of_date(
            &mut f.db,
            &f.stamps,
            &f.clock,
            &f.mount,
            StalenessScan::default(),
        );
        assert!(!result.contains(ghost));
    }
}
