#![cfg(feature = "parallel")]

use archetype_asset_db::headless::HeadlessBackend;
use archetype_asset_db::metadata::MaterialMetadata;
use archetype_asset_db::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const MATERIALS: usize = 24;
const TEXTURES: usize = 6;

fn threaded_context(backend: &HeadlessBackend) -> AssetContext {
    let config = CacheConfig::default();
    let pool = ThreadPoolSubmitter::new(config.worker_threads).unwrap();
    let collaborators = backend.collaborators().with_tasks(Arc::new(pool));
    AssetContext::new(config, collaborators).unwrap()
}

fn texture_name(i: usize) -> String {
    format!("tex_{}", i % TEXTURES)
}

#[test]
fn test_deferred_registration_on_worker_threads() {
    let backend = HeadlessBackend::new();
    for i in 0..MATERIALS {
        let texture = texture_name(i);
        backend.metadata.insert(
            &format!("mat_{i}"),
            AssetMetadata::Material(MaterialMetadata {
                textures: vec![Some(AssetLink::new(
                    &texture,
                    Some(PathBuf::from(format!("{texture}.png"))),
                ))],
                ..MaterialMetadata::default()
            }),
        );
    }
    let mut ctx = threaded_context(&backend);
    let global = ctx.global_view();

    for i in 0..MATERIALS {
        ctx.post_register(global, format!("mat_{i}"), None, AssetKind::Material, |_, result| {
            assert!(result.is_ok());
        });
    }
    assert!(ctx.run_until_idle(Duration::from_secs(30)));

    assert!(ctx.loading().is_empty());
    assert!(ctx.audit().is_empty());
    assert_eq!(backend.resources.live_count(), MATERIALS + TEXTURES);
    assert_eq!(backend.resources.create_count(), MATERIALS + TEXTURES);
    assert_eq!(backend.gpu.held(), 0);
    assert!(!backend.pacing.is_elevated());

    for i in 0..TEXTURES {
        let name = texture_name(i);
        let file = PathBuf::from(format!("{name}.png"));
        let texture = ctx.find(&name, Some(file.as_path()), AssetKind::Texture).unwrap();
        assert_eq!(ctx.record(texture).unwrap().ref_count() as usize, MATERIALS / TEXTURES);
    }
}

#[test]
fn test_threaded_teardown_releases_everything() {
    let backend = HeadlessBackend::new();
    let mut ctx = threaded_context(&backend);
    let sandbox = ctx.create_view("sandbox");

    for i in 0..TEXTURES {
        let name = texture_name(i);
        let file = PathBuf::from(format!("{name}.png"));
        ctx.try_register(sandbox, &name, Some(file.as_path()), AssetKind::Texture).unwrap();
        assert!(ctx.run_until_idle(Duration::from_secs(10)));
    }
    assert_eq!(backend.resources.live_count(), TEXTURES);

    ctx.destroy_view(sandbox).unwrap();
    assert!(ctx.run_until_idle(Duration::from_secs(10)));
    assert_eq!(backend.resources.live_count(), 0);
    assert!(ctx.database().is_empty());
    assert!(ctx
        .find("tex_0", Some(Path::new("tex_0.png")), AssetKind::Texture)
        .is_none());
}
