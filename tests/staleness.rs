use archetype_asset_db::headless::{HeadlessBackend, HeadlessResourceManager};
use archetype_asset_db::metadata::{MaterialMetadata, TextureMetadata};
use archetype_asset_db::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

const IDLE: Duration = Duration::from_secs(5);

fn at(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
}

fn material_on_shader(backend: &HeadlessBackend, name: &str) {
    backend.metadata.insert(
        name,
        AssetMetadata::Material(MaterialMetadata {
            shader: Some(AssetLink::new("lit", Some(PathBuf::from("lit.wgsl")))),
            ..MaterialMetadata::default()
        }),
    );
}

#[test]
fn test_shader_change_flags_materials() {
    let backend = HeadlessBackend::new();
    let mut ctx = AssetContext::new(CacheConfig::default(), backend.collaborators()).unwrap();
    let shader_meta = ctx.mount().metadata_path(AssetKind::Shader, "lit");
    let shader_file = ctx.mount().target_path(Path::new("lit.wgsl"));
    backend.clock.set(&shader_meta, at(100));
    backend.clock.set(&shader_file, at(100));
    material_on_shader(&backend, "brick");
    material_on_shader(&backend, "marble");

    let global = ctx.global_view();
    let brick = ctx.try_register(global, "brick", None, AssetKind::Material).unwrap();
    assert!(ctx.run_until_idle(IDLE));
    let marble = ctx.try_register(global, "marble", None, AssetKind::Material).unwrap();
    assert!(ctx.run_until_idle(IDLE));
    let shader = ctx.find("lit", Some(Path::new("lit.wgsl")), AssetKind::Shader).unwrap();

    // Stamped when loaded.
    assert_eq!(ctx.record(shader).unwrap().last_validated(), Some(at(100)));
    assert!(ctx.find_out_of_date(true, true).is_empty());

    backend.clock.set(&shader_file, at(200));
    assert!(ctx.is_stale(shader));
    let out_of_date = ctx.find_out_of_date(true, true);
    assert!(out_of_date.contains(shader));
    assert!(out_of_date.contains(brick));
    assert!(out_of_date.contains(marble));
    assert_eq!(out_of_date.len(), 3);

    assert!(ctx.find_out_of_date(true, true).is_empty());
    assert!(!ctx.is_stale(shader));
}

#[test]
fn test_scan_without_dependencies_flags_only_changed() {
    let backend = HeadlessBackend::new();
    let mut ctx = AssetContext::new(CacheConfig::default(), backend.collaborators()).unwrap();
    let shader_file = ctx.mount().target_path(Path::new("lit.wgsl"));
    backend.clock.set(&shader_file, at(10));
    material_on_shader(&backend, "brick");

    let global = ctx.global_view();
    ctx.try_register(global, "brick", None, AssetKind::Material).unwrap();
    assert!(ctx.run_until_idle(IDLE));
    let shader = ctx.find("lit", Some(Path::new("lit.wgsl")), AssetKind::Shader).unwrap();

    backend.clock.set(&shader_file, at(20));
    // Without update_stamp the flag sticks.
    for _ in 0..2 {
        let out_of_date = ctx.find_out_of_date(false, false);
        assert_eq!(out_of_date.len(), 1);
        assert!(out_of_date.contains(shader));
    }
}

#[test]
fn test_stale_asset_reloads_with_unchanged_metadata() {
    let backend = HeadlessBackend::new();
    let mut ctx = AssetContext::new(CacheConfig::default(), backend.collaborators()).unwrap();
    let file = ctx.mount().target_path(Path::new("albedo.png"));
    backend.clock.set(&file, at(1));

    let global = ctx.global_view();
    let texture = ctx
        .try_register(global, "albedo", Some(Path::new("albedo.png")), AssetKind::Texture)
        .unwrap();
    assert!(ctx.run_until_idle(IDLE));
    assert_eq!(ctx.try_reload(texture).unwrap(), ReloadStatus::UpToDate);

    backend.clock.set(&file, at(2));
    assert_eq!(ctx.try_reload(texture).unwrap(), ReloadStatus::Submitted { scope: 1 });
    assert!(ctx.run_until_idle(IDLE));
    assert_eq!(ctx.record(texture).unwrap().last_validated(), Some(at(2)));
    assert_eq!(ctx.try_reload(texture).unwrap(), ReloadStatus::UpToDate);
}

#[test]
fn test_evicting_namesake_keeps_survivor_stamp() {
    let backend = HeadlessBackend::new();
    let mut ctx = AssetContext::new(CacheConfig::default(), backend.collaborators()).unwrap();
    let global = ctx.global_view();
    let mut wood = Vec::new();
    for file in ["a.png", "b.png"] {
        backend.clock.set(&ctx.mount().target_path(Path::new(file)), at(5));
        wood.push(
            ctx.try_register(global, "wood", Some(Path::new(file)), AssetKind::Texture)
                .unwrap(),
        );
        assert!(ctx.run_until_idle(IDLE));
    }
    assert_ne!(wood[0], wood[1]);
    assert_eq!(backend.resources.stamp_count(), 2);
    assert!(ctx.find_out_of_date(true, false).is_empty());

    ctx.try_unregister(global, wood[0], true).unwrap();
    assert!(ctx.run_until_idle(IDLE));
    assert!(!ctx.exists(wood[0]));
    assert_eq!(backend.resources.stamp_count(), 1);
    assert!(!ctx.is_stale(wood[1]));
    assert!(!ctx.find_out_of_date(false, false).contains(wood[1]));
}

#[test]
fn test_json_store_on_real_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = CacheConfig {
        mount_root: dir.path().to_path_buf(),
        ..CacheConfig::default()
    };
    let mount = config.mount_point();
    let store = JsonMetadataStore::new(mount.clone());
    store
        .write_metadata(
            AssetKind::Material,
            "brick",
            None,
            &AssetMetadata::Material(MaterialMetadata {
                textures: vec![Some(AssetLink::new("albedo", Some(PathBuf::from("albedo.png"))))],
                ..MaterialMetadata::default()
            }),
        )
        .unwrap();
    store
        .write_metadata(
            AssetKind::Texture,
            "albedo",
            Some(Path::new("albedo.png")),
            &AssetMetadata::Texture(TextureMetadata::default()),
        )
        .unwrap();
    let texture_path = mount.target_path(Path::new("albedo.png"));
    std::fs::write(&texture_path, b"png").unwrap();

    let resources = Arc::new(HeadlessResourceManager::new());
    let collaborators = Collaborators::new(resources.clone(), Arc::new(store));
    let mut ctx = AssetContext::new(config, collaborators).unwrap();
    let global = ctx.global_view();
    let material = ctx.try_register(global, "brick", None, AssetKind::Material).unwrap();
    assert!(ctx.run_until_idle(IDLE));
    assert!(ctx.resource_of(material).is_loaded());
    assert!(ctx.take_diagnostics().is_empty());
    assert!(ctx.find_out_of_date(true, true).is_empty());

    let later = SystemTime::now() + Duration::from_secs(60);
    File::options()
        .write(true)
        .open(&texture_path)
        .unwrap()
        .set_modified(later)
        .unwrap();

    let out_of_date = ctx.find_out_of_date(true, true);
    let texture = ctx
        .find("albedo", Some(Path::new("albedo.png")), AssetKind::Texture)
        .unwrap();
    assert!(out_of_date.contains(texture));
    assert!(out_of_date.contains(material));
    assert!(ctx.find_out_of_date(true, true).is_empty());

    // A document that is not there leaves defaults and a warning.
    let ghost = ctx.try_register(global, "ghost", None, AssetKind::Material).unwrap();
    assert!(ctx.run_until_idle(IDLE));
    assert!(ctx.resource_of(ghost).is_loaded());
    let warnings = ctx.take_diagnostics();
    assert!(warnings.iter().any(|d| d.severity == Severity::Warning
        && d.asset_name == "ghost"
        && d.message.contains("Missing file")));

    // Saving writes the document back where it was read from.
    ctx.save_metadata(material).unwrap();
    let text = std::fs::read_to_string(mount.metadata_path(AssetKind::Material, "brick")).unwrap();
    assert!(text.contains("albedo"));
}
