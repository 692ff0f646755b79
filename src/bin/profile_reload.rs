#![allow(dead_code, unused_imports)]

use archetype_asset_db::headless::HeadlessBackend;
use archetype_asset_db::prelude::*;
use archetype_asset_db::metadata::{MaterialMetadata, ShaderMetadata};
use std::path::PathBuf;
use std::time::{Duration, Instant};

const SHADERS: usize = 16;
const MATERIALS: usize = 2_000;

/// One shared include, `SHADERS` shaders on it, `MATERIALS` materials
/// spread over the shaders.
fn populate(backend: &HeadlessBackend) {
    let include = AssetLink::new("common", Some(PathBuf::from("common.wgsl")));
    for s in 0..SHADERS {
        backend.metadata.insert(
            &format!("shader_{s}"),
            AssetMetadata::Shader(ShaderMetadata {
                includes: vec![Some(include.clone())],
                ..ShaderMetadata::default()
            }),
        );
    }
    for m in 0..MATERIALS {
        let shader = format!("shader_{}", m % SHADERS);
        backend.metadata.insert(
            &format!("material_{m}"),
            AssetMetadata::Material(MaterialMetadata {
                shader: Some(AssetLink::new(
                    &shader,
                    Some(PathBuf::from(format!("{shader}.wgsl"))),
                )),
                ..MaterialMetadata::default()
            }),
        );
    }
}

#[cfg(feature = "profiling")]
fn main() -> archetype_asset_db::Result<()> {
    let _guard = archetype_asset_db::profiling::init_file_subscriber("trace.json")?;

    let backend = HeadlessBackend::new();
    populate(&backend);
    let mut ctx = AssetContext::new(CacheConfig::default(), backend.collaborators())?;
    let global = ctx.global_view();

    println!("Registering {MATERIALS} materials...");
    let start = Instant::now();
    {
        let _span = tracing::info_span!("register_all", materials = MATERIALS).entered();
        for m in 0..MATERIALS {
            ctx.try_register(global, &format!("material_{m}"), None, AssetKind::Material)?;
            ctx.run_until_idle(Duration::from_secs(10));
        }
    }
    println!("Registered in {:?}", start.elapsed());

    let include = ctx
        .find("common", Some(PathBuf::from("common.wgsl").as_path()), AssetKind::Misc)
        .ok_or_else(|| AssetError::AssetNotFound("common".to_string()))?;

    println!("Reloading the shared include...");
    let start = Instant::now();
    backend.metadata.insert(
        "common",
        AssetMetadata::Misc(archetype_asset_db::metadata::MiscMetadata {
            content_type: "text/wgsl".to_string(),
        }),
    );
    ctx.try_reload(include)?;
    ctx.run_until_idle(Duration::from_secs(30));
    println!("Reload complete in {:?}: {:?}", start.elapsed(), ctx.last_reload());
    Ok(())
}

#[cfg(not(feature = "profiling"))]
fn main() {
    println!("profile_reload binary requires --features profiling");
}
