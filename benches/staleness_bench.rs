use archetype_asset_db::headless::HeadlessBackend;
use archetype_asset_db::metadata::MaterialMetadata;
use archetype_asset_db::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// `count` materials over `count / 4` textures, every file stamped at t=1
fn populated(count: usize) -> (HeadlessBackend, AssetContext) {
    let backend = HeadlessBackend::new();
    let mut ctx = AssetContext::new(CacheConfig::default(), backend.collaborators()).unwrap();
    let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(1);
    let textures = (count / 4).max(1);

    for t in 0..textures {
        let file = format!("tex_{t}.png");
        backend.clock.set(&ctx.mount().target_path(Path::new(&file)), stamp);
    }
    let global = ctx.global_view();
    for m in 0..count {
        let name = format!("mat_{m}");
        let texture = format!("tex_{}", m % textures);
        backend.metadata.insert(
            &name,
            AssetMetadata::Material(MaterialMetadata {
                textures: vec![Some(AssetLink::new(
                    &texture,
                    Some(PathBuf::from(format!("{texture}.png"))),
                ))],
                ..MaterialMetadata::default()
            }),
        );
        backend.clock.set(&ctx.mount().metadata_path(AssetKind::Material, &name), stamp);
        ctx.try_register(global, &name, None, AssetKind::Material).unwrap();
        ctx.run_until_idle(Duration::from_secs(10));
    }
    (backend, ctx)
}

fn bench_clean_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("staleness_clean_scan");
    for count in [100usize, 1_000] {
        let (_backend, mut ctx) = populated(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| black_box(ctx.find_out_of_date(true, false)));
        });
    }
    group.finish();
}

fn bench_scan_with_dependents(c: &mut Criterion) {
    c.bench_function("staleness_touch_one_texture_1000", |b| {
        let (backend, mut ctx) = populated(1_000);
        let file = ctx.mount().target_path(Path::new("tex_0.png"));
        let mut secs = 1;
        b.iter(|| {
            // Every iteration sees a newer file than the last stamp.
            secs += 1;
            backend
                .clock
                .set(&file, SystemTime::UNIX_EPOCH + Duration::from_secs(secs));
            black_box(ctx.find_out_of_date(true, true))
        });
    });
}

criterion_group!(benches, bench_clean_scan, bench_scan_with_dependents);
criterion_main!(benches);
