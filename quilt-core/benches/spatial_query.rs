use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use quilt_core::core_canvas::{EntityId, IndexConfig, Rect, SpatialIndex};
use quilt_core::test_utils::random_rect;
use rand::Rng;

use bench_config::BenchConfig;

const EXTENT: f64 = 10_000.0;

fn populated(config: &BenchConfig, n: usize) -> (SpatialIndex, Vec<(EntityId, Rect)>) {
    let mut rng = config.rng();
    let items: Vec<(EntityId, Rect)> =
        (0..n).map(|_| (EntityId::generate(), random_rect(&mut rng, EXTENT, 50.0))).collect();
    (SpatialIndex::bulk_load(IndexConfig::default(), items.clone()), items)
}

fn bench_query(c: &mut Criterion) {
    let mut config = BenchConfig::for_suite("spatial_query");
    let mut group = c.benchmark_group("region_query");

    for n in [1_000usize, 10_000, 100_000] {
        config.set_param(format!("entities_{n}_extent"), EXTENT);
        let (index, items) = populated(&config, n);
        let viewport = Rect::new(4_000.0, 4_000.0, 800.0, 600.0);

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("rtree_viewport", n), &index, |b, index| {
            b.iter(|| black_box(index.query(viewport).iter().count()));
        });
        group.bench_with_input(BenchmarkId::new("linear_scan_viewport", n), &items, |b, items| {
            b.iter(|| black_box(items.iter().filter(|(_, r)| r.intersects(&viewport)).count()));
        });
    }

    group.finish();
}

fn bench_updates(c: &mut Criterion) {
    let config = BenchConfig::for_suite("spatial_query");
    let mut group = c.benchmark_group("index_update");

    let (mut index, items) = populated(&config, 50_000);
    let mut rng = config.rng();
    group.bench_function("move_random_entity", |b| {
        b.iter(|| {
            let (id, _) = items[rng.random_range(0..items.len())];
            black_box(index.update(id, random_rect(&mut rng, EXTENT, 50.0)))
        });
    });

    for n in [10_000usize, 100_000] {
        let (_, items) = populated(&config, n);
        group.bench_with_input(BenchmarkId::new("bulk_load", n), &items, |b, items| {
            b.iter(|| black_box(SpatialIndex::bulk_load(IndexConfig::default(), items.clone()).len()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_query, bench_updates);
criterion_main!(benches);
