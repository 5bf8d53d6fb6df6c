use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use geoctx::{Bounds, Context};
use std::thread;

fn benchmark_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("construction");
    let ctx = Context::new();

    group.bench_function("point_from_xy", |b| {
        b.iter(|| ctx.new_point_from_xy(black_box(1.0), black_box(2.0)))
    });

    group.bench_function("polygon_from_wkt", |b| {
        b.iter(|| {
            ctx.new_geom_from_wkt(black_box("POLYGON ((0 0, 10 0, 10 10, 0 10, 0 0))"))
                .unwrap()
        })
    });

    let polygon = ctx
        .new_geom_from_wkt("POLYGON ((0 0, 10 0, 10 10, 0 10, 0 0))")
        .unwrap();
    let wkb = polygon.to_wkb();
    group.bench_function("polygon_from_wkb", |b| {
        b.iter(|| ctx.new_geom_from_wkb(black_box(&wkb)).unwrap())
    });

    group.finish();
}

fn benchmark_predicates(c: &mut Criterion) {
    let mut group = c.benchmark_group("predicates");
    let ctx = Context::new();
    let other = Context::new();
    let zone = ctx
        .new_geom_from_wkt("POLYGON ((0 0, 100 0, 100 100, 0 100, 0 0))")
        .unwrap();
    let local = ctx.new_point_from_xy(50.0, 50.0);
    let foreign = other.new_point_from_xy(50.0, 50.0);

    group.bench_function("contains_same_context", |b| {
        b.iter(|| zone.contains(black_box(&local)))
    });
    group.bench_function("contains_other_context", |b| {
        b.iter(|| zone.contains(black_box(&foreign)))
    });

    let prepared = zone.prepare();
    group.bench_function("prepared_contains_xy", |b| {
        b.iter(|| prepared.contains_xy(black_box(50.0), black_box(50.0)))
    });

    group.finish();
}

fn benchmark_strtree(c: &mut Criterion) {
    let mut group = c.benchmark_group("strtree");
    let ctx = Context::new();

    for size in [100, 1000, 10000].iter() {
        let points: Vec<_> = (0..*size)
            .map(|i| ctx.new_point_from_xy((i % 100) as f64, (i / 100) as f64))
            .collect();
        let mut tree = ctx.new_strtree();
        for (i, point) in points.iter().enumerate() {
            tree.insert(point, i).unwrap();
        }
        let window = ctx.new_geom_from_bounds(&Bounds::new(10.0, 0.0, 20.0, 10.0));

        group.bench_with_input(BenchmarkId::new("query", size), size, |b, _| {
            b.iter(|| {
                let mut hits = 0usize;
                tree.query(black_box(&window), |_| hits += 1);
                hits
            })
        });
    }

    group.finish();
}

fn benchmark_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("contention");
    group.sample_size(20);

    for threads in [1, 2, 4].iter() {
        group.bench_with_input(
            BenchmarkId::new("shared_context_buffer", threads),
            threads,
            |b, &threads| {
                let ctx = Context::new();
                b.iter(|| {
                    let handles: Vec<_> = (0..threads)
                        .map(|t| {
                            let ctx = ctx.clone();
                            thread::spawn(move || {
                                for i in 0..50 {
                                    let point = ctx.new_point_from_xy(t as f64, i as f64);
                                    black_box(point.buffer(1.0).unwrap());
                                }
                            })
                        })
                        .collect();
                    for handle in handles {
                        handle.join().unwrap();
                    }
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_construction,
    benchmark_predicates,
    benchmark_strtree,
    benchmark_contention
);
criterion_main!(benches);
