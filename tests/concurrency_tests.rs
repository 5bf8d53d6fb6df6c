//! Concurrency tests
//!
//! Contexts are shared between threads and geometries from different
//! contexts are combined from opposite directions at the same time.

use geoctx::{Context, EngineStats, Geometry};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_shared_context_across_threads() {
    let ctx = Context::new();
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let ctx = ctx.clone();
            thread::spawn(move || {
                let mut total = 0.0;
                for i in 0..200 {
                    let point = ctx.new_point_from_xy(t as f64, i as f64);
                    let zone = point.buffer(1.0).unwrap();
                    assert!(zone.contains(&point));
                    total += zone.area();
                }
                total
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap() > 200.0 * 3.0);
    }
    let stats = ctx.engine_stats();
    assert_eq!(
        EngineStats {
            codecs: 0,
            ..stats
        },
        EngineStats::default()
    );
}

#[test]
fn test_geometries_move_between_threads() {
    let ctx = Context::new();
    let geoms: Vec<Geometry> = (0..100)
        .map(|i| ctx.new_point_from_xy(i as f64, 0.0))
        .collect();
    drop(ctx);

    let sum = thread::spawn(move || geoms.iter().map(Geometry::x).sum::<f64>())
        .join()
        .unwrap();
    assert_eq!(sum, 4950.0);
}

#[test]
fn test_opposite_lock_order_does_not_deadlock() {
    let ctx1 = Context::new();
    let ctx2 = Context::new();
    let a = ctx1
        .new_geom_from_wkt("POLYGON ((0 0, 2 0, 2 2, 0 2, 0 0))")
        .unwrap();
    let b = ctx2
        .new_geom_from_wkt("POLYGON ((1 1, 3 1, 3 3, 1 3, 1 1))")
        .unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let start = Instant::now();
    let forward = {
        let (a, b, barrier) = (a.clone(), b.clone(), barrier.clone());
        thread::spawn(move || {
            barrier.wait();
            for _ in 0..500 {
                assert!(a.intersects(&b));
                assert!(a.intersection(&b).is_ok());
            }
        })
    };
    let backward = {
        let (a, b, barrier) = (a.clone(), b.clone(), barrier.clone());
        thread::spawn(move || {
            barrier.wait();
            for _ in 0..500 {
                assert!(b.intersects(&a));
                assert!(b.difference(&a).is_ok());
            }
        })
    };
    forward.join().unwrap();
    backward.join().unwrap();

    assert!(
        start.elapsed() < Duration::from_secs(60),
        "contention took too long: {:?}",
        start.elapsed()
    );
}

#[test]
fn test_prepared_geometry_shared_between_threads() {
    let ctx = Context::new();
    let zone = ctx
        .new_geom_from_wkt("POLYGON ((0 0, 100 0, 100 100, 0 100, 0 0))")
        .unwrap();
    let prepared = Arc::new(zone.prepare());

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let prepared = prepared.clone();
            thread::spawn(move || {
                let local = Context::new();
                (0..200)
                    .filter(|i| {
                        let point = local.new_point_from_xy(*i as f64, t as f64 * 10.0 + 5.0);
                        prepared.contains(&point)
                    })
                    .count()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), 99);
    }
}
