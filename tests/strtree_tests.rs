use geoctx::{Bounds, Context, ContextBuilder, Error, Geometry};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn grid(ctx: &Context, n: usize) -> Vec<Geometry> {
    (0..n)
        .map(|i| ctx.new_point_from_xy((i % 10) as f64, (i / 10) as f64))
        .collect()
}

#[test]
fn test_values_map_one_to_one() {
    let ctx = Context::new();
    let points = grid(&ctx, 100);
    let mut tree = ctx.new_strtree();
    for (i, point) in points.iter().enumerate() {
        tree.insert(point, format!("cell:{i}")).unwrap();
    }
    assert_eq!(tree.len(), 100);

    let mut seen = HashSet::new();
    tree.iterate(|value| assert!(seen.insert(value.clone()), "{value} reported twice"));
    assert_eq!(seen.len(), 100);

    for (i, point) in points.iter().enumerate().filter(|(i, _)| i % 2 == 0) {
        assert!(tree.remove(point, &format!("cell:{i}")));
    }
    let mut remaining = Vec::new();
    tree.iterate(|value| remaining.push(value.clone()));
    assert_eq!(remaining.len(), 50);
    assert!(remaining.iter().all(|v| {
        let n: usize = v["cell:".len()..].parse().unwrap();
        n % 2 == 1
    }));
}

#[test]
fn test_duplicate_insert_leaves_tree_unchanged() {
    let ctx = Context::new();
    let mut tree = ctx.new_strtree();
    let a = ctx.new_point_from_xy(0.0, 0.0);
    let b = ctx.new_point_from_xy(9.0, 9.0);
    tree.insert(&a, 7u32).unwrap();
    assert!(matches!(tree.insert(&b, 7u32), Err(Error::DuplicateValue)));
    assert_eq!(tree.len(), 1);

    // the rejected envelope was never indexed
    let window = ctx.new_geom_from_bounds(&Bounds::new(8.0, 8.0, 10.0, 10.0));
    let mut hits = 0;
    tree.query(&window, |_| hits += 1);
    assert_eq!(hits, 0);
}

#[test]
fn test_query_window() {
    let ctx = Context::new();
    let points = grid(&ctx, 100);
    let mut tree = ctx.new_strtree();
    for (i, point) in points.iter().enumerate() {
        tree.insert(point, i).unwrap();
    }
    let window = ctx.new_geom_from_bounds(&Bounds::new(1.5, 1.5, 3.5, 2.5));
    let mut hits = Vec::new();
    tree.query(&window, |i| hits.push(*i));
    hits.sort();
    assert_eq!(hits, vec![22, 23]);
}

#[test]
fn test_nearest_by_exact_distance() {
    let ctx = Context::new();
    let shapes: Vec<Geometry> = [
        "LINESTRING (0 10, 10 10)",
        "POLYGON ((20 0, 30 0, 30 30, 20 30, 20 0))",
        "POINT (12 4)",
    ]
    .iter()
    .map(|wkt| ctx.new_geom_from_wkt(wkt).unwrap())
    .collect();
    let mut tree = ctx.new_strtree();
    for (i, shape) in shapes.iter().enumerate() {
        tree.insert(shape, i).unwrap();
    }

    let query_point = ctx.new_point_from_xy(15.0, 5.0);
    let found = tree.nearest(&usize::MAX, &query_point, |_, candidate| {
        Some(query_point.distance(&shapes[*candidate]))
    });
    assert_eq!(found, Some(&2));

    let empty = ctx.new_strtree::<usize>();
    assert_eq!(empty.nearest(&0, &query_point, |_, _| Some(0.0)), None);
}

#[test]
fn test_reclaim_hook_reports_size() {
    let reclaimed = Arc::new(AtomicUsize::new(usize::MAX));
    let report = reclaimed.clone();
    let ctx = ContextBuilder::new()
        .on_strtree_reclaim(move |index| report.store(index.len, Ordering::SeqCst))
        .build()
        .unwrap();

    let mut tree = ctx.new_strtree();
    for (i, point) in grid(&ctx, 3).iter().enumerate() {
        tree.insert(point, i).unwrap();
    }
    drop(tree);
    assert_eq!(reclaimed.load(Ordering::SeqCst), 3);
    assert_eq!(ctx.engine_stats().strtrees, 0);
}
