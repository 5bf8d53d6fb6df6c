use geoctx::{ContextBuilder, Geometry};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("geoctx - Shared Context Example");
    println!("===============================");

    let reclaimed = Arc::new(AtomicUsize::new(0));
    let counter = reclaimed.clone();
    let ctx = ContextBuilder::new()
        .on_geometry_reclaim(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        })
        .on_finish(|stats| println!("✓ Engine finished, leaked handles: {:?}", stats))
        .build()?;

    let start = Instant::now();
    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let ctx = ctx.clone();
            thread::spawn(move || -> geoctx::Result<Vec<Geometry>> {
                (0..250)
                    .map(|i| ctx.new_point_from_xy(worker as f64 * 10.0, i as f64).buffer(0.5))
                    .collect()
            })
        })
        .collect();

    let mut zones = Vec::new();
    for worker in workers {
        let produced = worker
            .join()
            .map_err(|_| "worker panicked")??;
        zones.extend(produced);
    }
    println!(
        "✓ {} buffers built on 4 threads in {:?}",
        zones.len(),
        start.elapsed()
    );

    // The context handle can go; the engine stays alive for the geometries.
    drop(ctx);
    let total: f64 = zones.iter().map(Geometry::area).sum();
    println!("✓ Total buffered area: {:.1}", total);

    drop(zones);
    println!(
        "✓ Geometries reclaimed through the hook: {}",
        reclaimed.load(Ordering::Relaxed)
    );
    Ok(())
}
