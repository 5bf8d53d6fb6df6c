use geoctx::{BufCapStyle, Context, GeometryTypeId};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("geoctx - Getting Started Example");
    println!("================================");

    let ctx = Context::new();
    println!("✓ Created context {}", ctx.id());

    // Parse and inspect
    let park = ctx.new_geom_from_wkt(
        "POLYGON ((0 0, 100 0, 100 80, 0 80, 0 0), (40 30, 60 30, 60 50, 40 50, 40 30))",
    )?;
    println!(
        "✓ Parsed a {} with {} hole(s), area {:.0}",
        park.type_name(),
        park.num_interior_rings(),
        park.area()
    );

    // Views borrow from their parent
    let pond = park.interior_ring(0);
    println!("✓ Pond outline: {}", pond);

    // Build geometries from coordinates
    let trail = ctx.new_line_string(&[[-10.0, 40.0], [110.0, 40.0]])?;
    let on_land = park.intersection(&trail)?;
    println!("✓ Trail length inside the park: {:.0}", on_land.length());

    // Buffers with custom parameters
    let mut params = ctx.new_buffer_params();
    params.set_end_cap_style(BufCapStyle::Flat);
    let corridor = trail.buffer_with_params(&params, 2.0)?;
    println!("✓ Flat-capped corridor area: {:.0}", corridor.area());

    // Prepared geometry for repeated tests
    let prepared = park.prepare();
    let benches: Vec<_> = ctx.new_points(&[[10.0, 10.0], [50.0, 40.0], [150.0, 10.0]]);
    let inside = benches.iter().filter(|b| prepared.contains(b)).count();
    println!("✓ {} of {} benches are on park land", inside, benches.len());

    // Collections and the spatial index
    let collection = ctx.new_collection(GeometryTypeId::MultiPoint, benches)?;
    let mut tree = ctx.new_strtree();
    for i in 0..collection.num_geometries() {
        tree.insert(&collection.geometry(i), i)?;
    }
    let mut hits = Vec::new();
    tree.query(&park, |i| hits.push(*i));
    println!("✓ Index query over the park envelope found {:?}", hits);

    // Formats
    println!("✓ WKB size: {} bytes", park.to_wkb().len());
    #[cfg(feature = "geojson")]
    println!("✓ GeoJSON: {}", trail.to_geojson(None));
    #[cfg(feature = "geojson")]
    {
        let mut feature = geoctx::Feature::new(park.clone());
        feature.set_property("name", "Riverside");
        let features = ctx.new_features_from_geojson(&feature.to_geojson(None)?)?;
        println!("✓ Feature read back with {:?}", features.features[0].property("name"));
    }

    let stats = ctx.engine_stats();
    println!("✓ Live native geometries: {}", stats.geometries);

    println!("\n🎉 Getting started example completed successfully!");
    Ok(())
}
