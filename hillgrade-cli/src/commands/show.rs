use anyhow::{bail, Result};
use hillgrade::Config;

pub fn run(config: &Config, id: i64, json: bool) -> Result<()> {
    let store = super::open_store(config)?;

    let Some(detail) = store.get_hill_details(id)? else {
        bail!("Hill {} not found", id);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    let hill = &detail.hill;
    println!("Hill {}: {}", hill.id, hill.name);
    println!("  Road:            {}", hill.road_id);
    println!("  Category:        {}", hill.category);
    println!("  Region:          {}", hill.region);
    println!("  Length:          {:.0} m", hill.length_m);
    println!("  Avg gradient:    {:.1}%", hill.avg_gradient);
    println!("  Max gradient:    {:.1}%", hill.max_gradient);
    println!("  Elevation gain:  {:.1} m", hill.elevation_gain);
    println!(
        "  Elevation:       {:.1} m -> {:.1} m",
        hill.start_elevation, hill.end_elevation
    );
    println!(
        "  Bounds:          {:.1}, {:.1} to {:.1}, {:.1}",
        hill.bbox.min_x, hill.bbox.min_y, hill.bbox.max_x, hill.bbox.max_y
    );

    println!();
    println!("{:>10} {:>10}", "DISTANCE", "ELEVATION");
    for point in &detail.elevation_profile {
        println!("{:>9.1}m {:>9.1}m", point.distance, point.elevation);
    }

    Ok(())
}
