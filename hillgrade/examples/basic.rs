//! Basic example demonstrating hillgrade library usage.
//!
//! Run with: cargo run --example basic -- /path/to/data
//!
//! The data directory must contain a `dhm/` folder of DTM tiles and a
//! `roads.geojson` file in the tiles' projection.

use hillgrade::{classify_hills, compute_network, load_roads, Config, HillError};
use std::env;

fn main() -> Result<(), HillError> {
    // Get data directory from command line
    let data_dir = env::args().nth(1).unwrap_or_else(|| {
        eprintln!("Usage: cargo run --example basic -- /path/to/data");
        std::process::exit(1);
    });

    let config = Config::default().data_dir(&data_dir);
    let service = config.elevation_service();

    // Builds merged_dtm.cov from the tiles on first use
    let info = service.coverage_info()?;
    println!(
        "Coverage: {}x{} pixels, EPSG:{}",
        info.width, info.height, info.epsg
    );

    let mut roads = load_roads(&config.roads_path(), Some(info.epsg))?;
    let report = compute_network(&service, &mut roads, &config.gradient_options(), None)?;
    println!(
        "Roads: {} computed, {} skipped, {} invalid",
        report.computed, report.skipped, report.invalid
    );

    let hills = classify_hills(&roads, &config.hill_criteria());
    println!("\nSteepest hills:");
    println!("{:-<50}", "");

    let mut steepest: Vec<_> = hills.iter().collect();
    steepest.sort_by(|a, b| b.avg_gradient.total_cmp(&a.avg_gradient));
    for hill in steepest.iter().take(10) {
        println!(
            "[{}] {}: {:.1}% over {:.0}m (+{:.0}m)",
            hill.category, hill.name, hill.avg_gradient, hill.length_m, hill.elevation_gain
        );
    }

    Ok(())
}
