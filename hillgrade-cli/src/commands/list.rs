use anyhow::{Context, Result};
use hillgrade::filename::tile_name_to_cell;
use hillgrade::tile::scan_tile_sources;
use hillgrade::{Config, TileSource};

pub fn run(config: &Config) -> Result<()> {
    let dir = config.dtm_dir_path();
    if !dir.exists() {
        anyhow::bail!("Tile directory does not exist: {}", dir.display());
    }

    let sources = scan_tile_sources(&dir).context("Failed to scan tile directory")?;
    if sources.is_empty() {
        println!("No DTM tiles found in: {}", dir.display());
        return Ok(());
    }

    println!(
        "{:<28} {:>8} {:>11} {:>6} {:>36} {:>5}",
        "TILE", "SOURCE", "SIZE", "EPSG", "EXTENT", "GRID"
    );
    println!("{}", "-".repeat(99));

    let mut archived = 0;
    let mut unreadable = 0;

    for source in &sources {
        let origin = match source {
            TileSource::File(_) => "file",
            TileSource::ArchiveEntry { .. } => {
                archived += 1;
                "zip"
            }
        };

        match source.read_geometry() {
            Ok(geometry) => {
                let extent = geometry.extent();
                // Whether the raster lies inside the cell its name claims
                let grid = match tile_name_to_cell(&source.name()) {
                    Some(cell) if cell.extent().contains(&extent) => "ok",
                    Some(_) => "off",
                    None => "-",
                };
                println!(
                    "{:<28} {:>8} {:>11} {:>6} {:>36} {:>5}",
                    source.name(),
                    origin,
                    format!("{}x{}", geometry.width, geometry.height),
                    geometry.epsg,
                    format!(
                        "{:.0},{:.0} to {:.0},{:.0}",
                        extent.min_x, extent.min_y, extent.max_x, extent.max_y
                    ),
                    grid
                );
            }
            Err(e) => {
                unreadable += 1;
                println!("{:<28} {:>8} {}", source.name(), origin, e);
            }
        }
    }

    // Summary
    println!();
    println!("Summary:");
    println!("  Total tiles: {}", sources.len());
    if archived > 0 {
        println!("  In archives: {}", archived);
    }
    if unreadable > 0 {
        println!("  Unreadable: {}", unreadable);
    }
    println!("  Tile directory: {}", dir.display());

    Ok(())
}
