use anyhow::{Context, Result};
use hillgrade::filename::coords_to_tile_name;
use hillgrade::Config;
use serde::Serialize;

#[derive(Serialize)]
struct ElevationResponse {
    x: f64,
    y: f64,
    elevation: Option<f64>,
    tile: String,
}

pub fn run(config: &Config, x: f64, y: f64, json: bool) -> Result<()> {
    let service = config.elevation_service();
    let elevation = service
        .sample_elevation(x, y)
        .context("Failed to get elevation")?;

    if json {
        let response = ElevationResponse {
            x,
            y,
            elevation,
            tile: coords_to_tile_name(x, y),
        };
        println!("{}", serde_json::to_string(&response)?);
    } else {
        match elevation {
            Some(elev) => println!("{:.2}", elev),
            None => println!("no data"),
        }
    }

    Ok(())
}
