//! End-to-end processing: tiles to coverage, roads to statistics, hills to store.

use std::fs::File;
use std::path::Path;

use hillgrade::geojson::{read_hills, read_processed_roads, write_hills, write_processed_roads};
use hillgrade::roads::summarize_network;
use hillgrade::{
    classify_hills, compute_network, load_roads, BoundingBox, Category, Config, HillError,
    HillStore, SearchFilters,
};
use serde_json::json;
use tempfile::TempDir;
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

const PIXEL: f64 = 10.0;
const NORTH: f64 = 6171000.0;

/// Terrain rising 6 % eastwards from x = 520000.
fn ramp(x: f64) -> f32 {
    (50.0 + 0.06 * (x - 520000.0)) as f32
}

/// Write a 1 km tile with its southwest corner at `(easting_km, 6170 km)`.
fn write_tile(dir: &Path, easting_km: u32) {
    let origin_x = easting_km as f64 * 1000.0;
    let size = 100u32;
    let mut data = Vec::with_capacity((size * size) as usize);
    for _row in 0..size {
        for col in 0..size {
            data.push(ramp(origin_x + (col as f64 + 0.5) * PIXEL));
        }
    }

    let path = dir.join(format!("DTM_1km_6170_{}.tif", easting_km));
    let mut tiff = TiffEncoder::new(File::create(path).unwrap()).unwrap();
    let mut image = tiff.new_image::<colortype::Gray32Float>(size, size).unwrap();
    image
        .encoder()
        .write_tag(Tag::ModelPixelScaleTag, &[PIXEL, PIXEL, 0.0][..])
        .unwrap();
    image
        .encoder()
        .write_tag(
            Tag::ModelTiepointTag,
            &[0.0, 0.0, 0.0, origin_x, NORTH, 0.0][..],
        )
        .unwrap();
    image
        .encoder()
        .write_tag(Tag::GeoKeyDirectoryTag, &[1u16, 1, 0, 1, 3072, 0, 1, 25832][..])
        .unwrap();
    image.encoder().write_tag(Tag::GdalNodata, "-9999").unwrap();
    image.write_data(&data).unwrap();
}

fn road(id: &str, name: Option<&str>, coords: &[(f64, f64)]) -> serde_json::Value {
    let coordinates: Vec<[f64; 2]> = coords.iter().map(|(x, y)| [*x, *y]).collect();
    json!({
        "type": "Feature",
        "geometry": {"type": "LineString", "coordinates": coordinates},
        "properties": {
            "road_id": id,
            "name": name,
            "highway": "tertiary",
            "region": "Syddanmark"
        }
    })
}

fn write_roads(path: &Path) {
    let collection = json!({
        "type": "FeatureCollection",
        "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::25832"}},
        "features": [
            // 500 m straight up the ramp
            road("ramp", Some("Kiddesvej"), &[(520005.0, 6170505.0), (520505.0, 6170505.0)]),
            // Flat: runs north-south across the ramp
            road("flat", Some("Nørregade"), &[(520205.0, 6170105.0), (520205.0, 6170605.0)]),
            // 400 m across the tile boundary
            road("boundary", None, &[(520905.0, 6170805.0), (521305.0, 6170805.0)]),
            // Outside the coverage
            road("outside", None, &[(600005.0, 6170505.0), (600505.0, 6170505.0)]),
            // Shorter than two sample intervals
            road("short", None, &[(520005.0, 6170305.0), (520020.0, 6170305.0)]),
            // Zero length
            road("point", None, &[(520005.0, 6170205.0), (520005.0, 6170205.0)]),
        ]
    });
    std::fs::write(path, collection.to_string()).unwrap();
}

fn setup() -> (TempDir, Config) {
    let dir = TempDir::new().unwrap();
    let tiles = dir.path().join("dhm");
    std::fs::create_dir(&tiles).unwrap();
    write_tile(&tiles, 520);
    write_tile(&tiles, 521);
    write_roads(&dir.path().join("roads.geojson"));

    let config = Config::default()
        .data_dir(dir.path())
        .db_path(dir.path().join("hills.db"));
    (dir, config)
}

#[test]
fn test_full_pipeline() {
    let (_dir, config) = setup();

    // Coverage is built from the tiles on first use
    let service = config.elevation_service();
    assert!(!config.coverage_path().exists());
    let info = service.coverage_info().unwrap();
    assert!(config.coverage_path().exists());
    assert_eq!(info.epsg, 25832);
    assert_eq!(info.width, 200);
    assert_eq!(info.height, 100);

    let elevation = service.sample_elevation(520005.0, 6170995.0).unwrap().unwrap();
    assert!((elevation - 50.3).abs() < 1e-4);
    assert_eq!(service.sample_elevation(600000.0, 6170500.0).unwrap(), None);

    // Gradients
    let mut roads = load_roads(&config.roads_path(), Some(info.epsg)).unwrap();
    assert_eq!(roads.len(), 6);
    let report = compute_network(&service, &mut roads, &config.gradient_options(), None).unwrap();
    assert_eq!(report.total, 6);
    assert_eq!(report.computed, 3);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.invalid, 1);

    let ramp_stats = roads[0].stats.as_ref().unwrap();
    assert!((ramp_stats.length_m - 500.0).abs() < 1e-9);
    assert!((ramp_stats.avg_gradient - 6.0).abs() < 1e-3);
    assert!((ramp_stats.max_gradient - 6.0).abs() < 1e-3);
    assert!((ramp_stats.elevation_gain - 30.0).abs() < 1e-2);
    assert_eq!(ramp_stats.profile.len(), 51);

    let flat_stats = roads[1].stats.as_ref().unwrap();
    assert!(flat_stats.avg_gradient.abs() < 1e-3);
    assert!(flat_stats.elevation_gain.abs() < 1e-3);

    let boundary_stats = roads[2].stats.as_ref().unwrap();
    assert!((boundary_stats.avg_gradient - 6.0).abs() < 1e-3);
    assert!((boundary_stats.elevation_gain - 24.0).abs() < 1e-2);

    assert!(roads[3].stats.is_none());
    assert!(roads[4].stats.is_none());
    assert_eq!(roads[4].length_m, 15.0);

    // Processed roads survive a file round trip
    write_processed_roads(&config.processed_roads_path(), &roads, Some(info.epsg)).unwrap();
    let reread = read_processed_roads(&config.processed_roads_path()).unwrap();
    let summary = summarize_network(&reread);
    assert_eq!(summary.total_roads, 6);
    assert_eq!(summary.roads_with_stats, 3);
    assert_eq!(summary.highway_types.get("tertiary"), Some(&6));

    // Hills
    let hills = classify_hills(&roads, &config.hill_criteria());
    assert_eq!(hills.len(), 2);
    assert_eq!(hills[0].name, "Kiddesvej");
    assert_eq!(hills[0].category, Category::Cat2);
    assert_eq!(hills[1].name, "Hill 2");
    assert_eq!(hills[1].road_id, "boundary");

    write_hills(&config.hills_path(), &hills, Some(info.epsg)).unwrap();
    let hills = read_hills(&config.hills_path()).unwrap();
    assert_eq!(hills.len(), 2);

    // Store
    let mut store = HillStore::open(config.database_path()).unwrap();
    assert_eq!(store.import_hills(&hills).unwrap(), 2);

    let near_boundary = SearchFilters {
        bbox: Some(BoundingBox::new(520950.0, 521050.0, 6170700.0, 6170900.0)),
        ..Default::default()
    };
    let found = store.search_hills(&near_boundary).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].road_id, "boundary");

    let detail = store.get_hill_details(found[0].id).unwrap().unwrap();
    assert_eq!(detail.elevation_profile.len(), 41);
    assert!((detail.hill.start_elevation - ramp(520905.0) as f64).abs() < 1e-2);

    let stats = store.get_statistics().unwrap();
    assert_eq!(stats.total_hills, 2);
    assert_eq!(stats.categories.get("2"), Some(&2));
    assert!((stats.total_length_m - 900.0).abs() < 1e-6);

    service.release();
    assert!(!service.is_open());
}

#[test]
fn test_crs_mismatch_is_reported() {
    let (dir, config) = setup();
    let result = load_roads(&dir.path().join("roads.geojson"), Some(4326));
    assert!(matches!(
        result,
        Err(HillError::CrsMismatch {
            expected: 4326,
            found: 25832
        })
    ));
    assert!(config.roads_path().exists());
}

#[test]
fn test_missing_tiles_make_data_unavailable() {
    let dir = TempDir::new().unwrap();
    let config = Config::default().data_dir(dir.path());
    let service = config.elevation_service();

    let result = service.sample_elevation(520005.0, 6170995.0);
    assert!(matches!(result, Err(HillError::DataUnavailable { .. })));
}
