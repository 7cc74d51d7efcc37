//! Tile merging into a single coverage.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::coverage::write_coverage;
use crate::error::{HillError, Result};
use crate::geometry::BoundingBox;
use crate::tile::{scan_tile_sources, RasterGeometry, TileSource, DEFAULT_NODATA};

/// Relative tolerance when comparing pixel sizes between tiles.
const PIXEL_SIZE_TOLERANCE: f64 = 1e-9;

/// Merge every tile found in `tile_dir` into one coverage file at `output`.
///
/// If `output` already exists it is returned as-is without reading any tile,
/// so repeated calls are cheap and leave the cached coverage untouched.
/// Delete the file to force a rebuild.
///
/// Tiles are merged in ascending name order. Where tiles overlap, the later
/// tile's valid pixels overwrite earlier ones; no-data pixels never overwrite.
///
/// # Errors
///
/// - [`HillError::InputNotFound`] if `tile_dir` is missing or holds no tiles
/// - [`HillError::IncompatibleTiles`] if tiles differ in pixel size or CRS
/// - [`HillError::InvalidTile`] if a tile cannot be decoded
pub fn build_coverage(tile_dir: &Path, output: &Path) -> Result<PathBuf> {
    if output.exists() {
        info!(path = %output.display(), "Using existing coverage");
        return Ok(output.to_path_buf());
    }

    let sources = scan_tile_sources(tile_dir)?;
    if sources.is_empty() {
        return Err(HillError::InputNotFound {
            path: tile_dir.to_path_buf(),
        });
    }

    info!(tiles = sources.len(), dir = %tile_dir.display(), "Merging tiles");

    let headers = sources
        .iter()
        .map(|source| source.read_geometry())
        .collect::<Result<Vec<_>>>()?;
    let target = merged_geometry(&sources, &headers)?;

    debug!(
        width = target.width,
        height = target.height,
        epsg = target.epsg,
        "Coverage grid"
    );

    let mut data = vec![target.nodata; target.width as usize * target.height as usize];
    for source in &sources {
        let tile = source.load()?;
        let pasted = paste_tile(&target, &mut data, &tile.geometry, &tile.data);
        debug!(tile = %tile.name, pixels = pasted, "Merged tile");
    }

    write_coverage(output, &target, &data)?;
    info!(path = %output.display(), "Coverage written");

    Ok(output.to_path_buf())
}

/// Compute the grid covering the union of all tile extents.
fn merged_geometry(sources: &[TileSource], headers: &[RasterGeometry]) -> Result<RasterGeometry> {
    let (first_source, first) = match (sources.first(), headers.first()) {
        (Some(source), Some(header)) => (source, header),
        _ => {
            return Err(HillError::DataUnavailable {
                reason: "no tiles to merge".to_string(),
            })
        }
    };

    let mut extent = first.extent();
    for (source, header) in sources.iter().zip(headers).skip(1) {
        if !same_size(header.pixel_width, first.pixel_width)
            || !same_size(header.pixel_height, first.pixel_height)
        {
            return Err(HillError::IncompatibleTiles {
                reason: format!(
                    "{} has pixel size {}x{}, {} has {}x{}",
                    source.name(),
                    header.pixel_width,
                    header.pixel_height,
                    first_source.name(),
                    first.pixel_width,
                    first.pixel_height
                ),
            });
        }
        if header.epsg != first.epsg {
            return Err(HillError::IncompatibleTiles {
                reason: format!(
                    "{} is EPSG:{}, {} is EPSG:{}",
                    source.name(),
                    header.epsg,
                    first_source.name(),
                    first.epsg
                ),
            });
        }
        extent = extent.union(&header.extent());
    }

    Ok(grid_for_extent(&extent, first))
}

fn grid_for_extent(extent: &BoundingBox, template: &RasterGeometry) -> RasterGeometry {
    let width = (extent.width() / template.pixel_width).round().max(1.0) as u32;
    let height = (extent.height() / template.pixel_height).round().max(1.0) as u32;
    let nodata = if template.nodata.is_nan() {
        DEFAULT_NODATA
    } else {
        template.nodata
    };

    RasterGeometry {
        width,
        height,
        origin_x: extent.min_x,
        origin_y: extent.max_y,
        pixel_width: template.pixel_width,
        pixel_height: template.pixel_height,
        nodata,
        epsg: template.epsg,
    }
}

fn same_size(a: f64, b: f64) -> bool {
    (a - b).abs() <= PIXEL_SIZE_TOLERANCE * a.abs().max(b.abs())
}

/// Copy a tile's valid pixels into the target grid. Returns the number of pixels written.
fn paste_tile(
    target: &RasterGeometry,
    data: &mut [f32],
    tile: &RasterGeometry,
    tile_data: &[f32],
) -> usize {
    let col_offset = ((tile.origin_x - target.origin_x) / target.pixel_width).round() as i64;
    let row_offset = ((target.origin_y - tile.origin_y) / target.pixel_height).round() as i64;

    let mut pasted = 0;
    for row in 0..tile.height as i64 {
        let target_row = row + row_offset;
        if target_row < 0 || target_row >= target.height as i64 {
            continue;
        }
        for col in 0..tile.width as i64 {
            let target_col = col + col_offset;
            if target_col < 0 || target_col >= target.width as i64 {
                continue;
            }

            let value = tile_data[(row * tile.width as i64 + col) as usize];
            if tile.is_nodata(value) {
                continue;
            }

            data[(target_row * target.width as i64 + target_col) as usize] = value;
            pasted += 1;
        }
    }
    pasted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::Coverage;
    use crate::tile::test_support::write_geotiff;
    use tempfile::TempDir;

    #[test]
    fn test_merge_adjacent_tiles() {
        let dir = TempDir::new().unwrap();
        write_geotiff(
            &dir.path().join("DTM_1km_0_0.tif"),
            2,
            2,
            (0.0, 20.0),
            10.0,
            &[1.0, 2.0, 3.0, 4.0],
        );
        write_geotiff(
            &dir.path().join("DTM_1km_0_1.tif"),
            2,
            2,
            (20.0, 20.0),
            10.0,
            &[5.0, 6.0, 7.0, 8.0],
        );

        let output = dir.path().join("merged.cov");
        let path = build_coverage(dir.path(), &output).unwrap();
        let coverage = Coverage::open(path).unwrap();

        assert_eq!(coverage.geometry().width, 4);
        assert_eq!(coverage.geometry().height, 2);
        assert_eq!(coverage.epsg(), 25832);
        assert_eq!(coverage.sample(5.0, 15.0), Some(1.0));
        assert_eq!(coverage.sample(25.0, 15.0), Some(5.0));
        assert_eq!(coverage.sample(35.0, 5.0), Some(8.0));
    }

    #[test]
    fn test_gap_between_tiles_is_nodata() {
        let dir = TempDir::new().unwrap();
        write_geotiff(&dir.path().join("DTM_a.tif"), 1, 1, (0.0, 10.0), 10.0, &[1.0]);
        write_geotiff(&dir.path().join("DTM_b.tif"), 1, 1, (20.0, 10.0), 10.0, &[3.0]);

        let output = dir.path().join("merged.cov");
        let coverage = Coverage::open(build_coverage(dir.path(), &output).unwrap()).unwrap();

        assert_eq!(coverage.geometry().width, 3);
        assert_eq!(coverage.sample(15.0, 5.0), None);
        assert_eq!(coverage.sample(25.0, 5.0), Some(3.0));
    }

    #[test]
    fn test_overlap_last_tile_wins_by_name() {
        let dir = TempDir::new().unwrap();
        // Same footprint; "DTM_b" sorts after "DTM_a" and wins
        write_geotiff(&dir.path().join("DTM_b.tif"), 2, 1, (0.0, 10.0), 10.0, &[20.0, -9999.0]);
        write_geotiff(&dir.path().join("DTM_a.tif"), 2, 1, (0.0, 10.0), 10.0, &[10.0, 11.0]);

        let output = dir.path().join("merged.cov");
        let coverage = Coverage::open(build_coverage(dir.path(), &output).unwrap()).unwrap();

        assert_eq!(coverage.sample(5.0, 5.0), Some(20.0));
        // No-data in the later tile does not erase the earlier value
        assert_eq!(coverage.sample(15.0, 5.0), Some(11.0));
    }

    #[test]
    fn test_existing_coverage_is_reused() {
        let dir = TempDir::new().unwrap();
        write_geotiff(&dir.path().join("DTM_a.tif"), 1, 1, (0.0, 10.0), 10.0, &[1.0]);

        let output = dir.path().join("merged.cov");
        build_coverage(dir.path(), &output).unwrap();
        let first = std::fs::read(&output).unwrap();

        // Changing the tiles must not trigger a re-merge
        write_geotiff(&dir.path().join("DTM_a.tif"), 1, 1, (0.0, 10.0), 10.0, &[99.0]);
        let path = build_coverage(dir.path(), &output).unwrap();

        assert_eq!(path, output);
        assert_eq!(std::fs::read(&output).unwrap(), first);
    }

    #[test]
    fn test_no_tiles() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("readme.txt"), "nothing here").unwrap();

        let result = build_coverage(dir.path(), &dir.path().join("merged.cov"));
        assert!(matches!(result, Err(HillError::InputNotFound { .. })));
    }

    #[test]
    fn test_missing_directory() {
        let dir = TempDir::new().unwrap();
        let result = build_coverage(&dir.path().join("dhm"), &dir.path().join("merged.cov"));
        assert!(matches!(result, Err(HillError::InputNotFound { .. })));
    }

    #[test]
    fn test_mixed_pixel_sizes_rejected() {
        let dir = TempDir::new().unwrap();
        write_geotiff(&dir.path().join("DTM_a.tif"), 1, 1, (0.0, 10.0), 10.0, &[1.0]);
        write_geotiff(&dir.path().join("DTM_b.tif"), 1, 1, (10.0, 10.0), 5.0, &[1.0]);

        let output = dir.path().join("merged.cov");
        let result = build_coverage(dir.path(), &output);
        assert!(matches!(result, Err(HillError::IncompatibleTiles { .. })));
        assert!(!output.exists());
    }
}
