//! DTM tile filename utilities.
//!
//! This module provides functions for converting between projected
//! coordinates and the tile names used by national terrain model downloads.
//!
//! # Filename Format
//!
//! Two conventions are recognised, both anchored at the tile's **southwest
//! corner** in a metric grid:
//!
//! - `DTM_1km_{northing_km}_{easting_km}.tif`: a single 1 km × 1 km tile,
//!   e.g. `DTM_1km_6170_520.tif` covers x 520000..521000, y 6170000..6171000.
//! - `DTM_{northing_10km}_{easting_10km}_TIF_UTM32-ETRS89.zip`: a 10 km block
//!   archive, e.g. `DTM_617_52_TIF_UTM32-ETRS89.zip`.
//!
//! Any file whose name starts with `DTM` and ends with `.tif`, `.tiff` or
//! `.zip` is treated as a tile source during discovery, even when its grid
//! cell cannot be parsed.

use crate::geometry::BoundingBox;

/// A grid cell decoded from a tile filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileCell {
    /// Edge length of the cell in kilometres.
    pub size_km: u32,
    /// Southwest corner northing, in units of `size_km`.
    pub northing: i64,
    /// Southwest corner easting, in units of `size_km`.
    pub easting: i64,
}

impl TileCell {
    /// The cell's extent in metres.
    pub fn extent(&self) -> BoundingBox {
        let size = self.size_km as f64 * 1000.0;
        BoundingBox {
            min_x: self.easting as f64 * size,
            max_x: (self.easting + 1) as f64 * size,
            min_y: self.northing as f64 * size,
            max_y: (self.northing + 1) as f64 * size,
        }
    }
}

/// Convert a projected coordinate to the name of the 1 km tile containing it.
///
/// # Examples
///
/// ```
/// use hillgrade::filename::coords_to_tile_name;
///
/// assert_eq!(coords_to_tile_name(520431.0, 6170999.9), "DTM_1km_6170_520.tif");
/// assert_eq!(coords_to_tile_name(521000.0, 6171000.0), "DTM_1km_6171_521.tif");
/// ```
pub fn coords_to_tile_name(x: f64, y: f64) -> String {
    let northing_km = (y / 1000.0).floor() as i64;
    let easting_km = (x / 1000.0).floor() as i64;
    format!("DTM_1km_{}_{}.tif", northing_km, easting_km)
}

/// Parse a tile filename to extract its grid cell.
///
/// # Arguments
///
/// * `filename` - The filename (with or without path, with or without extension)
///
/// # Returns
///
/// The decoded [`TileCell`], or `None` if the name does not follow either convention.
///
/// # Examples
///
/// ```
/// use hillgrade::filename::tile_name_to_cell;
///
/// let cell = tile_name_to_cell("DTM_1km_6170_520.tif").unwrap();
/// assert_eq!((cell.size_km, cell.northing, cell.easting), (1, 6170, 520));
///
/// let block = tile_name_to_cell("/data/DTM_617_52_TIF_UTM32-ETRS89.zip").unwrap();
/// assert_eq!((block.size_km, block.northing, block.easting), (10, 617, 52));
///
/// assert_eq!(tile_name_to_cell("invalid.tif"), None);
/// ```
pub fn tile_name_to_cell(filename: &str) -> Option<TileCell> {
    // Extract just the filename if a path is given
    let name = filename
        .rsplit('/')
        .next()
        .unwrap_or(filename)
        .rsplit('\\')
        .next()
        .unwrap_or(filename);

    let stem = name.split('.').next().unwrap_or(name);
    let mut tokens = stem.split('_');

    if !tokens.next()?.eq_ignore_ascii_case("DTM") {
        return None;
    }

    let first = tokens.next()?;
    let (size_km, northing) = match first.to_ascii_lowercase().strip_suffix("km") {
        Some(size) => (size.parse().ok()?, tokens.next()?),
        None => (10, first),
    };
    let easting = tokens.next()?;

    if size_km == 0 {
        return None;
    }

    Some(TileCell {
        size_km,
        northing: northing.parse().ok()?,
        easting: easting.parse().ok()?,
    })
}

/// Check whether a filename looks like a DTM tile source.
///
/// # Examples
///
/// ```
/// use hillgrade::filename::is_tile_filename;
///
/// assert!(is_tile_filename("DTM_1km_6170_520.tif"));
/// assert!(is_tile_filename("DTM_617_52_TIF_UTM32-ETRS89.zip"));
/// assert!(!is_tile_filename("merged_dtm.cov"));
/// assert!(!is_tile_filename("DSM_1km_6170_520.tif"));
/// ```
pub fn is_tile_filename(filename: &str) -> bool {
    is_tiff_filename(filename) || (has_extension(filename, "zip") && starts_with_dtm(filename))
}

/// Check whether a filename is a DTM GeoTIFF (not an archive).
pub fn is_tiff_filename(filename: &str) -> bool {
    starts_with_dtm(filename) && (has_extension(filename, "tif") || has_extension(filename, "tiff"))
}

fn starts_with_dtm(filename: &str) -> bool {
    filename
        .get(..3)
        .map(|prefix| prefix.eq_ignore_ascii_case("DTM"))
        .unwrap_or(false)
}

fn has_extension(filename: &str, extension: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coords_to_tile_name() {
        assert_eq!(coords_to_tile_name(520000.0, 6170000.0), "DTM_1km_6170_520.tif");
        assert_eq!(coords_to_tile_name(520999.9, 6170999.9), "DTM_1km_6170_520.tif");
        assert_eq!(coords_to_tile_name(441234.5, 6049876.0), "DTM_1km_6049_441.tif");
    }

    #[test]
    fn test_parse_one_km_name() {
        let cell = tile_name_to_cell("DTM_1km_6170_520.tif").unwrap();
        assert_eq!(cell.size_km, 1);
        assert_eq!(cell.northing, 6170);
        assert_eq!(cell.easting, 520);
        assert_eq!(cell.extent(), BoundingBox::new(520000.0, 521000.0, 6170000.0, 6171000.0));
    }

    #[test]
    fn test_parse_block_name() {
        let cell = tile_name_to_cell("DTM_617_52_TIF_UTM32-ETRS89.zip").unwrap();
        assert_eq!(cell.size_km, 10);
        assert_eq!(
            cell.extent(),
            BoundingBox::new(520000.0, 530000.0, 6170000.0, 6180000.0)
        );
    }

    #[test]
    fn test_parse_with_path() {
        assert_eq!(
            tile_name_to_cell("/data/dhm/DTM_1km_6170_520.tif").map(|c| c.easting),
            Some(520)
        );
        assert_eq!(
            tile_name_to_cell("C:\\data\\DTM_1km_6170_521.tif").map(|c| c.easting),
            Some(521)
        );
    }

    #[test]
    fn test_parse_invalid() {
        assert_eq!(tile_name_to_cell("invalid"), None);
        assert_eq!(tile_name_to_cell("DTM_1km_6170.tif"), None); // Missing easting
        assert_eq!(tile_name_to_cell("DSM_1km_6170_520.tif"), None); // Wrong model
        assert_eq!(tile_name_to_cell("DTM_1km_abc_520.tif"), None); // Non-numeric
        assert_eq!(tile_name_to_cell("DTM_0km_6170_520.tif"), None); // Zero size
    }

    #[test]
    fn test_roundtrip() {
        let coords = [(520431.0, 6170999.9), (441000.0, 6049000.0), (899999.0, 6399999.0)];

        for (x, y) in coords {
            let name = coords_to_tile_name(x, y);
            let cell = tile_name_to_cell(&name).unwrap();
            assert!(cell.extent().contains_point(x, y));
        }
    }

    #[test]
    fn test_is_tile_filename() {
        assert!(is_tile_filename("DTM_1km_6170_520.tif"));
        assert!(is_tile_filename("dtm_1km_6170_520.TIF"));
        assert!(is_tile_filename("DTM_1km_6170_520.tiff"));
        assert!(is_tile_filename("DTM_617_52_TIF_UTM32-ETRS89.zip"));
        assert!(!is_tile_filename("roads.geojson"));
        assert!(!is_tile_filename("merged_dtm.cov"));
        assert!(!is_tile_filename("other.zip"));

        assert!(is_tiff_filename("DTM_1km_6170_520.tif"));
        assert!(!is_tiff_filename("DTM_617_52_TIF_UTM32-ETRS89.zip"));
    }
}
