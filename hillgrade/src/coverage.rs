//! Merged elevation coverage file.
//!
//! A coverage is a single raster covering the union of all input tiles,
//! stored in a flat little-endian format so readers can memory-map it and
//! look up pixels without decoding:
//!
//! | Offset | Size | Field                          |
//! |--------|------|--------------------------------|
//! | 0      | 8    | magic `HGCOV001`               |
//! | 8      | 4    | width (u32)                    |
//! | 12     | 4    | height (u32)                   |
//! | 16     | 8    | origin x, top-left (f64)       |
//! | 24     | 8    | origin y, top-left (f64)       |
//! | 32     | 8    | pixel width (f64)              |
//! | 40     | 8    | pixel height (f64)             |
//! | 48     | 4    | no-data value (f32)            |
//! | 52     | 4    | EPSG code (u32, 0 = unknown)   |
//! | 56     | ...  | `width × height` f32 samples   |
//!
//! Samples are row-major, north row first.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use serde::Serialize;

use crate::error::{HillError, Result};
use crate::geometry::BoundingBox;
use crate::tile::RasterGeometry;

/// File magic identifying a coverage file and its format version.
pub const COVERAGE_MAGIC: &[u8; 8] = b"HGCOV001";

/// Size of the fixed header in bytes.
pub const HEADER_SIZE: usize = 56;

/// Something elevation can be sampled from at projected coordinates.
///
/// Implemented by [`Coverage`]; gradient computation is generic over it so
/// callers can plug in other surfaces.
pub trait ElevationSource {
    /// Elevation at `(x, y)`, or `None` outside the surface or on no-data.
    fn sample_elevation(&self, x: f64, y: f64) -> Option<f64>;
}

impl<T: ElevationSource + ?Sized> ElevationSource for &T {
    fn sample_elevation(&self, x: f64, y: f64) -> Option<f64> {
        (**self).sample_elevation(x, y)
    }
}

impl<T: ElevationSource + ?Sized> ElevationSource for std::sync::Arc<T> {
    fn sample_elevation(&self, x: f64, y: f64) -> Option<f64> {
        (**self).sample_elevation(x, y)
    }
}

/// Summary of an open coverage.
#[derive(Debug, Clone, Serialize)]
pub struct CoverageInfo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub pixel_width: f64,
    pub pixel_height: f64,
    pub nodata: f32,
    pub epsg: u32,
    pub extent: BoundingBox,
}

/// A memory-mapped coverage file.
pub struct Coverage {
    path: PathBuf,
    geometry: RasterGeometry,
    data: Mmap,
}

impl std::fmt::Debug for Coverage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coverage")
            .field("path", &self.path)
            .field("geometry", &self.geometry)
            .finish()
    }
}

impl Coverage {
    /// Open and memory-map a coverage file.
    ///
    /// # Errors
    ///
    /// Returns [`HillError::InputNotFound`] if the file does not exist and
    /// [`HillError::InvalidCoverage`] if the header is unknown or the file is
    /// shorter than the header declares.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(HillError::InputNotFound {
                path: path.to_path_buf(),
            });
        }

        let file = File::open(path)?;

        // SAFETY: Memory mapping is safe as long as the file is not modified
        // while mapped. Coverages are written to a temporary file and renamed
        // into place, so an existing coverage is never rewritten in place.
        let mmap = unsafe { Mmap::map(&file)? };

        let geometry = decode_header(&mmap).map_err(|reason| HillError::InvalidCoverage {
            path: path.to_path_buf(),
            reason,
        })?;

        let expected = HEADER_SIZE + geometry.width as usize * geometry.height as usize * 4;
        if mmap.len() < expected {
            return Err(HillError::InvalidCoverage {
                path: path.to_path_buf(),
                reason: format!("expected {} bytes, found {}", expected, mmap.len()),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            geometry,
            data: mmap,
        })
    }

    /// Elevation at a projected coordinate.
    ///
    /// Returns `None` when the point lies outside the raster or the pixel is no-data.
    pub fn sample(&self, x: f64, y: f64) -> Option<f32> {
        let (row, col) = self.geometry.pixel_index(x, y)?;
        let offset = HEADER_SIZE + (row * self.geometry.width as usize + col) * 4;
        let bytes = self.data.get(offset..offset + 4)?;
        let value = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        (!self.geometry.is_nodata(value)).then_some(value)
    }

    pub fn geometry(&self) -> &RasterGeometry {
        &self.geometry
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn epsg(&self) -> u32 {
        self.geometry.epsg
    }

    pub fn extent(&self) -> BoundingBox {
        self.geometry.extent()
    }

    pub fn info(&self) -> CoverageInfo {
        CoverageInfo {
            path: self.path.clone(),
            width: self.geometry.width,
            height: self.geometry.height,
            pixel_width: self.geometry.pixel_width,
            pixel_height: self.geometry.pixel_height,
            nodata: self.geometry.nodata,
            epsg: self.geometry.epsg,
            extent: self.geometry.extent(),
        }
    }
}

impl ElevationSource for Coverage {
    fn sample_elevation(&self, x: f64, y: f64) -> Option<f64> {
        self.sample(x, y).map(f64::from)
    }
}

/// Write a coverage file from a raster geometry and its samples.
///
/// The file is written next to `path` under a temporary name and renamed into
/// place once complete, so readers never observe a partial coverage.
pub fn write_coverage(path: &Path, geometry: &RasterGeometry, data: &[f32]) -> Result<()> {
    let expected = geometry.width as usize * geometry.height as usize;
    if data.len() != expected {
        return Err(HillError::InvalidCoverage {
            path: path.to_path_buf(),
            reason: format!("expected {} samples, got {}", expected, data.len()),
        });
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("cov.tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        writer.write_all(&encode_header(geometry))?;
        for value in data {
            writer.write_all(&value.to_le_bytes())?;
        }
        writer.flush()?;
    }
    std::fs::rename(&tmp_path, path)?;

    Ok(())
}

fn encode_header(geometry: &RasterGeometry) -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[0..8].copy_from_slice(COVERAGE_MAGIC);
    header[8..12].copy_from_slice(&geometry.width.to_le_bytes());
    header[12..16].copy_from_slice(&geometry.height.to_le_bytes());
    header[16..24].copy_from_slice(&geometry.origin_x.to_le_bytes());
    header[24..32].copy_from_slice(&geometry.origin_y.to_le_bytes());
    header[32..40].copy_from_slice(&geometry.pixel_width.to_le_bytes());
    header[40..48].copy_from_slice(&geometry.pixel_height.to_le_bytes());
    header[48..52].copy_from_slice(&geometry.nodata.to_le_bytes());
    header[52..56].copy_from_slice(&geometry.epsg.to_le_bytes());
    header
}

fn decode_header(bytes: &[u8]) -> std::result::Result<RasterGeometry, String> {
    if bytes.len() < HEADER_SIZE {
        return Err(format!("file is {} bytes, shorter than the header", bytes.len()));
    }
    if &bytes[0..8] != COVERAGE_MAGIC {
        return Err("unknown file magic".to_string());
    }

    let u32_at = |o: usize| u32::from_le_bytes([bytes[o], bytes[o + 1], bytes[o + 2], bytes[o + 3]]);
    let f64_at = |o: usize| {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes[o..o + 8]);
        f64::from_le_bytes(buf)
    };

    let geometry = RasterGeometry {
        width: u32_at(8),
        height: u32_at(12),
        origin_x: f64_at(16),
        origin_y: f64_at(24),
        pixel_width: f64_at(32),
        pixel_height: f64_at(40),
        nodata: f32::from_bits(u32_at(48)),
        epsg: u32_at(52),
    };

    if !(geometry.pixel_width > 0.0 && geometry.pixel_height > 0.0) {
        return Err("non-positive pixel size".to_string());
    }

    Ok(geometry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn geometry_3x2() -> RasterGeometry {
        RasterGeometry {
            width: 3,
            height: 2,
            origin_x: 1000.0,
            origin_y: 2000.0,
            pixel_width: 10.0,
            pixel_height: 10.0,
            nodata: -9999.0,
            epsg: 25832,
        }
    }

    fn create_test_coverage(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("merged_dtm.cov");
        let data = [1.0, 2.0, 3.0, 4.0, -9999.0, f32::NAN];
        write_coverage(&path, &geometry_3x2(), &data).unwrap();
        path
    }

    #[test]
    fn test_open_and_sample() {
        let dir = TempDir::new().unwrap();
        let coverage = Coverage::open(create_test_coverage(&dir)).unwrap();

        assert_eq!(coverage.geometry(), &geometry_3x2());
        assert_eq!(coverage.sample(1005.0, 1995.0), Some(1.0));
        assert_eq!(coverage.sample(1025.0, 1995.0), Some(3.0));
        assert_eq!(coverage.sample(1005.0, 1985.0), Some(4.0));
    }

    #[test]
    fn test_nodata_and_nan_are_none() {
        let dir = TempDir::new().unwrap();
        let coverage = Coverage::open(create_test_coverage(&dir)).unwrap();

        assert_eq!(coverage.sample(1015.0, 1985.0), None);
        assert_eq!(coverage.sample(1025.0, 1985.0), None);
    }

    #[test]
    fn test_outside_extent_is_none() {
        let dir = TempDir::new().unwrap();
        let coverage = Coverage::open(create_test_coverage(&dir)).unwrap();

        assert_eq!(coverage.sample(999.0, 1995.0), None);
        assert_eq!(coverage.sample(1030.0, 1995.0), None);
        assert_eq!(coverage.sample(1005.0, 2000.5), None);
        assert_eq!(coverage.sample(1005.0, 1980.0), None);
        assert_eq!(coverage.sample(f64::NAN, 1995.0), None);
    }

    #[test]
    fn test_elevation_source_impl() {
        let dir = TempDir::new().unwrap();
        let coverage = Coverage::open(create_test_coverage(&dir)).unwrap();
        let source: &dyn ElevationSource = &coverage;

        assert_eq!(source.sample_elevation(1015.0, 1995.0), Some(2.0));
    }

    #[test]
    fn test_info() {
        let dir = TempDir::new().unwrap();
        let coverage = Coverage::open(create_test_coverage(&dir)).unwrap();
        let info = coverage.info();

        assert_eq!(info.width, 3);
        assert_eq!(info.epsg, 25832);
        assert_eq!(info.extent, BoundingBox::new(1000.0, 1030.0, 1980.0, 2000.0));
    }

    #[test]
    fn test_open_missing() {
        let dir = TempDir::new().unwrap();
        let result = Coverage::open(dir.path().join("missing.cov"));
        assert!(matches!(result, Err(HillError::InputNotFound { .. })));
    }

    #[test]
    fn test_open_bad_magic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.cov");
        std::fs::write(&path, vec![0u8; 128]).unwrap();

        let result = Coverage::open(&path);
        assert!(matches!(result, Err(HillError::InvalidCoverage { .. })));
    }

    #[test]
    fn test_open_truncated() {
        let dir = TempDir::new().unwrap();
        let path = create_test_coverage(&dir);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();

        let result = Coverage::open(&path);
        assert!(matches!(result, Err(HillError::InvalidCoverage { .. })));
    }

    #[test]
    fn test_write_rejects_wrong_sample_count() {
        let dir = TempDir::new().unwrap();
        let result = write_coverage(&dir.path().join("x.cov"), &geometry_3x2(), &[1.0]);
        assert!(result.is_err());
        assert!(!dir.path().join("x.cov").exists());
    }
}
