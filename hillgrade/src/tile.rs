//! GeoTIFF tile parsing.
//!
//! This module provides [`DemTile`] for decoding single-band elevation
//! GeoTIFFs and [`TileSource`] for locating them on disk, either as loose
//! `.tif` files or as entries inside `.zip` download archives.

use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};

use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;

use crate::error::{HillError, Result};
use crate::filename::{is_tiff_filename, is_tile_filename};
use crate::geometry::BoundingBox;

/// No-data value assumed when a tile carries no `GDAL_NODATA` tag.
pub const DEFAULT_NODATA: f32 = -9999.0;

/// GeoKey for a projected CRS code.
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;

/// GeoKey for a geographic CRS code.
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;

/// Georeferencing of a raster: where its pixels sit in the working projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterGeometry {
    /// Number of columns.
    pub width: u32,
    /// Number of rows.
    pub height: u32,
    /// X coordinate of the top-left corner of the top-left pixel.
    pub origin_x: f64,
    /// Y coordinate of the top-left corner of the top-left pixel.
    pub origin_y: f64,
    /// Pixel width in CRS units.
    pub pixel_width: f64,
    /// Pixel height in CRS units (positive, rows run north to south).
    pub pixel_height: f64,
    /// No-data sentinel.
    pub nodata: f32,
    /// EPSG code of the CRS, or 0 when unknown.
    pub epsg: u32,
}

impl RasterGeometry {
    /// The raster's extent.
    pub fn extent(&self) -> BoundingBox {
        BoundingBox {
            min_x: self.origin_x,
            max_x: self.origin_x + self.width as f64 * self.pixel_width,
            min_y: self.origin_y - self.height as f64 * self.pixel_height,
            max_y: self.origin_y,
        }
    }

    /// Row and column of the pixel containing `(x, y)`, or `None` outside the raster.
    pub fn pixel_index(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let col = ((x - self.origin_x) / self.pixel_width).floor();
        let row = ((self.origin_y - y) / self.pixel_height).floor();

        if !col.is_finite() || !row.is_finite() || col < 0.0 || row < 0.0 {
            return None;
        }

        let (row, col) = (row as usize, col as usize);
        if row >= self.height as usize || col >= self.width as usize {
            return None;
        }

        Some((row, col))
    }

    /// Whether `value` is the no-data sentinel (or not a number).
    pub fn is_nodata(&self, value: f32) -> bool {
        value.is_nan() || value == self.nodata
    }
}

/// A decoded elevation tile held in memory.
#[derive(Debug, Clone)]
pub struct DemTile {
    /// Tile filename (or archive entry name), used for deterministic merge order.
    pub name: String,
    /// Georeferencing.
    pub geometry: RasterGeometry,
    /// Row-major samples, north row first.
    pub data: Vec<f32>,
}

impl DemTile {
    /// Load and decode a GeoTIFF tile.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        decode_tile(file, path, file_name(path))
    }

    /// Decode a GeoTIFF tile from memory.
    pub fn from_bytes(bytes: Vec<u8>, name: &str) -> Result<Self> {
        decode_tile(Cursor::new(bytes), Path::new(name), name.to_string())
    }

    /// Elevation at a projected coordinate, or `None` outside the tile or on no-data.
    pub fn get_elevation(&self, x: f64, y: f64) -> Option<f32> {
        let (row, col) = self.geometry.pixel_index(x, y)?;
        let value = self.data[row * self.geometry.width as usize + col];
        (!self.geometry.is_nodata(value)).then_some(value)
    }
}

/// Read only the georeferencing of a GeoTIFF, without decoding pixels.
pub fn read_raster_geometry<R: Read + Seek>(reader: R, path: &Path) -> Result<RasterGeometry> {
    let mut decoder = Decoder::new(reader).map_err(|e| invalid_tile(path, e))?;
    raster_geometry(&mut decoder, path)
}

fn decode_tile<R: Read + Seek>(reader: R, path: &Path, name: String) -> Result<DemTile> {
    let mut decoder = Decoder::new(reader).map_err(|e| invalid_tile(path, e))?;
    let geometry = raster_geometry(&mut decoder, path)?;

    let image = decoder.read_image().map_err(|e| invalid_tile(path, e))?;
    let data = samples_to_f32(image).ok_or_else(|| HillError::InvalidTile {
        path: path.to_path_buf(),
        reason: "unsupported sample format".to_string(),
    })?;

    let expected = geometry.width as usize * geometry.height as usize;
    if data.len() != expected {
        return Err(HillError::InvalidTile {
            path: path.to_path_buf(),
            reason: format!(
                "expected {} samples for a single band, found {}",
                expected,
                data.len()
            ),
        });
    }

    Ok(DemTile {
        name,
        geometry,
        data,
    })
}

fn raster_geometry<R: Read + Seek>(decoder: &mut Decoder<R>, path: &Path) -> Result<RasterGeometry> {
    let (width, height) = decoder.dimensions().map_err(|e| invalid_tile(path, e))?;
    if width == 0 || height == 0 {
        return Err(HillError::InvalidTile {
            path: path.to_path_buf(),
            reason: "zero-sized raster".to_string(),
        });
    }

    let scale = find_f64_tag(decoder, Tag::ModelPixelScaleTag, path)?;
    let tiepoint = find_f64_tag(decoder, Tag::ModelTiepointTag, path)?;
    let transform = find_f64_tag(decoder, Tag::ModelTransformationTag, path)?;

    let (origin_x, origin_y, pixel_width, pixel_height) = match (scale, tiepoint, transform) {
        (Some(scale), Some(tie), _) if scale.len() >= 2 && tie.len() >= 6 => {
            // Tiepoint maps raster (i, j) to model (x, y)
            let (i, j, x, y) = (tie[0], tie[1], tie[3], tie[4]);
            (x - i * scale[0], y + j * scale[1], scale[0], scale[1])
        }
        (_, _, Some(m)) if m.len() >= 16 => (m[3], m[7], m[0], -m[5]),
        _ => {
            return Err(HillError::InvalidTile {
                path: path.to_path_buf(),
                reason: "missing GeoTIFF georeferencing tags".to_string(),
            })
        }
    };

    if !(pixel_width > 0.0 && pixel_height > 0.0) {
        return Err(HillError::InvalidTile {
            path: path.to_path_buf(),
            reason: format!("invalid pixel size {}x{}", pixel_width, pixel_height),
        });
    }

    let nodata = decoder
        .find_tag(Tag::GdalNodata)
        .map_err(|e| invalid_tile(path, e))?
        .and_then(|value| value.into_string().ok())
        .and_then(|text| text.trim_matches(char::from(0)).trim().parse::<f32>().ok())
        .unwrap_or(DEFAULT_NODATA);

    let epsg = decoder
        .find_tag(Tag::GeoKeyDirectoryTag)
        .map_err(|e| invalid_tile(path, e))?
        .and_then(|value| value.into_u16_vec().ok())
        .and_then(|keys| epsg_from_geokeys(&keys))
        .unwrap_or(0);

    Ok(RasterGeometry {
        width,
        height,
        origin_x,
        origin_y,
        pixel_width,
        pixel_height,
        nodata,
        epsg,
    })
}

fn find_f64_tag<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    tag: Tag,
    path: &Path,
) -> Result<Option<Vec<f64>>> {
    match decoder.find_tag(tag).map_err(|e| invalid_tile(path, e))? {
        Some(value) => value
            .into_f64_vec()
            .map(Some)
            .map_err(|e| invalid_tile(path, e)),
        None => Ok(None),
    }
}

/// Extract the CRS code from a GeoKey directory.
///
/// The directory is a header of four shorts followed by `(key, location,
/// count, value)` entries. Only keys stored inline (location 0) are read.
fn epsg_from_geokeys(keys: &[u16]) -> Option<u32> {
    let count = *keys.get(3)? as usize;
    let entries: Vec<&[u16]> = keys.get(4..4 + count * 4)?.chunks(4).collect();

    [PROJECTED_CS_TYPE_GEO_KEY, GEOGRAPHIC_TYPE_GEO_KEY]
        .iter()
        .find_map(|wanted| {
            entries
                .iter()
                .find(|entry| entry[0] == *wanted && entry[1] == 0)
                .map(|entry| entry[3] as u32)
        })
        .filter(|code| *code != 0 && *code != 32767)
}

fn samples_to_f32(image: DecodingResult) -> Option<Vec<f32>> {
    let data = match image {
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|s| s as f32).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|s| s as f32).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|s| s as f32).collect(),
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        _ => return None,
    };
    Some(data)
}

fn invalid_tile(path: &Path, err: impl std::fmt::Display) -> HillError {
    HillError::InvalidTile {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Where a tile's bytes live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileSource {
    /// A loose GeoTIFF file.
    File(PathBuf),
    /// A GeoTIFF entry inside a zip archive.
    ArchiveEntry { archive: PathBuf, entry: String },
}

impl TileSource {
    /// Name used for merge ordering: the file name or the archive entry's file name.
    pub fn name(&self) -> String {
        match self {
            TileSource::File(path) => file_name(path),
            TileSource::ArchiveEntry { entry, .. } => {
                entry.rsplit('/').next().unwrap_or(entry).to_string()
            }
        }
    }

    /// Path shown in log messages and errors.
    pub fn display_path(&self) -> PathBuf {
        match self {
            TileSource::File(path) => path.clone(),
            TileSource::ArchiveEntry { archive, entry } => archive.join(entry),
        }
    }

    /// Read the tile's georeferencing without decoding pixels.
    pub fn read_geometry(&self) -> Result<RasterGeometry> {
        match self {
            TileSource::File(path) => read_raster_geometry(File::open(path)?, path),
            TileSource::ArchiveEntry { .. } => {
                let bytes = self.read_archive_entry()?;
                read_raster_geometry(Cursor::new(bytes), &self.display_path())
            }
        }
    }

    /// Load and decode the tile.
    pub fn load(&self) -> Result<DemTile> {
        match self {
            TileSource::File(path) => DemTile::from_file(path),
            TileSource::ArchiveEntry { .. } => {
                let bytes = self.read_archive_entry()?;
                decode_tile(Cursor::new(bytes), &self.display_path(), self.name())
            }
        }
    }

    fn read_archive_entry(&self) -> Result<Vec<u8>> {
        let TileSource::ArchiveEntry { archive, entry } = self else {
            return Err(HillError::InvalidTile {
                path: self.display_path(),
                reason: "not an archive entry".to_string(),
            });
        };

        let file = File::open(archive)?;
        let mut zip = zip::ZipArchive::new(file).map_err(|e| invalid_tile(archive, e))?;
        let mut zipped = zip.by_name(entry).map_err(|e| invalid_tile(archive, e))?;

        let mut bytes = Vec::with_capacity(zipped.size() as usize);
        zipped.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

/// List the GeoTIFF entries inside a zip archive.
fn archive_entries(archive: &Path) -> Result<Vec<String>> {
    let file = File::open(archive)?;
    let zip = zip::ZipArchive::new(file).map_err(|e| invalid_tile(archive, e))?;

    let mut entries: Vec<String> = zip
        .file_names()
        .filter(|name| {
            let base = name.rsplit('/').next().unwrap_or(*name);
            is_tiff_filename(base)
        })
        .map(str::to_string)
        .collect();
    entries.sort();
    Ok(entries)
}

/// Scan a directory for tile sources.
///
/// Loose `DTM*.tif` files and the `DTM*.tif` entries of `DTM*.zip` archives
/// are returned sorted by tile name, so the merge order does not depend on
/// filesystem enumeration order. When the same tile name appears both
/// loose and inside an archive, the loose file wins.
pub fn scan_tile_sources(dir: &Path) -> Result<Vec<TileSource>> {
    if !dir.is_dir() {
        return Err(HillError::InputNotFound {
            path: dir.to_path_buf(),
        });
    }

    let mut files = Vec::new();
    let mut archives = Vec::new();

    for entry in std::fs::read_dir(dir)?.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !is_tile_filename(&name) {
            continue;
        }
        if is_tiff_filename(&name) {
            files.push(TileSource::File(entry.path()));
        } else {
            archives.push(entry.path());
        }
    }

    archives.sort();
    let mut sources = files;
    for archive in archives {
        for entry in archive_entries(&archive)? {
            let source = TileSource::ArchiveEntry {
                archive: archive.clone(),
                entry,
            };
            if !sources.iter().any(|s| s.name() == source.name()) {
                sources.push(source);
            }
        }
    }

    sources.sort_by_key(|source| source.name());
    Ok(sources)
}
