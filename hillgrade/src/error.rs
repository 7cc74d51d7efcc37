//! Error types for the hillgrade library.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while building coverages, computing gradients or
/// persisting hills.
///
/// Missing elevation at a single point is not an error: lookups return `None`
/// and segments without enough data are skipped.
#[derive(Error, Debug)]
pub enum HillError {
    /// A tile directory, road file or hills file does not exist, or holds no usable input.
    #[error("Input not found: {path}")]
    InputNotFound { path: PathBuf },

    /// No elevation coverage could be built or opened.
    #[error("Elevation data unavailable: {reason}")]
    DataUnavailable { reason: String },

    /// A road geometry is degenerate or not a line type.
    #[error("Invalid geometry: {reason}")]
    GeometryInvalid { reason: String },

    /// The hill store could not be read or written.
    #[error("Persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    /// A hill failed validation during import. The import is rolled back.
    #[error("Hill {index} rejected: {reason}")]
    InvalidHill { index: usize, reason: String },

    /// A tile could not be decoded or lacks georeferencing.
    #[error("Invalid tile {path}: {reason}")]
    InvalidTile { path: PathBuf, reason: String },

    /// Tiles disagree on pixel size or coordinate reference system.
    #[error("Incompatible tiles: {reason}")]
    IncompatibleTiles { reason: String },

    /// A coverage file is truncated or has an unknown header.
    #[error("Invalid coverage file {path}: {reason}")]
    InvalidCoverage { path: PathBuf, reason: String },

    /// Road data declares a different CRS than the elevation coverage.
    #[error("CRS mismatch: coverage is EPSG:{expected}, roads are EPSG:{found}")]
    CrsMismatch { expected: u32, found: u32 },

    /// A configuration value could not be parsed.
    #[error("Invalid value for {key}: {value:?}")]
    InvalidConfig { key: String, value: String },

    /// GeoJSON parse or conversion error.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// JSON encoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error when reading or writing files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using [`HillError`].
pub type Result<T> = std::result::Result<T, HillError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HillError::InputNotFound {
            path: PathBuf::from("data/dhm"),
        };
        assert!(err.to_string().contains("data/dhm"));

        let err = HillError::CrsMismatch {
            expected: 25832,
            found: 4326,
        };
        assert!(err.to_string().contains("EPSG:25832"));
        assert!(err.to_string().contains("EPSG:4326"));

        let err = HillError::InvalidHill {
            index: 3,
            reason: "non-finite gradient".to_string(),
        };
        assert!(err.to_string().contains('3'));
        assert!(err.to_string().contains("non-finite"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: HillError = io.into();
        assert!(matches!(err, HillError::Io(_)));
    }
}
