//! Processing configuration.
//!
//! Every setting has a default and can be overridden from `HILLGRADE_*`
//! environment variables or builder-style setters.
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `HILLGRADE_DATA_DIR` | root data directory | `data` |
//! | `HILLGRADE_DTM_DIR` | tile directory | `<data>/dhm` |
//! | `HILLGRADE_ROADS_FILE` | road GeoJSON | `<data>/roads.geojson` |
//! | `HILLGRADE_DB_PATH` | SQLite hill store | `hills.db` |
//! | `HILLGRADE_SAMPLE_DISTANCE` | metres between samples | `10` |
//! | `HILLGRADE_SMOOTHING` | smooth profiles | `true` |
//! | `HILLGRADE_MIN_LENGTH` | hill threshold (m) | `100` |
//! | `HILLGRADE_MIN_GRADIENT` | hill threshold (%) | `3.0` |
//! | `HILLGRADE_MIN_ELEVATION_GAIN` | hill threshold (m) | `10` |
//!
//! # Example
//!
//! ```ignore
//! use hillgrade::Config;
//!
//! let config = Config::from_env()?.sample_distance(5.0);
//! let service = config.elevation_service();
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{HillError, Result};
use crate::gradient::{GradientOptions, HillCriteria};
use crate::service::ElevationService;

const DATA_DIR: &str = "HILLGRADE_DATA_DIR";
const DTM_DIR: &str = "HILLGRADE_DTM_DIR";
const ROADS_FILE: &str = "HILLGRADE_ROADS_FILE";
const DB_PATH: &str = "HILLGRADE_DB_PATH";
const SAMPLE_DISTANCE: &str = "HILLGRADE_SAMPLE_DISTANCE";
const SMOOTHING: &str = "HILLGRADE_SMOOTHING";
const MIN_LENGTH: &str = "HILLGRADE_MIN_LENGTH";
const MIN_GRADIENT: &str = "HILLGRADE_MIN_GRADIENT";
const MIN_ELEVATION_GAIN: &str = "HILLGRADE_MIN_ELEVATION_GAIN";

/// File name of the merged coverage inside the data directory.
pub const COVERAGE_FILE: &str = "merged_dtm.cov";
/// File name of the processed road network inside the data directory.
pub const PROCESSED_ROADS_FILE: &str = "processed_roads.geojson";
/// File name of the hill export inside the data directory.
pub const HILLS_FILE: &str = "hills.geojson";

/// Paths and parameters for the processing pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    data_dir: PathBuf,
    dtm_dir: Option<PathBuf>,
    roads_file: Option<PathBuf>,
    db_path: PathBuf,
    gradient: GradientOptions,
    criteria: HillCriteria,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            dtm_dir: None,
            roads_file: None,
            db_path: PathBuf::from("hills.db"),
            gradient: GradientOptions::default(),
            criteria: HillCriteria::default(),
        }
    }
}

impl Config {
    /// Create a configuration from environment variables, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`HillError::InvalidConfig`] if a numeric or boolean variable
    /// cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`Config::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(dir) = lookup(DATA_DIR) {
            config.data_dir = PathBuf::from(dir);
        }
        config.dtm_dir = lookup(DTM_DIR).map(PathBuf::from);
        config.roads_file = lookup(ROADS_FILE).map(PathBuf::from);
        if let Some(path) = lookup(DB_PATH) {
            config.db_path = PathBuf::from(path);
        }

        let sample_distance: Option<f64> = parse_var(&lookup, SAMPLE_DISTANCE)?;
        if let Some(value) = sample_distance {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(SAMPLE_DISTANCE, value.to_string()));
            }
            config.gradient.sample_distance = value;
        }
        if let Some(value) = lookup(SMOOTHING) {
            config.gradient.smoothing = parse_bool(&value).ok_or_else(|| invalid(SMOOTHING, value))?;
        }
        if let Some(value) = parse_var(&lookup, MIN_LENGTH)? {
            config.criteria.min_length = value;
        }
        if let Some(value) = parse_var(&lookup, MIN_GRADIENT)? {
            config.criteria.min_gradient = value;
        }
        if let Some(value) = parse_var(&lookup, MIN_ELEVATION_GAIN)? {
            config.criteria.min_elevation_gain = value;
        }

        Ok(config)
    }

    pub fn data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.data_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn dtm_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.dtm_dir = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn roads_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.roads_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn db_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.db_path = path.as_ref().to_path_buf();
        self
    }

    pub fn sample_distance(mut self, metres: f64) -> Self {
        self.gradient.sample_distance = metres;
        self
    }

    pub fn smoothing(mut self, enabled: bool) -> Self {
        self.gradient.smoothing = enabled;
        self
    }

    pub fn min_length(mut self, metres: f64) -> Self {
        self.criteria.min_length = metres;
        self
    }

    pub fn min_gradient(mut self, percent: f64) -> Self {
        self.criteria.min_gradient = percent;
        self
    }

    pub fn min_elevation_gain(mut self, metres: f64) -> Self {
        self.criteria.min_elevation_gain = metres;
        self
    }

    pub fn data_dir_path(&self) -> &Path {
        &self.data_dir
    }

    /// Tile directory; `<data>/dhm` unless set.
    pub fn dtm_dir_path(&self) -> PathBuf {
        self.dtm_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("dhm"))
    }

    /// Raw road network; `<data>/roads.geojson` unless set.
    pub fn roads_path(&self) -> PathBuf {
        self.roads_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("roads.geojson"))
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    pub fn coverage_path(&self) -> PathBuf {
        self.data_dir.join(COVERAGE_FILE)
    }

    pub fn processed_roads_path(&self) -> PathBuf {
        self.data_dir.join(PROCESSED_ROADS_FILE)
    }

    pub fn hills_path(&self) -> PathBuf {
        self.data_dir.join(HILLS_FILE)
    }

    pub fn gradient_options(&self) -> GradientOptions {
        self.gradient
    }

    pub fn hill_criteria(&self) -> HillCriteria {
        self.criteria
    }

    /// A lazy elevation service over the configured coverage, building it
    /// from the tile directory on first use if the file is missing.
    pub fn elevation_service(&self) -> ElevationService {
        ElevationService::builder(self.coverage_path())
            .tile_dir(self.dtm_dir_path())
            .build()
    }
}

fn invalid(key: &str, value: impl Into<String>) -> HillError {
    HillError::InvalidConfig {
        key: key.to_string(),
        value: value.into(),
    }
}

fn parse_var<T, L>(lookup: &L, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    L: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(key, value)),
        None => Ok(None),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.dtm_dir_path(), PathBuf::from("data/dhm"));
        assert_eq!(config.roads_path(), PathBuf::from("data/roads.geojson"));
        assert_eq!(config.coverage_path(), PathBuf::from("data/merged_dtm.cov"));
        assert_eq!(config.hills_path(), PathBuf::from("data/hills.geojson"));
        assert_eq!(config.database_path(), Path::new("hills.db"));
        assert_eq!(config.gradient_options().sample_distance, 10.0);
        assert!(config.gradient_options().smoothing);
        assert_eq!(config.hill_criteria(), HillCriteria::default());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            (DATA_DIR, "/srv/dk"),
            (DB_PATH, "/srv/dk/hills.db"),
            (SAMPLE_DISTANCE, "5"),
            (SMOOTHING, "false"),
            (MIN_LENGTH, "250"),
            (MIN_GRADIENT, " 4.5 "),
            (MIN_ELEVATION_GAIN, "20"),
        ]))
        .unwrap();

        assert_eq!(config.data_dir_path(), Path::new("/srv/dk"));
        assert_eq!(config.dtm_dir_path(), PathBuf::from("/srv/dk/dhm"));
        assert_eq!(
            config.processed_roads_path(),
            PathBuf::from("/srv/dk/processed_roads.geojson")
        );
        assert_eq!(config.gradient_options().sample_distance, 5.0);
        assert!(!config.gradient_options().smoothing);
        assert_eq!(config.hill_criteria().min_length, 250.0);
        assert_eq!(config.hill_criteria().min_gradient, 4.5);
        assert_eq!(config.hill_criteria().min_elevation_gain, 20.0);
    }

    #[test]
    fn test_explicit_paths_win() {
        let config = Config::from_lookup(lookup(&[
            (DTM_DIR, "/tiles"),
            (ROADS_FILE, "/roads/dk.geojson"),
        ]))
        .unwrap();
        assert_eq!(config.dtm_dir_path(), PathBuf::from("/tiles"));
        assert_eq!(config.roads_path(), PathBuf::from("/roads/dk.geojson"));
    }

    #[test]
    fn test_invalid_values() {
        for (key, value) in [
            (SAMPLE_DISTANCE, "ten"),
            (SAMPLE_DISTANCE, "0"),
            (SAMPLE_DISTANCE, "-3"),
            (SMOOTHING, "maybe"),
            (MIN_GRADIENT, "3%"),
        ] {
            let result = Config::from_lookup(lookup(&[(key, value)]));
            match result {
                Err(HillError::InvalidConfig { key: k, .. }) => assert_eq!(k, key),
                other => panic!("expected InvalidConfig for {}={}, got {:?}", key, value, other),
            }
        }
    }

    #[test]
    fn test_builder_setters() {
        let config = Config::default()
            .data_dir("/data")
            .dtm_dir("/dtm")
            .roads_file("/roads.geojson")
            .db_path("/db/hills.db")
            .sample_distance(20.0)
            .smoothing(false)
            .min_length(50.0)
            .min_gradient(2.0)
            .min_elevation_gain(5.0);

        assert_eq!(config.dtm_dir_path(), PathBuf::from("/dtm"));
        assert_eq!(config.roads_path(), PathBuf::from("/roads.geojson"));
        assert_eq!(config.database_path(), Path::new("/db/hills.db"));
        assert_eq!(config.gradient_options().sample_distance, 20.0);
        assert_eq!(config.hill_criteria().min_elevation_gain, 5.0);

        let service = config.elevation_service();
        assert_eq!(service.coverage_path(), Path::new("/data/merged_dtm.cov"));
        assert!(!service.is_open());
    }

    #[test]
    fn test_from_env() {
        // Save original value
        let original = std::env::var(MIN_ELEVATION_GAIN).ok();
        std::env::set_var(MIN_ELEVATION_GAIN, "42");

        let config = Config::from_env().unwrap();
        assert_eq!(config.hill_criteria().min_elevation_gain, 42.0);

        // Restore original value
        match original {
            Some(v) => std::env::set_var(MIN_ELEVATION_GAIN, v),
            None => std::env::remove_var(MIN_ELEVATION_GAIN),
        }
    }
}
