//! Elevation service with a lazily opened coverage.
//!
//! This module provides [`ElevationService`], the high-level entry point for
//! point and line elevation queries. The coverage is opened on first use,
//! shared by callers on the same thread of control, and can be released
//! explicitly. Parallel computations take their own handle per worker with
//! [`ElevationService::open_worker_handle`].
//!
//! ```ignore
//! use hillgrade::ElevationService;
//!
//! let service = ElevationService::builder("data/merged_dtm.cov")
//!     .tile_dir("data/dhm")
//!     .build();
//!
//! // Coverage is built (if needed) and opened here
//! let elevation = service.sample_elevation(520431.0, 6170520.0)?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use geo::LineString;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::coverage::{Coverage, CoverageInfo, ElevationSource};
use crate::error::{HillError, Result};
use crate::geometry::{line_length, point_at_distance};
use crate::merge::build_coverage;

/// One sample of an elevation profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfileSample {
    /// Distance along the line from its start, in metres.
    pub distance: f64,
    /// Elevation at that point, or `None` where the coverage has no data.
    pub elevation: Option<f64>,
}

/// Distances at which a line of length `length` is sampled every `interval` units.
///
/// The sequence is `0, d, 2d, ...` for every multiple strictly below `length`,
/// followed by `length` itself, giving `⌈length / d⌉ + 1` samples. A
/// zero-length line yields the single distance `0`.
///
/// # Examples
///
/// ```
/// use hillgrade::service::sample_distances;
///
/// assert_eq!(sample_distances(25.0, 10.0).unwrap(), vec![0.0, 10.0, 20.0, 25.0]);
/// assert_eq!(sample_distances(20.0, 10.0).unwrap(), vec![0.0, 10.0, 20.0]);
/// assert_eq!(sample_distances(0.0, 10.0).unwrap(), vec![0.0]);
/// ```
pub fn sample_distances(length: f64, interval: f64) -> Result<Vec<f64>> {
    if !(interval > 0.0 && interval.is_finite()) {
        return Err(HillError::InvalidConfig {
            key: "sample_distance".to_string(),
            value: interval.to_string(),
        });
    }
    if !(length >= 0.0 && length.is_finite()) {
        return Err(HillError::GeometryInvalid {
            reason: format!("line length {} is not a finite non-negative number", length),
        });
    }

    let steps = (length / interval).ceil() as usize;
    let mut distances = Vec::with_capacity(steps + 1);

    // Multiply rather than accumulate so long lines do not drift
    let mut k = 0usize;
    loop {
        let distance = k as f64 * interval;
        if distance >= length {
            break;
        }
        distances.push(distance);
        k += 1;
    }
    distances.push(length);

    Ok(distances)
}

/// Sample `source` along `line` every `interval` metres.
///
/// Stateless: calling it twice with the same arguments yields the same samples.
pub fn sample_along_line<S: ElevationSource + ?Sized>(
    source: &S,
    line: &LineString<f64>,
    interval: f64,
) -> Result<Vec<ProfileSample>> {
    let distances = sample_distances(line_length(line), interval)?;

    Ok(distances
        .into_iter()
        .map(|distance| ProfileSample {
            distance,
            elevation: point_at_distance(line, distance)
                .and_then(|point| source.sample_elevation(point.x, point.y)),
        })
        .collect())
}

/// Elevation queries against a merged coverage file.
///
/// # Example
///
/// ```ignore
/// use hillgrade::ElevationService;
///
/// let service = ElevationService::new("data/merged_dtm.cov");
/// assert!(!service.is_open());
///
/// let elevation = service.sample_elevation(520431.0, 6170520.0)?;
/// assert!(service.is_open());
///
/// service.release();
/// assert!(!service.is_open());
/// ```
pub struct ElevationService {
    /// Path of the merged coverage file.
    coverage_path: PathBuf,
    /// Tile directory used to build the coverage when it does not exist yet.
    tile_dir: Option<PathBuf>,
    /// The lazily opened shared handle.
    coverage: RwLock<Option<Arc<Coverage>>>,
}

impl ElevationService {
    /// Create a service over an existing coverage file.
    ///
    /// Nothing is opened until the first query.
    pub fn new<P: AsRef<Path>>(coverage_path: P) -> Self {
        Self {
            coverage_path: coverage_path.as_ref().to_path_buf(),
            tile_dir: None,
            coverage: RwLock::new(None),
        }
    }

    /// Create a builder for configuring the service.
    pub fn builder<P: AsRef<Path>>(coverage_path: P) -> ElevationServiceBuilder {
        ElevationServiceBuilder::new(coverage_path)
    }

    /// Elevation at a projected coordinate.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(elevation))` - Valid elevation in metres
    /// - `Ok(None)` - The point is outside the coverage or on a no-data pixel
    ///
    /// # Errors
    ///
    /// Returns [`HillError::DataUnavailable`] if no coverage can be opened.
    pub fn sample_elevation(&self, x: f64, y: f64) -> Result<Option<f64>> {
        Ok(self.coverage()?.sample_elevation(x, y))
    }

    /// Sample elevations every `interval` metres along `line`.
    ///
    /// See [`sample_distances`] for the exact sampling positions.
    pub fn sample_along_line(
        &self,
        line: &LineString<f64>,
        interval: f64,
    ) -> Result<Vec<ProfileSample>> {
        let coverage = self.coverage()?;
        sample_along_line(coverage.as_ref(), line, interval)
    }

    /// The shared coverage handle, opening it on first use.
    pub fn coverage(&self) -> Result<Arc<Coverage>> {
        if let Some(coverage) = self.read_slot().as_ref() {
            return Ok(Arc::clone(coverage));
        }

        let mut slot = self.coverage.write().unwrap_or_else(|e| e.into_inner());
        // Another caller may have opened it while we waited for the lock
        if let Some(coverage) = slot.as_ref() {
            return Ok(Arc::clone(coverage));
        }

        let coverage = Arc::new(self.open_coverage()?);
        info!(path = %self.coverage_path.display(), "Opened coverage");
        *slot = Some(Arc::clone(&coverage));
        Ok(coverage)
    }

    /// Open an independent handle for one worker.
    ///
    /// Each worker of a parallel computation should own its handle rather
    /// than share the service's.
    pub fn open_worker_handle(&self) -> Result<Coverage> {
        debug!(path = %self.coverage_path.display(), "Opening worker handle");
        self.open_coverage()
    }

    /// Summary of the coverage, opening it if necessary.
    pub fn coverage_info(&self) -> Result<CoverageInfo> {
        Ok(self.coverage()?.info())
    }

    /// Drop the shared handle. The next query reopens it.
    ///
    /// Handles already cloned out by [`coverage`](Self::coverage) stay valid
    /// until their holders drop them.
    pub fn release(&self) {
        let mut slot = self.coverage.write().unwrap_or_else(|e| e.into_inner());
        if slot.take().is_some() {
            debug!(path = %self.coverage_path.display(), "Released coverage");
        }
    }

    /// Whether the shared handle is currently open.
    pub fn is_open(&self) -> bool {
        self.read_slot().is_some()
    }

    pub fn coverage_path(&self) -> &Path {
        &self.coverage_path
    }

    fn read_slot(&self) -> std::sync::RwLockReadGuard<'_, Option<Arc<Coverage>>> {
        self.coverage.read().unwrap_or_else(|e| e.into_inner())
    }

    fn open_coverage(&self) -> Result<Coverage> {
        if !self.coverage_path.exists() {
            if let Some(tile_dir) = &self.tile_dir {
                build_coverage(tile_dir, &self.coverage_path).map_err(unavailable)?;
            }
        }
        Coverage::open(&self.coverage_path).map_err(unavailable)
    }
}

fn unavailable(err: HillError) -> HillError {
    match err {
        HillError::DataUnavailable { .. } => err,
        other => HillError::DataUnavailable {
            reason: other.to_string(),
        },
    }
}

/// Builder for [`ElevationService`].
///
/// # Example
///
/// ```ignore
/// use hillgrade::ElevationServiceBuilder;
///
/// let service = ElevationServiceBuilder::new("data/merged_dtm.cov")
///     .tile_dir("data/dhm")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ElevationServiceBuilder {
    coverage_path: PathBuf,
    tile_dir: Option<PathBuf>,
}

impl ElevationServiceBuilder {
    /// Create a builder for the coverage at `coverage_path`.
    pub fn new<P: AsRef<Path>>(coverage_path: P) -> Self {
        Self {
            coverage_path: coverage_path.as_ref().to_path_buf(),
            tile_dir: None,
        }
    }

    /// Build the coverage from this tile directory if it does not exist yet.
    pub fn tile_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.tile_dir = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn build(self) -> ElevationService {
        ElevationService {
            coverage_path: self.coverage_path,
            tile_dir: self.tile_dir,
            coverage: RwLock::new(None),
        }
    }
}
