//! Gradient statistics for road segments.
//!
//! This module turns elevation samples along a road into gradient
//! statistics, and filters the results into classified [`Hill`]s.
//!
//! # Algorithm
//!
//! For every part of a road geometry:
//!
//! 1. Sample the elevation every `sample_distance` metres.
//! 2. Drop samples without data. Parts with fewer than two valid samples, or
//!    shorter than twice the sample distance, are skipped.
//! 3. Optionally smooth the elevations (see [`crate::smoothing`]). Each run
//!    of evenly spaced samples between data gaps is filtered separately and
//!    the short final interval follows the last smoothed one; runs the
//!    filter cannot handle keep their raw values.
//! 4. Compute `Δelevation / Δdistance × 100` between consecutive samples.
//!    The average and maximum are taken over absolute values, and the gain
//!    sums the positive elevation deltas.
//!
//! Parts are then combined into one [`SegmentStats`] per road.

use std::sync::atomic::{AtomicUsize, Ordering};

use geo::LineString;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::coverage::ElevationSource;
use crate::error::{HillError, Result};
use crate::geometry::{line_length, RoadGeometry};
use crate::hill::{profile_endpoints, Category, Hill, ProfilePoint};
use crate::roads::RoadSegment;
use crate::service::{sample_along_line, ElevationService, ProfileSample};
use crate::smoothing::{smooth_profile, MIN_SAMPLES};

/// Default distance between elevation samples, in metres.
pub const DEFAULT_SAMPLE_DISTANCE: f64 = 10.0;

/// How per-part averages are combined for multi-part geometries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum PartAggregation {
    /// Plain mean of the per-part average gradients.
    ///
    /// A short steep part counts as much as a long flat one.
    #[default]
    Unweighted,
    /// Mean of the per-part averages weighted by part length.
    LengthWeighted,
}

/// Parameters for gradient computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientOptions {
    /// Distance between elevation samples, in metres.
    pub sample_distance: f64,
    /// Whether to smooth elevation profiles before computing gradients.
    pub smoothing: bool,
    /// How multi-part results are combined.
    pub aggregation: PartAggregation,
}

impl Default for GradientOptions {
    fn default() -> Self {
        Self {
            sample_distance: DEFAULT_SAMPLE_DISTANCE,
            smoothing: true,
            aggregation: PartAggregation::Unweighted,
        }
    }
}

impl GradientOptions {
    pub fn sample_distance(mut self, metres: f64) -> Self {
        self.sample_distance = metres;
        self
    }

    pub fn smoothing(mut self, enabled: bool) -> Self {
        self.smoothing = enabled;
        self
    }

    pub fn aggregation(mut self, aggregation: PartAggregation) -> Self {
        self.aggregation = aggregation;
        self
    }
}

/// Gradient statistics of a road segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentStats {
    /// Total length of all parts, in metres.
    pub length_m: f64,
    /// Mean absolute gradient, in percent.
    pub avg_gradient: f64,
    /// Maximum absolute gradient, in percent.
    pub max_gradient: f64,
    /// Sum of positive elevation changes, in metres.
    pub elevation_gain: f64,
    pub min_elevation: f64,
    pub max_elevation: f64,
    /// Elevation profile; distances run along the whole geometry.
    pub profile: Vec<ProfilePoint>,
}

/// Gradient of one sampling interval, for profile charts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GradientPoint {
    /// Distance of the interval start along the geometry.
    pub distance: f64,
    /// Elevation at the interval start.
    pub elevation: f64,
    /// Gradient over the interval in percent; positive is uphill.
    pub gradient: f64,
}

/// Elevation profile of one part after sampling, null removal and smoothing.
fn part_profile<S: ElevationSource + ?Sized>(
    source: &S,
    line: &LineString<f64>,
    options: &GradientOptions,
) -> Result<Option<Vec<ProfilePoint>>> {
    let length = line_length(line);
    if length < options.sample_distance * 2.0 {
        return Ok(None);
    }

    let samples = sample_along_line(source, line, options.sample_distance)?;
    if samples.iter().filter(|s| s.elevation.is_some()).count() < 2 {
        return Ok(None);
    }

    let profile = if options.smoothing {
        smoothed_profile(&samples, options.sample_distance)
    } else {
        samples
            .iter()
            .filter_map(|s| s.elevation.map(|e| ProfilePoint::new(s.distance, e)))
            .collect()
    };
    Ok(Some(profile))
}

/// Smooth every unbroken run of evenly spaced samples on its own.
///
/// The filter works in sample index space, so runs end at samples without
/// data. The final sample usually lies closer than `spacing` to its
/// predecessor; it is placed on the extension of the last smoothed interval
/// rather than being filtered. Runs too short to smooth keep raw values.
fn smoothed_profile(samples: &[ProfileSample], spacing: f64) -> Vec<ProfilePoint> {
    let (grid, tail) = match samples {
        [.., prev, last] if last.distance - prev.distance < spacing * (1.0 - 1e-9) => {
            (&samples[..samples.len() - 1], Some(last))
        }
        _ => (samples, None),
    };

    let mut profile = Vec::with_capacity(samples.len());
    let mut last_run_smoothed = false;
    for run in grid.split(|s| s.elevation.is_none()) {
        let raw: Vec<f64> = run.iter().filter_map(|s| s.elevation).collect();
        let elevations = match smooth_profile(&raw) {
            Some(smoothed) => {
                last_run_smoothed = true;
                smoothed
            }
            None => {
                if raw.len() > MIN_SAMPLES {
                    warn!(samples = raw.len(), "Smoothing failed, using raw elevations");
                }
                last_run_smoothed = false;
                raw
            }
        };
        profile.extend(
            run.iter()
                .zip(elevations)
                .map(|(s, elevation)| ProfilePoint::new(s.distance, elevation)),
        );
    }

    if let Some(ProfileSample {
        distance,
        elevation: Some(raw),
    }) = tail.copied()
    {
        let elevation = match profile.as_slice() {
            [.., a, b] if last_run_smoothed => {
                let slope = (b.elevation - a.elevation) / (b.distance - a.distance);
                b.elevation + slope * (distance - b.distance)
            }
            _ => raw,
        };
        profile.push(ProfilePoint::new(distance, elevation));
    }

    profile
}

/// Interval gradients of a profile, in percent, skipping zero-length intervals.
fn interval_gradients(profile: &[ProfilePoint]) -> impl Iterator<Item = (usize, f64)> + '_ {
    profile.windows(2).enumerate().filter_map(|(i, w)| {
        let dd = w[1].distance - w[0].distance;
        (dd > 0.0).then(|| (i, (w[1].elevation - w[0].elevation) / dd * 100.0))
    })
}

/// Statistics of a single line.
///
/// Returns `Ok(None)` when the line is skipped: shorter than twice the
/// sample distance, or fewer than two samples with data.
pub fn compute_part_stats<S: ElevationSource + ?Sized>(
    source: &S,
    line: &LineString<f64>,
    options: &GradientOptions,
) -> Result<Option<SegmentStats>> {
    let Some(profile) = part_profile(source, line, options)? else {
        return Ok(None);
    };

    let gradients: Vec<f64> = interval_gradients(&profile).map(|(_, g)| g.abs()).collect();
    if gradients.is_empty() {
        return Ok(None);
    }

    let avg_gradient = gradients.iter().sum::<f64>() / gradients.len() as f64;
    let max_gradient = gradients.iter().copied().fold(0.0, f64::max);
    let elevation_gain = profile
        .windows(2)
        .map(|w| (w[1].elevation - w[0].elevation).max(0.0))
        .sum();
    let min_elevation = profile.iter().map(|p| p.elevation).fold(f64::INFINITY, f64::min);
    let max_elevation = profile
        .iter()
        .map(|p| p.elevation)
        .fold(f64::NEG_INFINITY, f64::max);

    Ok(Some(SegmentStats {
        length_m: line_length(line),
        avg_gradient,
        max_gradient,
        elevation_gain,
        min_elevation,
        max_elevation,
        profile,
    }))
}

/// Statistics of a road geometry, combining parts for multi-part geometries.
///
/// Each part is computed with [`compute_part_stats`]. Skipped parts are left
/// out; if every part is skipped, so is the segment. For the remaining parts
/// the maximum gradient and elevation extremes are taken over all parts, the
/// gains are summed, and the average gradient is combined according to
/// [`GradientOptions::aggregation`]. Profile distances are offset by the
/// lengths of the preceding parts.
///
/// # Errors
///
/// - [`HillError::GeometryInvalid`] if the geometry is empty or has zero length
/// - [`HillError::InvalidConfig`] if the sample distance is not positive
///
/// # Example
///
/// ```ignore
/// use hillgrade::{compute_segment_stats, GradientOptions};
///
/// let coverage = Coverage::open("data/merged_dtm.cov")?;
/// if let Some(stats) = compute_segment_stats(&coverage, &geometry, &GradientOptions::default())? {
///     println!("{:.1}% over {:.0} m", stats.avg_gradient, stats.length_m);
/// }
/// ```
pub fn compute_segment_stats<S: ElevationSource + ?Sized>(
    source: &S,
    geometry: &RoadGeometry,
    options: &GradientOptions,
) -> Result<Option<SegmentStats>> {
    geometry.validate()?;
    if !(options.sample_distance > 0.0 && options.sample_distance.is_finite()) {
        return Err(HillError::InvalidConfig {
            key: "sample_distance".to_string(),
            value: options.sample_distance.to_string(),
        });
    }

    let mut parts = Vec::new();
    let mut offset = 0.0;
    for line in geometry.parts() {
        if let Some(mut stats) = compute_part_stats(source, line, options)? {
            for point in &mut stats.profile {
                point.distance += offset;
            }
            parts.push(stats);
        }
        offset += line_length(line);
    }

    if parts.is_empty() {
        return Ok(None);
    }

    let avg_gradient = match options.aggregation {
        PartAggregation::Unweighted => {
            parts.iter().map(|p| p.avg_gradient).sum::<f64>() / parts.len() as f64
        }
        PartAggregation::LengthWeighted => {
            let total: f64 = parts.iter().map(|p| p.length_m).sum();
            parts.iter().map(|p| p.avg_gradient * p.length_m).sum::<f64>() / total
        }
    };

    Ok(Some(SegmentStats {
        length_m: geometry.length(),
        avg_gradient,
        max_gradient: parts.iter().map(|p| p.max_gradient).fold(0.0, f64::max),
        elevation_gain: parts.iter().map(|p| p.elevation_gain).sum(),
        min_elevation: parts
            .iter()
            .map(|p| p.min_elevation)
            .fold(f64::INFINITY, f64::min),
        max_elevation: parts
            .iter()
            .map(|p| p.max_elevation)
            .fold(f64::NEG_INFINITY, f64::max),
        profile: parts.into_iter().flat_map(|p| p.profile).collect(),
    }))
}

/// Per-interval gradients along a geometry, for profile charts.
///
/// Intervals never span two parts of a multi-part geometry.
pub fn gradient_profile<S: ElevationSource + ?Sized>(
    source: &S,
    geometry: &RoadGeometry,
    options: &GradientOptions,
) -> Result<Vec<GradientPoint>> {
    geometry.validate()?;

    let mut points = Vec::new();
    let mut offset = 0.0;
    for line in geometry.parts() {
        if let Some(profile) = part_profile(source, line, options)? {
            points.extend(interval_gradients(&profile).map(|(i, gradient)| GradientPoint {
                distance: profile[i].distance + offset,
                elevation: profile[i].elevation,
                gradient,
            }));
        }
        offset += line_length(line);
    }

    Ok(points)
}

/// Outcome counts of a network computation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NetworkReport {
    /// Segments processed.
    pub total: usize,
    /// Segments with statistics.
    pub computed: usize,
    /// Segments skipped for lack of data or length.
    pub skipped: usize,
    /// Segments rejected as degenerate geometry.
    pub invalid: usize,
}

enum Outcome {
    Computed,
    Skipped,
    Invalid,
    Failed(HillError),
}

/// Compute statistics for every segment in parallel.
///
/// Every rayon job opens its own coverage handle through `map_init`; rayon
/// may split the work into more jobs than threads, so one thread can map the
/// file more than once. Results are written into `segment.stats`; skipped
/// and invalid segments get `None`. `progress`, if given, is called with
/// `(done, total)` after each segment.
///
/// # Errors
///
/// Returns [`HillError::DataUnavailable`] if the coverage cannot be opened.
/// Degenerate geometries and segments without data are counted in the report
/// instead. Any other failure aborts the run, and `stats` is then cleared on
/// every segment so no partial results are left behind.
pub fn compute_network(
    service: &ElevationService,
    segments: &mut [RoadSegment],
    options: &GradientOptions,
    progress: Option<&(dyn Fn(usize, usize) + Sync)>,
) -> Result<NetworkReport> {
    let info = service.coverage_info()?;
    info!(
        segments = segments.len(),
        sample_distance = options.sample_distance,
        smoothing = options.smoothing,
        epsg = info.epsg,
        "Calculating road gradients"
    );

    let total = segments.len();
    let done = AtomicUsize::new(0);

    let outcomes: Vec<Outcome> = segments
        .par_iter_mut()
        .map_init(
            || service.open_worker_handle(),
            |handle, segment| {
                let outcome = match handle {
                    Ok(coverage) => {
                        match compute_segment_stats(coverage, &segment.geometry, options) {
                            Ok(Some(stats)) => {
                                segment.stats = Some(stats);
                                Outcome::Computed
                            }
                            Ok(None) => {
                                segment.stats = None;
                                Outcome::Skipped
                            }
                            Err(HillError::GeometryInvalid { reason }) => {
                                debug!(road_id = %segment.properties.road_id, %reason, "Invalid geometry");
                                segment.stats = None;
                                Outcome::Invalid
                            }
                            Err(e) => Outcome::Failed(e),
                        }
                    }
                    Err(e) => Outcome::Failed(HillError::DataUnavailable {
                        reason: e.to_string(),
                    }),
                };

                let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(progress) = progress {
                    progress(n, total);
                }
                outcome
            },
        )
        .collect();

    let mut report = NetworkReport {
        total,
        ..Default::default()
    };
    let mut failure = None;
    for outcome in outcomes {
        match outcome {
            Outcome::Computed => report.computed += 1,
            Outcome::Skipped => report.skipped += 1,
            Outcome::Invalid => report.invalid += 1,
            Outcome::Failed(e) => {
                failure.get_or_insert(e);
            }
        }
    }
    if let Some(e) = failure {
        for segment in segments.iter_mut() {
            segment.stats = None;
        }
        return Err(e);
    }

    info!(
        computed = report.computed,
        skipped = report.skipped,
        invalid = report.invalid,
        "Gradient calculation complete"
    );
    Ok(report)
}

/// Thresholds a segment must meet to count as a hill.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HillCriteria {
    /// Minimum length in metres.
    pub min_length: f64,
    /// Minimum average gradient in percent.
    pub min_gradient: f64,
    /// Minimum elevation gain in metres.
    pub min_elevation_gain: f64,
}

impl Default for HillCriteria {
    fn default() -> Self {
        Self {
            min_length: 100.0,
            min_gradient: 3.0,
            min_elevation_gain: 10.0,
        }
    }
}

impl HillCriteria {
    /// Whether computed statistics pass every threshold.
    pub fn accepts(&self, stats: &SegmentStats) -> bool {
        stats.length_m >= self.min_length
            && stats.avg_gradient >= self.min_gradient
            && stats.elevation_gain >= self.min_elevation_gain
    }
}

/// Select the segments that qualify as hills and classify them.
///
/// Pure: the same segments and criteria always produce the same hills, in
/// segment order. Segments without statistics never qualify. Unnamed hills
/// are called `Hill <n>`, numbered from 1 in output order.
pub fn classify_hills(segments: &[RoadSegment], criteria: &HillCriteria) -> Vec<Hill> {
    let hills: Vec<Hill> = segments
        .iter()
        .filter_map(|segment| {
            let stats = segment.stats.as_ref()?;
            criteria.accepts(stats).then_some((segment, stats))
        })
        .enumerate()
        .map(|(i, (segment, stats))| {
            let (start_elevation, end_elevation) = profile_endpoints(&stats.profile);
            Hill {
                name: segment
                    .properties
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("Hill {}", i + 1)),
                road_id: segment.properties.road_id.clone(),
                category: Category::from_gradient(stats.avg_gradient),
                length_m: stats.length_m,
                avg_gradient: stats.avg_gradient,
                max_gradient: stats.max_gradient,
                elevation_gain: stats.elevation_gain,
                start_elevation,
                end_elevation,
                region: segment.properties.region.clone(),
                geometry: segment.geometry.clone(),
                profile: stats.profile.clone(),
            }
        })
        .collect();

    info!(
        hills = hills.len(),
        min_length = criteria.min_length,
        min_gradient = criteria.min_gradient,
        min_elevation_gain = criteria.min_elevation_gain,
        "Identified hills"
    );
    hills
}
