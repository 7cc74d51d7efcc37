//! Road network ingestion.
//!
//! Roads arrive as a GeoJSON FeatureCollection of line features whose
//! properties follow OpenStreetMap tagging. Properties are read once into
//! [`RoadProperties`] with explicit defaults, so later stages never look
//! attributes up by name.

use std::collections::BTreeMap;
use std::path::Path;

use geojson::{feature::Id, Feature, FeatureCollection, GeoJson, JsonObject, JsonValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{HillError, Result};
use crate::geometry::RoadGeometry;
use crate::gradient::SegmentStats;

/// Highway class assumed when a road has none.
pub const DEFAULT_HIGHWAY: &str = "unclassified";

/// Region assumed when a road has none.
pub const DEFAULT_REGION: &str = "Unknown";

/// Attributes of a road, with defaults applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadProperties {
    /// The `road_id` property, else the feature id, else the feature's index.
    pub road_id: String,
    pub name: Option<String>,
    /// OSM highway class, `"unclassified"` when missing.
    pub highway: String,
    pub surface: Option<String>,
    /// Speed limit as tagged, e.g. `"50"` or `"30 mph"`.
    pub maxspeed: Option<String>,
    /// Region label, `"Unknown"` when missing.
    pub region: String,
}

impl RoadProperties {
    /// Properties with the given id and every other field defaulted.
    pub fn with_id(road_id: impl Into<String>) -> Self {
        Self {
            road_id: road_id.into(),
            name: None,
            highway: DEFAULT_HIGHWAY.to_string(),
            surface: None,
            maxspeed: None,
            region: DEFAULT_REGION.to_string(),
        }
    }

    /// Read properties from a GeoJSON feature.
    ///
    /// `index` is the feature's position in its collection, used as the id
    /// when the feature carries none. Numeric values are accepted for
    /// string fields and blank strings count as missing.
    pub fn from_feature(feature: &Feature, index: usize) -> Self {
        let props = feature.properties.as_ref();
        let get = |key: &str| props.and_then(|p| string_property(p, key));

        let road_id = get("road_id")
            .or_else(|| {
                feature.id.as_ref().map(|id| match id {
                    Id::String(s) => s.clone(),
                    Id::Number(n) => n.to_string(),
                })
            })
            .or_else(|| get("id"))
            .unwrap_or_else(|| index.to_string());

        Self {
            road_id,
            name: get("name"),
            highway: get("highway").unwrap_or_else(|| DEFAULT_HIGHWAY.to_string()),
            surface: get("surface"),
            maxspeed: get("maxspeed"),
            region: get("region").unwrap_or_else(|| DEFAULT_REGION.to_string()),
        }
    }

    /// Speed limit in km/h, converting `mph` values.
    ///
    /// Returns `None` for missing or non-numeric limits such as `"signals"`.
    ///
    /// # Examples
    ///
    /// ```
    /// use hillgrade::RoadProperties;
    ///
    /// let mut props = RoadProperties::with_id("1");
    /// props.maxspeed = Some("30 mph".to_string());
    /// assert!((props.maxspeed_kmh().unwrap() - 48.28).abs() < 0.01);
    /// ```
    pub fn maxspeed_kmh(&self) -> Option<f64> {
        let raw = self.maxspeed.as_deref()?.trim();
        let (number, mph) = match raw.strip_suffix("mph") {
            Some(rest) => (rest.trim(), true),
            None => (raw.strip_suffix("km/h").unwrap_or(raw).trim(), false),
        };
        let value: f64 = number.parse().ok()?;
        Some(if mph { value * 1.609_344 } else { value })
    }

    /// Write these properties into a GeoJSON property map.
    pub fn write_to(&self, props: &mut JsonObject) {
        props.insert("road_id".into(), JsonValue::from(self.road_id.clone()));
        props.insert("name".into(), self.name.clone().into());
        props.insert("highway".into(), JsonValue::from(self.highway.clone()));
        props.insert("surface".into(), self.surface.clone().into());
        props.insert("maxspeed".into(), self.maxspeed.clone().into());
        props.insert("region".into(), JsonValue::from(self.region.clone()));
    }
}

pub(crate) fn string_property(props: &JsonObject, key: &str) -> Option<String> {
    match props.get(key)? {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub(crate) fn number_property(props: &JsonObject, key: &str) -> Option<f64> {
    match props.get(key)? {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A road with its geometry and, once computed, its gradient statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct RoadSegment {
    pub properties: RoadProperties,
    pub geometry: RoadGeometry,
    /// Geometry length in metres, known even when statistics are not.
    pub length_m: f64,
    /// `None` until computed, or when the segment was skipped.
    pub stats: Option<SegmentStats>,
}

impl RoadSegment {
    pub fn new(properties: RoadProperties, geometry: RoadGeometry) -> Self {
        let length_m = geometry.length();
        Self {
            properties,
            geometry,
            length_m,
            stats: None,
        }
    }
}

/// Load roads from a GeoJSON FeatureCollection.
///
/// # Arguments
///
/// * `path` - GeoJSON file of line features
/// * `coverage_epsg` - CRS of the elevation coverage, checked against the
///   collection's `crs` member when both are known
///
/// # Errors
///
/// - [`HillError::InputNotFound`] if the file does not exist
/// - [`HillError::CrsMismatch`] if the collection declares another CRS
/// - [`HillError::GeometryInvalid`] if a feature has no line geometry
pub fn load_roads(path: &Path, coverage_epsg: Option<u32>) -> Result<Vec<RoadSegment>> {
    if !path.exists() {
        return Err(HillError::InputNotFound {
            path: path.to_path_buf(),
        });
    }

    info!(path = %path.display(), "Loading road data");
    let text = std::fs::read_to_string(path)?;
    let collection = FeatureCollection::try_from(text.parse::<GeoJson>()?)?;

    check_crs(&collection, coverage_epsg)?;
    let segments = roads_from_collection(collection)?;

    info!(segments = segments.len(), "Loaded road segments");
    Ok(segments)
}

/// Convert a feature collection into road segments.
pub fn roads_from_collection(collection: FeatureCollection) -> Result<Vec<RoadSegment>> {
    collection
        .features
        .into_iter()
        .enumerate()
        .map(|(index, feature)| {
            let properties = RoadProperties::from_feature(&feature, index);
            let geometry = feature.geometry.ok_or_else(|| HillError::GeometryInvalid {
                reason: format!("road {} has no geometry", properties.road_id),
            })?;
            let geometry =
                RoadGeometry::from_geojson(geometry).map_err(|e| HillError::GeometryInvalid {
                    reason: format!("road {}: {}", properties.road_id, e),
                })?;
            Ok(RoadSegment::new(properties, geometry))
        })
        .collect()
}

/// EPSG code declared by a collection's legacy `crs` member, if any.
///
/// Understands `EPSG:25832`, `urn:ogc:def:crs:EPSG::25832` and the OGC
/// `CRS84` name (reported as 4326).
pub fn declared_epsg(collection: &FeatureCollection) -> Option<u32> {
    let name = collection
        .foreign_members
        .as_ref()?
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()?;

    if name.ends_with("CRS84") {
        return Some(4326);
    }
    let upper = name.to_ascii_uppercase();
    let code = upper.rsplit_once("EPSG")?.1.trim_start_matches(':');
    code.parse().ok()
}

fn check_crs(collection: &FeatureCollection, coverage_epsg: Option<u32>) -> Result<()> {
    match (coverage_epsg.filter(|e| *e != 0), declared_epsg(collection)) {
        (Some(expected), Some(found)) if expected != found => {
            Err(HillError::CrsMismatch { expected, found })
        }
        (expected, found) => {
            debug!(?expected, ?found, "Road CRS check passed");
            Ok(())
        }
    }
}

/// Aggregate figures over a processed road network.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetworkSummary {
    pub total_roads: usize,
    /// Roads for which statistics were computed.
    pub roads_with_stats: usize,
    /// Road counts by highway class.
    pub highway_types: BTreeMap<String, usize>,
    /// Length of all roads, in kilometres, rounded to 10 m.
    pub total_length_km: f64,
    /// Average gradient over roads with statistics.
    pub gradient: Option<ValueRange>,
    /// Elevation extremes over roads with statistics.
    pub elevation_range: Option<ValueRange>,
}

/// Minimum, maximum and (where meaningful) mean of a set of values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
}

/// Summarise a processed road network.
pub fn summarize_network(segments: &[RoadSegment]) -> NetworkSummary {
    let mut highway_types = BTreeMap::new();
    for segment in segments {
        *highway_types
            .entry(segment.properties.highway.clone())
            .or_insert(0) += 1;
    }

    let stats: Vec<&SegmentStats> = segments.iter().filter_map(|s| s.stats.as_ref()).collect();
    let total_length_m: f64 = segments.iter().map(|s| s.length_m).sum();

    let gradient = (!stats.is_empty()).then(|| {
        let values = stats.iter().map(|s| s.avg_gradient);
        ValueRange {
            min: values.clone().fold(f64::INFINITY, f64::min),
            max: values.clone().fold(f64::NEG_INFINITY, f64::max),
            mean: Some(values.sum::<f64>() / stats.len() as f64),
        }
    });
    let elevation_range = (!stats.is_empty()).then(|| ValueRange {
        min: stats.iter().map(|s| s.min_elevation).fold(f64::INFINITY, f64::min),
        max: stats
            .iter()
            .map(|s| s.max_elevation)
            .fold(f64::NEG_INFINITY, f64::max),
        mean: None,
    });

    NetworkSummary {
        total_roads: segments.len(),
        roads_with_stats: stats.len(),
        highway_types,
        total_length_km: (total_length_m / 10.0).round() / 100.0,
        gradient,
        elevation_range,
    }
}
