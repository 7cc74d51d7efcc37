//! GeoJSON files for processed roads and hills.
//!
//! Processed roads and hills are exchanged as FeatureCollections with flat
//! numeric properties. The elevation profile is stored as JSON text in the
//! `elevation_profile` property (see [`encode_profile`]) so the files stay
//! readable by GIS tools that only handle scalar attributes.
//!
//! # Example
//!
//! ```ignore
//! use hillgrade::geojson::{read_hills, write_hills};
//!
//! write_hills(Path::new("data/hills.geojson"), &hills, Some(25832))?;
//! let hills = read_hills(Path::new("data/hills.geojson"))?;
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, JsonValue};
use tracing::{info, warn};

use crate::error::{HillError, Result};
use crate::geometry::RoadGeometry;
use crate::gradient::SegmentStats;
use crate::hill::{decode_profile, encode_profile, profile_endpoints, Category, Hill, ProfilePoint};
use crate::roads::{number_property, string_property, RoadProperties, RoadSegment, DEFAULT_REGION};
use crate::store::HillSummary;

/// Property holding the profile text.
pub const PROFILE_PROPERTY: &str = "elevation_profile";

/// Convert processed roads to a feature collection.
///
/// Roads without statistics keep their attributes and length; their
/// gradient properties are `null`.
pub fn roads_to_collection(segments: &[RoadSegment], epsg: Option<u32>) -> Result<FeatureCollection> {
    let features = segments
        .iter()
        .map(|segment| {
            let mut props = JsonObject::new();
            segment.properties.write_to(&mut props);
            props.insert("length_m".into(), JsonValue::from(segment.length_m));

            match &segment.stats {
                Some(stats) => write_stats(&mut props, stats)?,
                None => {
                    for key in [
                        "avg_gradient",
                        "max_gradient",
                        "elevation_gain",
                        "min_elevation",
                        "max_elevation",
                        PROFILE_PROPERTY,
                    ] {
                        props.insert(key.into(), JsonValue::Null);
                    }
                }
            }

            Ok(feature(segment.geometry.to_geojson(), props))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(collection(features, epsg))
}

fn write_stats(props: &mut JsonObject, stats: &SegmentStats) -> Result<()> {
    props.insert("avg_gradient".into(), JsonValue::from(stats.avg_gradient));
    props.insert("max_gradient".into(), JsonValue::from(stats.max_gradient));
    props.insert("elevation_gain".into(), JsonValue::from(stats.elevation_gain));
    props.insert("min_elevation".into(), JsonValue::from(stats.min_elevation));
    props.insert("max_elevation".into(), JsonValue::from(stats.max_elevation));
    props.insert(
        PROFILE_PROPERTY.into(),
        JsonValue::from(encode_profile(&stats.profile)?),
    );
    Ok(())
}

/// Convert hills to a feature collection.
pub fn hills_to_collection(hills: &[Hill], epsg: Option<u32>) -> Result<FeatureCollection> {
    let features = hills
        .iter()
        .map(|hill| {
            let mut props = JsonObject::new();
            props.insert("name".into(), JsonValue::from(hill.name.clone()));
            props.insert("road_id".into(), JsonValue::from(hill.road_id.clone()));
            props.insert("category".into(), JsonValue::from(hill.category.as_str()));
            props.insert("length_m".into(), JsonValue::from(hill.length_m));
            props.insert("avg_gradient".into(), JsonValue::from(hill.avg_gradient));
            props.insert("max_gradient".into(), JsonValue::from(hill.max_gradient));
            props.insert("elevation_gain".into(), JsonValue::from(hill.elevation_gain));
            props.insert("start_elevation".into(), JsonValue::from(hill.start_elevation));
            props.insert("end_elevation".into(), JsonValue::from(hill.end_elevation));
            props.insert("region".into(), JsonValue::from(hill.region.clone()));
            props.insert(
                PROFILE_PROPERTY.into(),
                JsonValue::from(encode_profile(&hill.profile)?),
            );
            Ok(feature(hill.geometry.to_geojson(), props))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(collection(features, epsg))
}

/// A stored hill as a feature whose id is the store id.
pub fn summary_feature(hill: &HillSummary) -> Feature {
    let mut props = JsonObject::new();
    props.insert("id".into(), JsonValue::from(hill.id));
    props.insert("name".into(), JsonValue::from(hill.name.clone()));
    props.insert("road_id".into(), JsonValue::from(hill.road_id.clone()));
    props.insert("category".into(), JsonValue::from(hill.category.as_str()));
    props.insert("length_m".into(), JsonValue::from(hill.length_m));
    props.insert("avg_gradient".into(), JsonValue::from(hill.avg_gradient));
    props.insert("max_gradient".into(), JsonValue::from(hill.max_gradient));
    props.insert("elevation_gain".into(), JsonValue::from(hill.elevation_gain));
    props.insert("region".into(), JsonValue::from(hill.region.clone()));

    let mut feature = feature(hill.geometry.to_geojson(), props);
    feature.id = Some(geojson::feature::Id::Number(hill.id.into()));
    feature
}

/// Search results as a feature collection.
pub fn summaries_to_collection(hills: &[HillSummary], epsg: Option<u32>) -> FeatureCollection {
    collection(hills.iter().map(summary_feature).collect(), epsg)
}

/// Write processed roads to a GeoJSON file.
pub fn write_processed_roads(path: &Path, segments: &[RoadSegment], epsg: Option<u32>) -> Result<()> {
    info!(path = %path.display(), roads = segments.len(), "Saving processed road data");
    write_collection(path, &roads_to_collection(segments, epsg)?)
}

/// Write hills to a GeoJSON file.
pub fn write_hills(path: &Path, hills: &[Hill], epsg: Option<u32>) -> Result<()> {
    info!(path = %path.display(), hills = hills.len(), "Saving identified hills");
    write_collection(path, &hills_to_collection(hills, epsg)?)
}

/// Read processed roads back, including any computed statistics.
pub fn read_processed_roads(path: &Path) -> Result<Vec<RoadSegment>> {
    processed_roads_from_collection(read_collection(path)?)
}

/// Convert a processed-roads collection back into segments.
///
/// A road has statistics when its `avg_gradient` property is a number.
pub fn processed_roads_from_collection(collection: FeatureCollection) -> Result<Vec<RoadSegment>> {
    collection
        .features
        .into_iter()
        .enumerate()
        .map(|(index, feature)| {
            let properties = RoadProperties::from_feature(&feature, index);
            let props = feature.properties.clone().unwrap_or_default();
            let geometry = feature_geometry(feature, index)?;

            let mut segment = RoadSegment::new(properties, geometry);
            segment.stats = read_stats(&props, segment.length_m, index);
            Ok(segment)
        })
        .collect()
}

fn read_stats(props: &JsonObject, length_m: f64, index: usize) -> Option<SegmentStats> {
    let avg_gradient = number_property(props, "avg_gradient")?;
    let profile = read_profile(props, index);
    let (start, end) = profile_endpoints(&profile);

    Some(SegmentStats {
        length_m: number_property(props, "length_m").unwrap_or(length_m),
        avg_gradient,
        max_gradient: number_property(props, "max_gradient").unwrap_or(avg_gradient),
        elevation_gain: number_property(props, "elevation_gain").unwrap_or(0.0),
        min_elevation: number_property(props, "min_elevation").unwrap_or(start.min(end)),
        max_elevation: number_property(props, "max_elevation").unwrap_or(start.max(end)),
        profile,
    })
}

/// Read hills from a GeoJSON file, filling in missing attributes.
///
/// Defaults: name `Hill <n>` (1-based feature position), road id the
/// feature's position, category from the average gradient, region
/// `Unknown`, numbers `0`, and start/end elevation from the first and last
/// profile points. An unreadable profile is logged and left empty.
pub fn read_hills(path: &Path) -> Result<Vec<Hill>> {
    let collection = read_collection(path)?;

    collection
        .features
        .into_iter()
        .enumerate()
        .map(|(index, feature)| {
            let props = feature.properties.clone().unwrap_or_default();
            let geometry = feature_geometry(feature, index)?;
            Ok(hill_from_properties(&props, geometry, index))
        })
        .collect()
}

fn hill_from_properties(props: &JsonObject, geometry: RoadGeometry, index: usize) -> Hill {
    let number = |key: &str| number_property(props, key).unwrap_or(0.0);
    let avg_gradient = number("avg_gradient");
    let profile = read_profile(props, index);
    let (first, last) = profile_endpoints(&profile);

    let category = string_property(props, "category")
        .and_then(|c| c.parse::<Category>().ok())
        .unwrap_or_else(|| Category::from_gradient(avg_gradient));

    Hill {
        name: string_property(props, "name").unwrap_or_else(|| format!("Hill {}", index + 1)),
        road_id: string_property(props, "road_id").unwrap_or_else(|| index.to_string()),
        category,
        length_m: number_property(props, "length_m").unwrap_or_else(|| geometry.length()),
        avg_gradient,
        max_gradient: number("max_gradient"),
        elevation_gain: number("elevation_gain"),
        start_elevation: number_property(props, "start_elevation").unwrap_or(first),
        end_elevation: number_property(props, "end_elevation").unwrap_or(last),
        region: string_property(props, "region").unwrap_or_else(|| DEFAULT_REGION.to_string()),
        geometry,
        profile,
    }
}

fn read_profile(props: &JsonObject, index: usize) -> Vec<ProfilePoint> {
    let decoded = match props.get(PROFILE_PROPERTY) {
        Some(JsonValue::String(text)) => decode_profile(text),
        Some(value @ JsonValue::Array(_)) => serde_json::from_value::<Vec<(f64, f64)>>(value.clone())
            .map(|pairs| pairs.into_iter().map(|(d, e)| ProfilePoint::new(d, e)).collect())
            .map_err(HillError::from),
        _ => return Vec::new(),
    };

    decoded.unwrap_or_else(|e| {
        warn!(feature = index, error = %e, "Could not read elevation profile");
        Vec::new()
    })
}

fn feature_geometry(feature: Feature, index: usize) -> Result<RoadGeometry> {
    let geometry = feature.geometry.ok_or_else(|| HillError::GeometryInvalid {
        reason: format!("feature {} has no geometry", index),
    })?;
    RoadGeometry::from_geojson(geometry).map_err(|e| HillError::GeometryInvalid {
        reason: format!("feature {}: {}", index, e),
    })
}

fn feature(geometry: geojson::Geometry, properties: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(geometry),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Wrap features in a collection, declaring the CRS when known.
pub fn collection(features: Vec<Feature>, epsg: Option<u32>) -> FeatureCollection {
    let foreign_members = epsg.filter(|e| *e != 0).map(|code| {
        let mut members = JsonObject::new();
        members.insert(
            "crs".into(),
            serde_json::json!({
                "type": "name",
                "properties": {"name": format!("urn:ogc:def:crs:EPSG::{}", code)}
            }),
        );
        members
    });

    FeatureCollection {
        bbox: None,
        features,
        foreign_members,
    }
}

/// Parse a GeoJSON FeatureCollection file.
pub fn read_collection(path: &Path) -> Result<FeatureCollection> {
    if !path.exists() {
        return Err(HillError::InputNotFound {
            path: path.to_path_buf(),
        });
    }
    let text = std::fs::read_to_string(path)?;
    Ok(FeatureCollection::try_from(text.parse::<GeoJson>()?)?)
}

fn write_collection(path: &Path, collection: &FeatureCollection) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, collection)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hill::test_support::sample_hill;
    use crate::roads::declared_epsg;
    use geo::line_string;
    use tempfile::TempDir;

    fn processed_segment() -> RoadSegment {
        let mut segment = RoadSegment::new(
            RoadProperties {
                name: Some("Kiddesvej".to_string()),
                highway: "tertiary".to_string(),
                ..RoadProperties::with_id("42")
            },
            RoadGeometry::Line(line_string![(x: 0.0, y: 0.0), (x: 20.0, y: 0.0)]),
        );
        segment.stats = Some(SegmentStats {
            length_m: 20.0,
            avg_gradient: 5.0,
            max_gradient: 6.0,
            elevation_gain: 1.0,
            min_elevation: 10.0,
            max_elevation: 11.0,
            profile: vec![
                ProfilePoint::new(0.0, 10.0),
                ProfilePoint::new(10.0, 10.6),
                ProfilePoint::new(20.0, 11.0),
            ],
        });
        segment
    }

    #[test]
    fn test_processed_roads_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("processed_roads.geojson");
        let unprocessed = RoadSegment::new(
            RoadProperties::with_id("43"),
            RoadGeometry::Line(line_string![(x: 0.0, y: 0.0), (x: 5.0, y: 0.0)]),
        );
        let segments = vec![processed_segment(), unprocessed];

        write_processed_roads(&path, &segments, Some(25832)).unwrap();
        let read = read_processed_roads(&path).unwrap();

        assert_eq!(read, segments);
    }

    #[test]
    fn test_null_stats_written_as_null() {
        let segment = RoadSegment::new(
            RoadProperties::with_id("43"),
            RoadGeometry::Line(line_string![(x: 0.0, y: 0.0), (x: 5.0, y: 0.0)]),
        );
        let collection = roads_to_collection(&[segment], None).unwrap();
        let props = collection.features[0].properties.as_ref().unwrap();

        assert_eq!(props.get("avg_gradient"), Some(&JsonValue::Null));
        assert_eq!(props.get("length_m"), Some(&JsonValue::from(5.0)));
        assert!(collection.foreign_members.is_none());
    }

    #[test]
    fn test_hills_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hills.geojson");
        let hills = vec![
            sample_hill("Himmelbjerget", 1000.0, 2000.0, 8.0),
            sample_hill("Ejer Bavnehøj", 3000.0, 4000.0, 11.0),
        ];

        write_hills(&path, &hills, Some(25832)).unwrap();
        let collection = read_collection(&path).unwrap();
        assert_eq!(declared_epsg(&collection), Some(25832));

        assert_eq!(read_hills(&path).unwrap(), hills);
    }

    #[test]
    fn test_read_hills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hills.geojson");
        std::fs::write(
            &path,
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature",
                 "properties": {"avg_gradient": 5.5, "elevation_profile": "[(0.0, 20.0), (100.0, 25.5)]"},
                 "geometry": {"type": "LineString", "coordinates": [[0, 0], [100, 0]]}},
                {"type": "Feature",
                 "properties": {"name": "Bad profile", "category": "HC", "elevation_profile": "oops"},
                 "geometry": {"type": "LineString", "coordinates": [[0, 0], [0, 50]]}}
            ]}"#,
        )
        .unwrap();

        let hills = read_hills(&path).unwrap();
        assert_eq!(hills.len(), 2);

        assert_eq!(hills[0].name, "Hill 1");
        assert_eq!(hills[0].road_id, "0");
        assert_eq!(hills[0].category, Category::Cat2);
        assert_eq!(hills[0].region, "Unknown");
        assert_eq!(hills[0].length_m, 100.0);
        assert_eq!(hills[0].start_elevation, 20.0);
        assert_eq!(hills[0].end_elevation, 25.5);
        assert_eq!(hills[0].profile.len(), 2);

        assert_eq!(hills[1].name, "Bad profile");
        assert_eq!(hills[1].category, Category::HorsCategorie);
        assert!(hills[1].profile.is_empty());
        assert_eq!(hills[1].start_elevation, 0.0);
    }

    #[test]
    fn test_summaries_to_collection() {
        let mut store = crate::store::HillStore::in_memory().unwrap();
        store
            .import_hills(&[sample_hill("Munkebjerg", 530000.0, 6175000.0, 8.5)])
            .unwrap();
        let hills = store.all_hills().unwrap();

        let collection = summaries_to_collection(&hills, Some(25832));
        assert_eq!(collection.features.len(), 1);
        let feature = &collection.features[0];
        assert_eq!(feature.id, Some(geojson::feature::Id::Number(1.into())));
        assert_eq!(
            feature.property("category").and_then(|v| v.as_str()),
            Some("1")
        );
        assert_eq!(declared_epsg(&collection), Some(25832));
    }

    #[test]
    fn test_read_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = read_hills(&dir.path().join("hills.geojson"));
        assert!(matches!(result, Err(HillError::InputNotFound { .. })));
    }
}
