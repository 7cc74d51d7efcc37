//! Hill records and their difficulty categories.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{HillError, Result};
use crate::geometry::{BoundingBox, RoadGeometry};

/// Difficulty category derived from a hill's average gradient.
///
/// Ordered from steepest to easiest, following cycling climb conventions
/// (`HC` is "hors catégorie").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "HC")]
    HorsCategorie,
    #[serde(rename = "1")]
    Cat1,
    #[serde(rename = "2")]
    Cat2,
    #[serde(rename = "3")]
    Cat3,
    #[serde(rename = "4")]
    Cat4,
}

impl Category {
    /// All categories, steepest first.
    pub const ALL: [Category; 5] = [
        Category::HorsCategorie,
        Category::Cat1,
        Category::Cat2,
        Category::Cat3,
        Category::Cat4,
    ];

    /// Classify an average gradient in percent.
    ///
    /// # Examples
    ///
    /// ```
    /// use hillgrade::Category;
    ///
    /// assert_eq!(Category::from_gradient(12.0), Category::HorsCategorie);
    /// assert_eq!(Category::from_gradient(7.0), Category::Cat1);
    /// assert_eq!(Category::from_gradient(4.9), Category::Cat3);
    /// assert_eq!(Category::from_gradient(1.0).as_str(), "4");
    /// ```
    pub fn from_gradient(avg_gradient: f64) -> Self {
        if avg_gradient >= 10.0 {
            Category::HorsCategorie
        } else if avg_gradient >= 7.0 {
            Category::Cat1
        } else if avg_gradient >= 5.0 {
            Category::Cat2
        } else if avg_gradient >= 3.0 {
            Category::Cat3
        } else {
            Category::Cat4
        }
    }

    /// The stored label: `"HC"`, `"1"`, `"2"`, `"3"` or `"4"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::HorsCategorie => "HC",
            Category::Cat1 => "1",
            Category::Cat2 => "2",
            Category::Cat3 => "3",
            Category::Cat4 => "4",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown hill category {:?}", s))
    }
}

/// One point of an elevation profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfilePoint {
    /// Distance from the start of the road, in metres.
    pub distance: f64,
    /// Elevation in metres.
    pub elevation: f64,
}

impl ProfilePoint {
    pub fn new(distance: f64, elevation: f64) -> Self {
        Self {
            distance,
            elevation,
        }
    }
}

/// Encode a profile as JSON text: `[[distance, elevation], ...]`.
pub fn encode_profile(profile: &[ProfilePoint]) -> Result<String> {
    let pairs: Vec<(f64, f64)> = profile.iter().map(|p| (p.distance, p.elevation)).collect();
    Ok(serde_json::to_string(&pairs)?)
}

/// Decode a profile from text.
///
/// Accepts the JSON form written by [`encode_profile`] and the tuple form
/// `[(0.0, 12.5), (10.0, 13.1)]` found in older hill files.
///
/// # Examples
///
/// ```
/// use hillgrade::hill::decode_profile;
///
/// let profile = decode_profile("[(0, 12.5), (10.0, 13.0)]").unwrap();
/// assert_eq!(profile.len(), 2);
/// assert_eq!(profile[1].elevation, 13.0);
/// ```
pub fn decode_profile(text: &str) -> Result<Vec<ProfilePoint>> {
    let trimmed = text.trim();
    let pairs: Vec<(f64, f64)> = match serde_json::from_str(trimmed) {
        Ok(pairs) => pairs,
        Err(_) => serde_json::from_str(&trimmed.replace('(', "[").replace(')', "]"))?,
    };
    Ok(pairs
        .into_iter()
        .map(|(distance, elevation)| ProfilePoint::new(distance, elevation))
        .collect())
}

/// A classified hill, ready to be imported into the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Hill {
    pub name: String,
    /// Identifier of the road the hill was derived from.
    pub road_id: String,
    pub category: Category,
    pub length_m: f64,
    pub avg_gradient: f64,
    pub max_gradient: f64,
    pub elevation_gain: f64,
    pub start_elevation: f64,
    pub end_elevation: f64,
    pub region: String,
    pub geometry: RoadGeometry,
    pub profile: Vec<ProfilePoint>,
}

impl Hill {
    /// Bounding box of the hill's geometry.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.geometry.bounding_box()
    }

    /// Check the record before it is persisted.
    ///
    /// Rejects non-finite numbers, negative lengths and gains, and empty or
    /// degenerate geometries.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let numbers = [
            ("length_m", self.length_m),
            ("avg_gradient", self.avg_gradient),
            ("max_gradient", self.max_gradient),
            ("elevation_gain", self.elevation_gain),
            ("start_elevation", self.start_elevation),
            ("end_elevation", self.end_elevation),
        ];
        if let Some((field, value)) = numbers.iter().find(|(_, v)| !v.is_finite()) {
            return Err(format!("{} is not finite ({})", field, value));
        }
        if self.length_m < 0.0 || self.elevation_gain < 0.0 {
            return Err("length and elevation gain must not be negative".to_string());
        }
        if self.avg_gradient < 0.0 || self.max_gradient < 0.0 {
            return Err("gradients must not be negative".to_string());
        }
        if self
            .profile
            .iter()
            .any(|p| !p.distance.is_finite() || !p.elevation.is_finite())
        {
            return Err("profile contains non-finite values".to_string());
        }
        self.geometry.validate().map_err(|e| e.to_string())?;
        self.bounding_box()
            .filter(|b| [b.min_x, b.max_x, b.min_y, b.max_y].iter().all(|v| v.is_finite()))
            .ok_or_else(|| "geometry has no finite bounds".to_string())?;
        Ok(())
    }
}

/// Start and end elevation of a profile, or zero when it is empty.
pub fn profile_endpoints(profile: &[ProfilePoint]) -> (f64, f64) {
    match (profile.first(), profile.last()) {
        (Some(first), Some(last)) => (first.elevation, last.elevation),
        _ => (0.0, 0.0),
    }
}

pub(crate) fn invalid_hill(index: usize, reason: impl Into<String>) -> HillError {
    HillError::InvalidHill {
        index,
        reason: reason.into(),
    }
}
