//! SQLite-backed hill store with an R*Tree bounding-box index.
//!
//! # Schema
//!
//! - `hills` holds one row per hill: attributes, the geometry as WKT, and the
//!   exact bounding box.
//! - `elevation_profiles` holds the profile points keyed by `(hill_id, seq)`.
//! - `idx_hills_bbox` is an R*Tree virtual table over the bounding boxes.
//!
//! The R*Tree stores 32-bit floats rounded outwards, so it can only widen a
//! box. Spatial queries use it to prune candidates and then test the exact
//! columns.
//!
//! # Concurrency
//!
//! The database runs in WAL mode. [`HillStore::import_hills`] replaces the
//! whole collection in one transaction, so other connections keep seeing the
//! previous import until it commits. Multi-statement reads run inside a
//! read transaction to get a consistent snapshot.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Value, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, ToSql};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::geometry::{BoundingBox, RoadGeometry};
use crate::hill::{invalid_hill, Category, Hill, ProfilePoint};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS hills (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        road_id TEXT NOT NULL,
        category TEXT NOT NULL,
        length_m REAL NOT NULL,
        avg_gradient REAL NOT NULL,
        max_gradient REAL NOT NULL,
        elevation_gain REAL NOT NULL,
        start_elevation REAL NOT NULL,
        end_elevation REAL NOT NULL,
        region TEXT NOT NULL,
        geometry TEXT NOT NULL,
        min_x REAL NOT NULL,
        max_x REAL NOT NULL,
        min_y REAL NOT NULL,
        max_y REAL NOT NULL
    );

    CREATE TABLE IF NOT EXISTS elevation_profiles (
        hill_id INTEGER NOT NULL REFERENCES hills(id) ON DELETE CASCADE,
        seq INTEGER NOT NULL,
        distance REAL NOT NULL,
        elevation REAL NOT NULL,
        PRIMARY KEY (hill_id, seq)
    );

    CREATE INDEX IF NOT EXISTS idx_hills_category ON hills(category);
    CREATE INDEX IF NOT EXISTS idx_hills_region ON hills(region);

    CREATE VIRTUAL TABLE IF NOT EXISTS idx_hills_bbox
        USING rtree(id, min_x, max_x, min_y, max_y);
"#;

const HILL_COLUMNS: &str = "h.id, h.name, h.road_id, h.category, h.length_m, h.avg_gradient, \
     h.max_gradient, h.elevation_gain, h.start_elevation, h.end_elevation, h.region, \
     h.geometry, h.min_x, h.max_x, h.min_y, h.max_y";

impl ToSql for Category {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Category {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// Optional filters for [`HillStore::search_hills`]. Unset filters match everything.
///
/// # Example
///
/// ```
/// use hillgrade::{BoundingBox, Category, SearchFilters};
///
/// let filters = SearchFilters {
///     min_gradient: Some(5.0),
///     category: Some(Category::Cat1),
///     bbox: Some(BoundingBox::new(520000.0, 530000.0, 6170000.0, 6180000.0)),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilters {
    /// Minimum average gradient (%).
    pub min_gradient: Option<f64>,
    /// Maximum average gradient (%).
    pub max_gradient: Option<f64>,
    /// Minimum length (m).
    pub min_length: Option<f64>,
    /// Maximum length (m).
    pub max_length: Option<f64>,
    pub category: Option<Category>,
    pub region: Option<String>,
    /// Only hills whose bounding box intersects this one.
    pub bbox: Option<BoundingBox>,
}

/// A stored hill without its profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HillSummary {
    pub id: i64,
    pub name: String,
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
    pub bbox: BoundingBox,
}

/// A stored hill with its elevation profile ordered by distance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HillDetail {
    #[serde(flatten)]
    pub hill: HillSummary,
    pub elevation_profile: Vec<ProfilePoint>,
}

/// Minimum, maximum and mean of a column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ColumnStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// Aggregate figures over all stored hills.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HillStatistics {
    pub total_hills: usize,
    pub total_length_m: f64,
    /// Average gradient statistics; `None` when the store is empty.
    pub gradient: Option<ColumnStats>,
    /// Length statistics; `None` when the store is empty.
    pub length: Option<ColumnStats>,
    pub categories: BTreeMap<String, usize>,
    pub regions: BTreeMap<String, usize>,
}

/// Hill persistence and queries.
pub struct HillStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl HillStore {
    /// Open (creating if needed) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::HillError::Persistence`] if the database cannot be
    /// opened or its schema created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self::init(conn, Some(path.to_path_buf()))?;
        debug!(path = %path.display(), "Opened hill store");
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        // journal_mode answers with the resulting mode ("memory" for in-memory databases)
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn, path })
    }

    /// Database file, or `None` for an in-memory store.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Replace every stored hill with `hills`.
    ///
    /// Hills get ids `1..=hills.len()` in input order. The old hills, their
    /// profiles and index entries are deleted and the new ones inserted in a
    /// single transaction: if any hill is rejected, nothing changes.
    ///
    /// # Errors
    ///
    /// - [`crate::HillError::InvalidHill`] if a hill fails [`Hill::validate`]
    /// - [`crate::HillError::Persistence`] on database failure
    pub fn import_hills(&mut self, hills: &[Hill]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(
            "DELETE FROM elevation_profiles;
             DELETE FROM idx_hills_bbox;
             DELETE FROM hills;",
        )?;

        {
            let mut insert_hill = tx.prepare(
                "INSERT INTO hills (
                    id, name, road_id, category, length_m, avg_gradient, max_gradient,
                    elevation_gain, start_elevation, end_elevation, region, geometry,
                    min_x, max_x, min_y, max_y
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            )?;
            let mut insert_bbox = tx.prepare(
                "INSERT INTO idx_hills_bbox (id, min_x, max_x, min_y, max_y)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            let mut insert_point = tx.prepare(
                "INSERT INTO elevation_profiles (hill_id, seq, distance, elevation)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;

            for (index, hill) in hills.iter().enumerate() {
                hill.validate().map_err(|reason| invalid_hill(index, reason))?;
                let bbox = hill
                    .bounding_box()
                    .ok_or_else(|| invalid_hill(index, "empty geometry"))?;
                let id = index as i64 + 1;

                insert_hill.execute(params![
                    id,
                    hill.name,
                    hill.road_id,
                    hill.category,
                    hill.length_m,
                    hill.avg_gradient,
                    hill.max_gradient,
                    hill.elevation_gain,
                    hill.start_elevation,
                    hill.end_elevation,
                    hill.region,
                    hill.geometry.to_wkt(),
                    bbox.min_x,
                    bbox.max_x,
                    bbox.min_y,
                    bbox.max_y,
                ])?;
                insert_bbox.execute(params![id, bbox.min_x, bbox.max_x, bbox.min_y, bbox.max_y])?;

                for (seq, point) in hill.profile.iter().enumerate() {
                    insert_point.execute(params![id, seq as i64, point.distance, point.elevation])?;
                }
            }
        }

        tx.commit()?;
        info!(hills = hills.len(), "Imported hills into database");
        Ok(hills.len())
    }

    /// Find hills matching every set filter, ordered by id.
    ///
    /// With a bounding box, candidates come from the R*Tree index and are
    /// then checked against the exact bounds: a hill is returned when its
    /// box intersects the query box (touching edges count).
    pub fn search_hills(&self, filters: &SearchFilters) -> Result<Vec<HillSummary>> {
        let mut sql = format!("SELECT {} FROM hills h", HILL_COLUMNS);
        let mut clauses: Vec<&str> = Vec::new();
        let mut args: Vec<Value> = Vec::new();

        if let Some(bbox) = &filters.bbox {
            sql.push_str(" JOIN idx_hills_bbox i ON i.id = h.id");
            clauses.push("i.min_x <= ? AND i.max_x >= ? AND i.min_y <= ? AND i.max_y >= ?");
            clauses.push("h.min_x <= ? AND h.max_x >= ? AND h.min_y <= ? AND h.max_y >= ?");
            for _ in 0..2 {
                args.extend([
                    Value::Real(bbox.max_x),
                    Value::Real(bbox.min_x),
                    Value::Real(bbox.max_y),
                    Value::Real(bbox.min_y),
                ]);
            }
        }

        let scalar = [
            ("h.avg_gradient >= ?", filters.min_gradient),
            ("h.avg_gradient <= ?", filters.max_gradient),
            ("h.length_m >= ?", filters.min_length),
            ("h.length_m <= ?", filters.max_length),
        ];
        for (clause, value) in scalar {
            if let Some(value) = value {
                clauses.push(clause);
                args.push(Value::Real(value));
            }
        }
        if let Some(category) = filters.category {
            clauses.push("h.category = ?");
            args.push(Value::Text(category.as_str().to_string()));
        }
        if let Some(region) = &filters.region {
            clauses.push("h.region = ?");
            args.push(Value::Text(region.clone()));
        }

        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY h.id");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(args), StoredHill::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let hills = rows
            .into_iter()
            .map(StoredHill::into_summary)
            .collect::<Result<Vec<_>>>()?;
        debug!(results = hills.len(), "Hill search");
        Ok(hills)
    }

    /// Every stored hill, ordered by id.
    pub fn all_hills(&self) -> Result<Vec<HillSummary>> {
        self.search_hills(&SearchFilters::default())
    }

    /// Full attributes and profile of one hill, or `None` if no hill has this id.
    pub fn get_hill_details(&self, id: i64) -> Result<Option<HillDetail>> {
        let tx = self.conn.unchecked_transaction()?;

        let row = tx
            .query_row(
                &format!("SELECT {} FROM hills h WHERE h.id = ?1", HILL_COLUMNS),
                params![id],
                StoredHill::from_row,
            )
            .optional()?;
        let Some(row) = row else {
            return Ok(None);
        };

        let elevation_profile = load_profile(&tx, id)?;
        Ok(Some(HillDetail {
            hill: row.into_summary()?,
            elevation_profile,
        }))
    }

    /// Profile of one hill ordered by distance; empty if the hill has none.
    pub fn hill_profile(&self, id: i64) -> Result<Vec<ProfilePoint>> {
        load_profile(&self.conn, id)
    }

    /// Number of stored hills.
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM hills", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Aggregate statistics, computed from the stored rows on every call.
    pub fn get_statistics(&self) -> Result<HillStatistics> {
        let tx = self.conn.unchecked_transaction()?;

        let (total, total_length): (i64, f64) = tx.query_row(
            "SELECT COUNT(*), COALESCE(SUM(length_m), 0.0) FROM hills",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let gradient = column_stats(&tx, "avg_gradient")?;
        let length = column_stats(&tx, "length_m")?;
        let categories = group_counts(&tx, "category")?;
        let regions = group_counts(&tx, "region")?;

        Ok(HillStatistics {
            total_hills: total as usize,
            total_length_m: total_length,
            gradient,
            length,
            categories,
            regions,
        })
    }
}

/// A `hills` row before geometry decoding.
struct StoredHill {
    id: i64,
    name: String,
    road_id: String,
    category: Category,
    length_m: f64,
    avg_gradient: f64,
    max_gradient: f64,
    elevation_gain: f64,
    start_elevation: f64,
    end_elevation: f64,
    region: String,
    geometry: String,
    bbox: BoundingBox,
}

impl StoredHill {
    /// Read a row selected with [`HILL_COLUMNS`].
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            road_id: row.get(2)?,
            category: row.get(3)?,
            length_m: row.get(4)?,
            avg_gradient: row.get(5)?,
            max_gradient: row.get(6)?,
            elevation_gain: row.get(7)?,
            start_elevation: row.get(8)?,
            end_elevation: row.get(9)?,
            region: row.get(10)?,
            geometry: row.get(11)?,
            bbox: BoundingBox {
                min_x: row.get(12)?,
                max_x: row.get(13)?,
                min_y: row.get(14)?,
                max_y: row.get(15)?,
            },
        })
    }

    fn into_summary(self) -> Result<HillSummary> {
        Ok(HillSummary {
            id: self.id,
            name: self.name,
            road_id: self.road_id,
            category: self.category,
            length_m: self.length_m,
            avg_gradient: self.avg_gradient,
            max_gradient: self.max_gradient,
            elevation_gain: self.elevation_gain,
            start_elevation: self.start_elevation,
            end_elevation: self.end_elevation,
            region: self.region,
            geometry: RoadGeometry::from_wkt(&self.geometry)?,
            bbox: self.bbox,
        })
    }
}

fn load_profile(conn: &Connection, id: i64) -> Result<Vec<ProfilePoint>> {
    let mut stmt = conn.prepare_cached(
        "SELECT distance, elevation FROM elevation_profiles
         WHERE hill_id = ?1 ORDER BY distance, seq",
    )?;
    let profile = stmt
        .query_map(params![id], |row| {
            Ok(ProfilePoint::new(row.get(0)?, row.get(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(profile)
}

/// `column` is one of a fixed set of names, never user input.
fn column_stats(conn: &Connection, column: &str) -> Result<Option<ColumnStats>> {
    let (min, max, mean): (Option<f64>, Option<f64>, Option<f64>) = conn.query_row(
        &format!("SELECT MIN({0}), MAX({0}), AVG({0}) FROM hills", column),
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;
    Ok(match (min, max, mean) {
        (Some(min), Some(max), Some(mean)) => Some(ColumnStats { min, max, mean }),
        _ => None,
    })
}

fn group_counts(conn: &Connection, column: &str) -> Result<BTreeMap<String, usize>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {0}, COUNT(*) FROM hills GROUP BY {0}",
        column
    ))?;
    let counts = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize)))?
        .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;
    Ok(counts)
}
