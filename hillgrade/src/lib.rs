//! # hillgrade - Road Gradients and Hills from Elevation Rasters
//!
//! Library for computing road gradient statistics from tiled digital terrain
//! models and cataloguing the resulting hills in a spatially indexed store.
//!
//! ## Features
//!
//! - **Coverage building**: Merges GeoTIFF tiles (loose or inside zip
//!   archives) into one memory-mapped raster
//! - **Lazy sampling**: Point and along-line elevation lookups, with a
//!   separate read handle per worker thread
//! - **Gradient engine**: Savitzky-Golay smoothed profiles, multi-part
//!   geometries, parallel network processing with rayon
//! - **Hill store**: SQLite with an R*Tree bounding-box index, atomic imports
//!
//! ## Quick Start
//!
//! ```ignore
//! use hillgrade::{classify_hills, compute_network, load_roads, Config, HillStore};
//!
//! let config = Config::from_env()?;
//! let service = config.elevation_service();
//!
//! let mut roads = load_roads(&config.roads_path(), Some(service.coverage_info()?.epsg))?;
//! compute_network(&service, &mut roads, &config.gradient_options(), None)?;
//!
//! let hills = classify_hills(&roads, &config.hill_criteria());
//! let mut store = HillStore::open(config.database_path())?;
//! store.import_hills(&hills)?;
//! ```
//!
//! ## Coordinates
//!
//! Roads, tiles and the store share one projected, metric CRS (for Danish
//! data ETRS89 / UTM 32N, EPSG:25832). Lengths, sample distances and
//! bounding boxes are all in metres of that CRS; nothing is reprojected.
//!
//! ## Hill Categories
//!
//! | Category | Average gradient |
//! |---|---|
//! | `HC` | ≥ 10 % |
//! | `1` | ≥ 7 % |
//! | `2` | ≥ 5 % |
//! | `3` | ≥ 3 % |
//! | `4` | < 3 % |

pub mod config;
pub mod coverage;
pub mod error;
pub mod filename;
pub mod geojson;
pub mod geometry;
pub mod gradient;
pub mod hill;
pub mod merge;
pub mod roads;
pub mod service;
pub mod smoothing;
pub mod store;
pub mod tile;

// Re-export main types at crate root for convenience
pub use config::Config;
pub use coverage::{Coverage, CoverageInfo, ElevationSource};
pub use error::{HillError, Result};
pub use geometry::{BoundingBox, RoadGeometry};
pub use gradient::{
    classify_hills, compute_network, compute_segment_stats, gradient_profile, GradientOptions,
    HillCriteria, NetworkReport, PartAggregation, SegmentStats,
};
pub use hill::{Category, Hill, ProfilePoint};
pub use merge::build_coverage;
pub use roads::{load_roads, RoadProperties, RoadSegment};
pub use service::{ElevationService, ElevationServiceBuilder, ProfileSample};
pub use store::{HillDetail, HillStatistics, HillStore, HillSummary, SearchFilters};
pub use tile::{DemTile, RasterGeometry, TileSource};
