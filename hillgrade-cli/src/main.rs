use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use hillgrade::Config;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// Road gradient and hill statistics tool
#[derive(Parser)]
#[command(name = "hillgrade")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Root data directory (tiles, roads and intermediate files)
    #[arg(short, long, env = "HILLGRADE_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// SQLite hill database
    #[arg(long, env = "HILLGRADE_DB_PATH", global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run processing steps: merge tiles, compute gradients, find hills, import
    Process(ProcessArgs),

    /// Query elevation at a projected coordinate
    Elevation {
        /// Easting in the coverage CRS
        #[arg(long)]
        x: f64,

        /// Northing in the coverage CRS
        #[arg(long)]
        y: f64,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Search stored hills
    Search(SearchArgs),

    /// Show one stored hill with its elevation profile
    Show {
        /// Hill id
        id: i64,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show statistics over all stored hills
    Stats {
        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// List available DTM tiles
    List,
}

#[derive(Args)]
struct ProcessArgs {
    /// Merge DTM tiles into one coverage
    #[arg(long)]
    merge_dtm: bool,

    /// Compute gradient statistics for the road network
    #[arg(long)]
    process_roads: bool,

    /// Select and classify hills from processed roads
    #[arg(long)]
    identify_hills: bool,

    /// Import identified hills into the database
    #[arg(long)]
    import_database: bool,

    /// Run every step
    #[arg(long)]
    all: bool,

    /// Keep going with later steps when one fails
    #[arg(long)]
    continue_on_error: bool,

    /// Directory of DTM tiles
    #[arg(long, env = "HILLGRADE_DTM_DIR")]
    dtm_dir: Option<PathBuf>,

    /// Road network GeoJSON
    #[arg(long, env = "HILLGRADE_ROADS_FILE")]
    roads_file: Option<PathBuf>,

    /// Metres between elevation samples
    #[arg(long)]
    sample_distance: Option<f64>,

    /// Use raw elevations instead of smoothed profiles
    #[arg(long)]
    no_smoothing: bool,

    /// Minimum hill length in metres
    #[arg(long)]
    min_length: Option<f64>,

    /// Minimum average hill gradient in percent
    #[arg(long)]
    min_gradient: Option<f64>,

    /// Minimum hill elevation gain in metres
    #[arg(long)]
    min_elevation_gain: Option<f64>,
}

#[derive(Args)]
struct SearchArgs {
    /// Minimum average gradient (%)
    #[arg(long)]
    min_gradient: Option<f64>,

    /// Maximum average gradient (%)
    #[arg(long)]
    max_gradient: Option<f64>,

    /// Minimum length (m)
    #[arg(long)]
    min_length: Option<f64>,

    /// Maximum length (m)
    #[arg(long)]
    max_length: Option<f64>,

    /// Category: HC, 1, 2, 3 or 4
    #[arg(long)]
    category: Option<String>,

    /// Region name
    #[arg(long)]
    region: Option<String>,

    /// Bounding box as min_x,min_y,max_x,max_y
    #[arg(long, value_delimiter = ',', num_args = 4)]
    bbox: Option<Vec<f64>>,

    /// Output results as a GeoJSON FeatureCollection
    #[arg(long, conflicts_with = "json")]
    geojson: bool,

    /// Output results as JSON
    #[arg(short, long)]
    json: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hillgrade=info,hillgrade_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env().context("Invalid HILLGRADE_* environment variable")?;
    if let Some(dir) = cli.data_dir {
        config = config.data_dir(dir);
    }
    if let Some(db) = cli.db {
        config = config.db_path(db);
    }

    match cli.command {
        Commands::Process(args) => {
            if let Some(dir) = args.dtm_dir {
                config = config.dtm_dir(dir);
            }
            if let Some(file) = args.roads_file {
                config = config.roads_file(file);
            }
            if let Some(d) = args.sample_distance {
                config = config.sample_distance(d);
            }
            if args.no_smoothing {
                config = config.smoothing(false);
            }
            if let Some(v) = args.min_length {
                config = config.min_length(v);
            }
            if let Some(v) = args.min_gradient {
                config = config.min_gradient(v);
            }
            if let Some(v) = args.min_elevation_gain {
                config = config.min_elevation_gain(v);
            }

            let steps = commands::process::Steps {
                merge_dtm: args.all || args.merge_dtm,
                process_roads: args.all || args.process_roads,
                identify_hills: args.all || args.identify_hills,
                import_database: args.all || args.import_database,
                continue_on_error: args.continue_on_error,
            };
            commands::process::run(&config, steps)
        }
        Commands::Elevation { x, y, json } => commands::elevation::run(&config, x, y, json),
        Commands::Search(args) => {
            let filters = commands::search::Filters {
                min_gradient: args.min_gradient,
                max_gradient: args.max_gradient,
                min_length: args.min_length,
                max_length: args.max_length,
                category: args.category,
                region: args.region,
                bbox: args.bbox,
            };
            let format = if args.geojson {
                commands::search::Format::GeoJson
            } else if args.json {
                commands::search::Format::Json
            } else {
                commands::search::Format::Table
            };
            commands::search::run(&config, filters, format)
        }
        Commands::Show { id, json } => commands::show::run(&config, id, json),
        Commands::Stats { json } => commands::stats::run(&config, json),
        Commands::List => commands::list::run(&config),
    }
}
