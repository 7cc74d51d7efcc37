use anyhow::{bail, Context, Result};
use hillgrade::geojson::{
    processed_roads_from_collection, read_collection, read_hills, write_hills,
    write_processed_roads,
};
use hillgrade::roads::{declared_epsg, summarize_network};
use hillgrade::{build_coverage, classify_hills, compute_network, load_roads, Config, HillStore};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

/// Which pipeline steps to run.
pub struct Steps {
    pub merge_dtm: bool,
    pub process_roads: bool,
    pub identify_hills: bool,
    pub import_database: bool,
    pub continue_on_error: bool,
}

pub fn run(config: &Config, steps: Steps) -> Result<()> {
    let selected: [(&str, bool, fn(&Config) -> Result<()>); 4] = [
        ("merge-dtm", steps.merge_dtm, merge_dtm),
        ("process-roads", steps.process_roads, process_roads),
        ("identify-hills", steps.identify_hills, identify_hills),
        ("import-database", steps.import_database, import_database),
    ];

    if !selected.iter().any(|(_, enabled, _)| *enabled) {
        bail!(
            "No processing step selected. Use --all or any of --merge-dtm, --process-roads, \
             --identify-hills, --import-database"
        );
    }

    let mut failed = Vec::new();
    for (name, enabled, step) in selected {
        if !enabled {
            continue;
        }
        info!(step = name, "Starting step");
        match step(config) {
            Ok(()) => info!(step = name, "Step complete"),
            Err(e) if steps.continue_on_error => {
                error!(step = name, error = %format!("{:#}", e), "Step failed, continuing");
                failed.push(name);
            }
            Err(e) => return Err(e.context(format!("Step {} failed", name))),
        }
    }

    if !failed.is_empty() {
        bail!("Failed steps: {}", failed.join(", "));
    }
    println!("Processing completed successfully");
    Ok(())
}

fn merge_dtm(config: &Config) -> Result<()> {
    let output = build_coverage(&config.dtm_dir_path(), &config.coverage_path())
        .context("Failed to merge DTM tiles")?;
    println!("Coverage: {}", output.display());
    Ok(())
}

fn process_roads(config: &Config) -> Result<()> {
    let service = config.elevation_service();
    let info = service
        .coverage_info()
        .context("Elevation coverage unavailable. Run --merge-dtm first")?;

    let mut roads =
        load_roads(&config.roads_path(), Some(info.epsg)).context("Failed to load roads")?;

    let pb = ProgressBar::new(roads.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );
    let progress = |done: usize, _total: usize| pb.set_position(done as u64);

    let report = compute_network(
        &service,
        &mut roads,
        &config.gradient_options(),
        Some(&progress),
    )
    .context("Failed to calculate road gradients")?;
    pb.finish_with_message("done");
    service.release();

    write_processed_roads(&config.processed_roads_path(), &roads, Some(info.epsg))?;

    let summary = summarize_network(&roads);
    println!("Roads:          {}", report.total);
    println!("  computed:     {}", report.computed);
    println!("  skipped:      {}", report.skipped);
    println!("  invalid:      {}", report.invalid);
    println!("Total length:   {:.2} km", summary.total_length_km);
    if let Some(gradient) = summary.gradient {
        println!(
            "Avg gradient:   {:.2}% (min {:.2}%, max {:.2}%)",
            gradient.mean.unwrap_or(0.0),
            gradient.min,
            gradient.max
        );
    }
    println!("Output written to: {}", config.processed_roads_path().display());
    Ok(())
}

fn identify_hills(config: &Config) -> Result<()> {
    let path = config.processed_roads_path();
    let collection = read_collection(&path)
        .with_context(|| format!("Failed to read {}. Run --process-roads first", path.display()))?;
    let epsg = declared_epsg(&collection);
    let roads = processed_roads_from_collection(collection)?;

    let hills = classify_hills(&roads, &config.hill_criteria());
    write_hills(&config.hills_path(), &hills, epsg)?;

    println!("Hills identified: {}", hills.len());
    println!("Output written to: {}", config.hills_path().display());
    Ok(())
}

fn import_database(config: &Config) -> Result<()> {
    let path = config.hills_path();
    let hills = read_hills(&path)
        .with_context(|| format!("Failed to read {}. Run --identify-hills first", path.display()))?;

    let mut store = HillStore::open(config.database_path())
        .with_context(|| format!("Failed to open database {}", config.database_path().display()))?;
    let count = store.import_hills(&hills).context("Failed to import hills")?;

    println!("Imported {} hills into {}", count, config.database_path().display());
    Ok(())
}
