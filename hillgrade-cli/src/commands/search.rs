use anyhow::{bail, Context, Result};
use hillgrade::geojson::summaries_to_collection;
use hillgrade::{BoundingBox, Category, Config, Coverage, SearchFilters};

/// Raw search arguments from the command line.
pub struct Filters {
    pub min_gradient: Option<f64>,
    pub max_gradient: Option<f64>,
    pub min_length: Option<f64>,
    pub max_length: Option<f64>,
    pub category: Option<String>,
    pub region: Option<String>,
    /// `[min_x, min_y, max_x, max_y]`
    pub bbox: Option<Vec<f64>>,
}

pub enum Format {
    Table,
    Json,
    GeoJson,
}

impl Filters {
    fn into_search(self) -> Result<SearchFilters> {
        let category = match self.category {
            Some(c) => Some(c.parse::<Category>().map_err(anyhow::Error::msg)?),
            None => None,
        };
        let bbox = match self.bbox.as_deref() {
            Some([min_x, min_y, max_x, max_y]) => {
                Some(BoundingBox::new(*min_x, *max_x, *min_y, *max_y))
            }
            Some(other) => bail!("--bbox needs 4 values, got {}", other.len()),
            None => None,
        };

        Ok(SearchFilters {
            min_gradient: self.min_gradient,
            max_gradient: self.max_gradient,
            min_length: self.min_length,
            max_length: self.max_length,
            category,
            region: self.region,
            bbox,
        })
    }
}

pub fn run(config: &Config, filters: Filters, format: Format) -> Result<()> {
    let filters = filters.into_search()?;
    let store = super::open_store(config)?;
    let hills = store.search_hills(&filters).context("Search failed")?;

    match format {
        Format::GeoJson => {
            // Declare the CRS only when a coverage already exists
            let epsg = Coverage::open(config.coverage_path()).ok().map(|c| c.epsg());
            let collection = summaries_to_collection(&hills, epsg);
            println!("{}", serde_json::to_string_pretty(&collection)?);
        }
        Format::Json => println!("{}", serde_json::to_string_pretty(&hills)?),
        Format::Table => {
            if hills.is_empty() {
                println!("No hills found");
                return Ok(());
            }

            println!(
                "{:>6} {:<30} {:>4} {:>9} {:>8} {:>8} {:<16}",
                "ID", "NAME", "CAT", "LENGTH", "AVG", "MAX", "REGION"
            );
            println!("{}", "-".repeat(86));
            for hill in &hills {
                println!(
                    "{:>6} {:<30} {:>4} {:>8.0}m {:>7.1}% {:>7.1}% {:<16}",
                    hill.id,
                    truncate(&hill.name, 30),
                    hill.category,
                    hill.length_m,
                    hill.avg_gradient,
                    hill.max_gradient,
                    hill.region
                );
            }
            println!();
            println!("{} hills", hills.len());
        }
    }

    Ok(())
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut short: String = text.chars().take(width - 1).collect();
        short.push('…');
        short
    }
}
