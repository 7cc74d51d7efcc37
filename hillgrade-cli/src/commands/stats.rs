use anyhow::{Context, Result};
use hillgrade::Config;

pub fn run(config: &Config, json: bool) -> Result<()> {
    let store = super::open_store(config)?;
    let stats = store.get_statistics().context("Failed to compute statistics")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Hill Database Statistics:");
    println!("  Total hills:   {}", stats.total_hills);
    println!("  Total length:  {:.2} km", stats.total_length_m / 1000.0);

    if let Some(gradient) = stats.gradient {
        println!(
            "  Gradient:      avg {:.2}%, min {:.2}%, max {:.2}%",
            gradient.mean, gradient.min, gradient.max
        );
    }
    if let Some(length) = stats.length {
        println!(
            "  Length:        avg {:.0} m, min {:.0} m, max {:.0} m",
            length.mean, length.min, length.max
        );
    }

    if !stats.categories.is_empty() {
        println!();
        println!("  By category:");
        for (category, count) in &stats.categories {
            println!("    {:<4} {}", category, count);
        }
    }
    if !stats.regions.is_empty() {
        println!();
        println!("  By region:");
        for (region, count) in &stats.regions {
            println!("    {:<20} {}", region, count);
        }
    }

    Ok(())
}
