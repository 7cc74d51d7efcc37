pub mod elevation;
pub mod list;
pub mod process;
pub mod search;
pub mod show;
pub mod stats;

use anyhow::{bail, Context, Result};
use hillgrade::{Config, HillStore};

/// Open the hill database for queries, refusing to create a new one.
pub fn open_store(config: &Config) -> Result<HillStore> {
    let path = config.database_path();
    if !path.exists() {
        bail!(
            "Hill database not found: {}. Run `hillgrade process --import-database` first",
            path.display()
        );
    }
    HillStore::open(path).with_context(|| format!("Failed to open database {}", path.display()))
}
