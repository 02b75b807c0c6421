//! Database initialization command: `roadmap init`.

use anyhow::Result;

use roadmap_board::board::server::open_database;
use roadmap_board::config::RoadmapToml;

pub fn cmd_init(config: &RoadmapToml) -> Result<()> {
    open_database(config)?;
    println!(
        "Roadmap database initialized at {}",
        config.storage.db_path.display()
    );
    Ok(())
}
