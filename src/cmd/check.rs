//! Position integrity check: `roadmap check`.

use anyhow::{Context, Result, bail};

use roadmap_board::board::server::open_database;
use roadmap_board::config::RoadmapToml;

pub fn cmd_check(config: &RoadmapToml, repair: bool) -> Result<()> {
    if !config.storage.db_path.exists() {
        bail!(
            "No database at {}. Run 'roadmap init' first.",
            config.storage.db_path.display()
        );
    }
    let db = open_database(config)?;
    let defects = db.check_columns().context("Failed to scan board columns")?;

    if defects.is_empty() {
        println!("All columns are contiguous.");
        return Ok(());
    }

    for defect in &defects {
        println!(
            "project {} column {}: positions {:?}",
            defect.project_id, defect.column, defect.positions
        );
    }

    if repair {
        let repaired = db.repair_columns().context("Failed to repair board columns")?;
        println!("Repaired {} column(s).", repaired);
        Ok(())
    } else {
        bail!(
            "{} column(s) have gaps or duplicate positions; re-run with --repair",
            defects.len()
        )
    }
}
