//! Board server command: `roadmap serve`.

use anyhow::Result;
use tracing::warn;

use roadmap_board::config::RoadmapToml;

pub async fn cmd_serve(config: &RoadmapToml) -> Result<()> {
    for warning in config.validate() {
        warn!("{}", warning);
    }
    roadmap_board::board::server::start_server(config).await
}
