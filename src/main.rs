use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use roadmap_board::config::{LogFormat, LoggingSection, RoadmapToml};

mod cmd;

#[derive(Parser)]
#[command(name = "roadmap")]
#[command(version, about = "Roadmap board and request lifecycle server")]
pub struct Cli {
    /// Path to roadmap.toml (defaults to ./roadmap.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP + WebSocket server
    Serve {
        /// Port to serve on
        #[arg(short, long)]
        port: Option<u16>,

        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Enable dev mode (permissive CORS for a local front-end)
        #[arg(long)]
        dev: bool,
    },
    /// Create the database and run migrations
    Init {
        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// Report board columns whose positions are not contiguous
    Check {
        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Renumber defective columns, keeping their order
        #[arg(long)]
        repair: bool,
    },
}

fn init_tracing(logging: &LoggingSection) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directive = if logging.filter.trim().is_empty() {
            "info"
        } else {
            logging.filter.as_str()
        };
        EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"))
    });

    let registry = tracing_subscriber::registry().with(filter);
    match logging.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config =
        RoadmapToml::resolve(cli.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Serve { port, db_path, dev } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(db_path) = db_path {
                config.storage.db_path = db_path;
            }
            config.server.dev_mode |= dev;
            cmd::cmd_serve(&config).await?;
        }
        Commands::Init { db_path } => {
            if let Some(db_path) = db_path {
                config.storage.db_path = db_path;
            }
            cmd::cmd_init(&config)?;
        }
        Commands::Check { db_path, repair } => {
            if let Some(db_path) = db_path {
                config.storage.db_path = db_path;
            }
            cmd::cmd_check(&config, repair)?;
        }
    }

    Ok(())
}
