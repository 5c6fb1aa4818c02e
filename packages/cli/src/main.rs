#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command line entry point for the crash and safety request analysis.
//!
//! Uses `indicatif-log-bridge` (via [`safety_map_cli_utils::init_logger`])
//! so log lines and progress bars never fight for the terminal.

mod output;
mod pipeline;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use safety_map_config::{AnalysisConfig, ConfigOverrides};

#[derive(Parser)]
#[command(
    name = "safety_map",
    about = "Correlates denied safety requests with nearby injury crashes"
)]
struct Cli {
    /// TOML configuration file (defaults to the built-in configuration)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding the input feeds and boundary file
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Directory tables, the summary and the geocode cache are written to
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,
    /// Crash counting radius in meters
    #[arg(long, global = true)]
    radius: Option<f64>,
    /// Number of hotspots kept in rankings
    #[arg(long, global = true)]
    top_n: Option<usize>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full analysis and write all tables
    Run {
        /// Ignore the geocode cache and resolve every intersection again
        #[arg(long)]
        refresh_geocode: bool,
    },
    /// Geocode request locations and update the cache only
    Geocode {
        /// Ignore the geocode cache and resolve every intersection again
        #[arg(long)]
        refresh_geocode: bool,
    },
    /// Download the boundary file if it is not present
    Boundary,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = safety_map_cli_utils::init_logger();
    let cli = Cli::parse();

    let config = AnalysisConfig::load(cli.config.as_deref())?.with_overrides(ConfigOverrides {
        data_dir: cli.data_dir,
        output_dir: cli.output_dir,
        radius_m: cli.radius,
        top_n: cli.top_n,
    })?;

    match cli.command {
        Commands::Run { refresh_geocode } => pipeline::run(&config, refresh_geocode, &multi).await?,
        Commands::Geocode { refresh_geocode } => {
            pipeline::geocode_only(&config, refresh_geocode, &multi).await?;
        }
        Commands::Boundary => pipeline::ensure_boundary(&config).await?,
    }

    Ok(())
}
