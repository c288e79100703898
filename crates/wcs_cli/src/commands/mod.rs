//! CLI command definitions.
//!
//! Each subcommand either drives scan controllers or inspects the station
//! kinds the engine knows about.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing::debug;

use wcs_core::{LoadFailure, Session, SessionProvider, SnapshotSessionProvider, StationId, WcsConfig};

pub mod check;
pub mod kinds;
pub mod run;

/// WCS - conveyor station scan engine
#[derive(Parser)]
#[command(name = "wcs")]
#[command(version, about = "Conveyor station scan engine")]
#[command(long_about = r#"
Loads conveyor stations from the warehouse control database and runs their
scan cycles.

COMMANDS:
  run    → Scan one or more stations until Ctrl-C or a cycle limit
  check  → Load a single station and report its kind and phases
  kinds  → List every station-type key and its phase plan

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments or configuration
  3 - Station not loaded
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "WCS_LOG_JSON")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run scan cycles for the configured stations
    Run(run::RunArgs),

    /// Load one station and report how it would scan
    Check(check::CheckArgs),

    /// List station-type keys and their phases
    Kinds(kinds::KindsArgs),
}

/// A requested station failed to load.
#[derive(Error, Debug)]
#[error("Station {station} not loaded: {reason}")]
pub struct StationNotLoaded {
    pub station: StationId,
    pub reason: String,
}

impl StationNotLoaded {
    pub fn new(station: StationId, failure: Option<&LoadFailure>) -> Self {
        Self {
            station,
            reason: failure
                .map(ToString::to_string)
                .unwrap_or_else(|| "unknown reason".to_string()),
        }
    }
}

/// Load and validate the configuration file.
pub fn load_config(path: &Path) -> Result<WcsConfig> {
    debug!("Reading configuration from {}", path.display());
    WcsConfig::load(path).with_context(|| format!("Failed to load configuration {}", path.display()))
}

/// Open the session every controller of this process shares.
pub async fn open_session(config: &WcsConfig) -> Result<Arc<dyn Session>> {
    SnapshotSessionProvider
        .connect(&config.connection)
        .await
        .with_context(|| {
            format!(
                "Failed to connect to {}/{}",
                config.connection.server, config.connection.database
            )
        })
}
