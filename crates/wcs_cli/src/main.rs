//! WCS CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments or configuration
//! - 3: Station not loaded

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use wcs_core::CoreError;

mod commands;

use commands::{Cli, Commands};

/// Process exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const STATION_NOT_LOADED: u8 = 3;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(args).await,
        Commands::Check(args) => commands::check::execute(args).await,
        Commands::Kinds(args) => commands::kinds::execute(args),
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

fn init_logging(cli: &Cli) {
    let default_level = if cli.verbose {
        "wcs=debug,warn"
    } else if cli.quiet {
        "warn"
    } else {
        "wcs=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // a subscriber may already be installed; keep it
    let _ = if cli.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_current_span(false))
            .with(filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(false))
            .with(filter)
            .try_init()
    };
}

/// Map an error to its exit code.
fn categorize_error(e: &anyhow::Error) -> u8 {
    if e.downcast_ref::<commands::StationNotLoaded>().is_some() {
        return ExitCodes::STATION_NOT_LOADED;
    }
    match e.downcast_ref::<CoreError>() {
        Some(CoreError::Config(_)) | Some(CoreError::InvalidStationId(_)) => ExitCodes::INVALID_ARGS,
        Some(CoreError::Io(io)) if io.kind() == std::io::ErrorKind::NotFound => {
            ExitCodes::INVALID_ARGS
        }
        _ => ExitCodes::GENERAL_ERROR,
    }
}
