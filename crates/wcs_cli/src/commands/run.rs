//! Run command - Scan stations until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use tokio::sync::watch;
use tracing::{info, warn};

use wcs_core::{
    CoreError, ScanController, ScanScheduler, ScanSummary, StationId, TracingNotifier, VariantRegistry,
    WcsConfig,
};

use super::{load_config, open_session, StationNotLoaded};

#[derive(Args)]
pub struct RunArgs {
    /// Configuration file
    #[arg(short, long, env = "WCS_CONFIG", default_value = "wcs.toml")]
    pub config: PathBuf,

    /// Station to scan (repeatable); defaults to the configured list
    #[arg(short, long = "station")]
    pub stations: Vec<i64>,

    /// Stop each station after this many cycles
    #[arg(long)]
    pub cycles: Option<u64>,

    /// Override the scan interval
    #[arg(long)]
    pub interval_ms: Option<u64>,
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let mut config = load_config(&args.config)?;
    apply_overrides(&mut config, &args)?;

    let summaries = run_stations(&config, shutdown_on_ctrl_c()).await?;
    print_summaries(&summaries);
    Ok(())
}

/// Fold command-line overrides into the loaded configuration.
fn apply_overrides(config: &mut WcsConfig, args: &RunArgs) -> Result<()> {
    if !args.stations.is_empty() {
        config.stations = args.stations.iter().copied().map(StationId::from).collect();
    }
    if args.cycles.is_some() {
        config.scan.max_cycles = args.cycles;
    }
    if let Some(interval_ms) = args.interval_ms {
        config.scan.interval_ms = interval_ms;
    }
    config.validate()?;

    if config.stations.is_empty() {
        return Err(CoreError::Config(
            "no stations configured; pass --station or set `stations`".into(),
        )
        .into());
    }
    Ok(())
}

/// Load every configured station on one shared session and scan until
/// `shutdown` fires or each station reaches its cycle limit.
///
/// Fails when no station loads at all.
pub async fn run_stations(
    config: &WcsConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<Vec<ScanSummary>> {
    let session = open_session(config).await?;
    let registry = VariantRegistry::commissioning();
    let options = config.controller_options();

    let mut scheduler = ScanScheduler::new(config.scan.interval())
        .with_policy(config.scan.failure_policy)
        .with_max_cycles(config.scan.max_cycles);

    let mut first_failure = None;
    for &station in &config.stations {
        let controller = ScanController::attach(
            station,
            Some(Arc::clone(&session)),
            &registry,
            &TracingNotifier,
            options,
        )
        .await;

        if controller.is_loaded() {
            info!(
                station = %station,
                kind = ?controller.kind(),
                "station ready"
            );
            scheduler.add(Arc::new(controller));
        } else {
            warn!(station = %station, "station skipped: {:?}", controller.load_failure());
            first_failure.get_or_insert_with(|| StationNotLoaded::new(station, controller.load_failure()));
        }
    }

    if scheduler.is_empty() {
        if let Some(failure) = first_failure {
            return Err(failure.into());
        }
    }

    Ok(scheduler.run(shutdown).await)
}

/// Shutdown channel flipped by Ctrl-C.
fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, finishing current cycles");
                let _ = tx.send(true);
            }
            Err(e) => {
                warn!("Unable to listen for Ctrl-C: {}", e);
                // keep the sender alive so scans continue
                std::future::pending::<()>().await;
            }
        }
    });
    rx
}

fn print_summaries(summaries: &[ScanSummary]) {
    println!("Scan summary:");
    for summary in summaries {
        let status = if summary.stopped_on_failure {
            "stopped"
        } else if summary.failed > 0 {
            "degraded"
        } else {
            "ok"
        };
        println!(
            "  station {:>6}  {:<8}  completed {:>6}  inert {:>4}  rejected {:>4}  failed {:>4}",
            summary.station.get(), status, summary.completed, summary.inert, summary.rejected, summary.failed
        );
    }
}
