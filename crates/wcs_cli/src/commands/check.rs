//! Check command - Load one station and report its scan plan.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde_json::json;
use tracing::info;

use wcs_core::{CycleOutcome, ScanController, StationId, TracingNotifier, VariantRegistry};

use super::{load_config, open_session, StationNotLoaded};

#[derive(Args)]
pub struct CheckArgs {
    /// Configuration file
    #[arg(short, long, env = "WCS_CONFIG", default_value = "wcs.toml")]
    pub config: PathBuf,

    /// Station to load
    #[arg(short, long)]
    pub station: i64,

    /// Also run one scan cycle
    #[arg(long)]
    pub scan: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: CheckArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let session = open_session(&config).await?;
    let station = StationId::from(args.station);

    info!("Checking station {}", station);
    let controller = ScanController::attach(
        station,
        Some(session),
        &VariantRegistry::commissioning(),
        &TracingNotifier,
        config.controller_options(),
    )
    .await;

    let scan = if args.scan && controller.is_loaded() {
        Some(controller.execute().await?)
    } else {
        None
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report(&controller, scan.as_ref()))?);
    } else {
        print_report(&controller);
        if let Some(outcome) = &scan {
            println!("  scan:     {:?}", outcome);
        }
    }

    if !controller.is_loaded() {
        return Err(StationNotLoaded::new(station, controller.load_failure()).into());
    }
    Ok(())
}

fn report(controller: &ScanController, scan: Option<&CycleOutcome>) -> serde_json::Value {
    let scanned = scan.map(|outcome| match outcome {
        CycleOutcome::Completed(cycle) => json!(cycle),
        other => json!(format!("{:?}", other)),
    });
    json!({
        "station": controller.station_id(),
        "name": controller.station().map(|s| s.name.clone()),
        "type_key": controller.station_type().map(|t| t.key.clone()),
        "kind": controller.kind(),
        "phases": controller.phases(),
        "state": controller.state(),
        "failure": controller.load_failure().map(ToString::to_string),
        "scanned": scanned,
    })
}

fn print_report(controller: &ScanController) {
    println!("Station {}", controller.station_id());
    if let Some(station) = controller.station() {
        println!("  name:     {}", station.name);
    }
    if let Some(station_type) = controller.station_type() {
        println!("  type:     {}", station_type.key);
    }
    match controller.kind() {
        Some(kind) => {
            println!("  kind:     {}", kind.label());
            let phases: Vec<_> = controller.phases().iter().map(|p| p.as_str()).collect();
            println!("  phases:   {}", phases.join(" -> "));
        }
        None if controller.is_loaded() => println!("  kind:     (no variant, cycles are inert)"),
        None => {}
    }
    println!("  state:    {:?}", controller.state());
    if let Some(failure) = controller.load_failure() {
        println!("  failure:  {}", failure);
    }
}
