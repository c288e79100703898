//! Kinds command - List station-type keys.

use anyhow::Result;
use clap::Args;
use serde_json::json;

use wcs_core::StationKind;

#[derive(Args)]
pub struct KindsArgs {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: KindsArgs) -> Result<()> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(&kinds_json())?);
        return Ok(());
    }

    for kind in StationKind::ALL {
        let phases: Vec<_> = kind.phases().iter().map(|p| p.as_str()).collect();
        println!("{:<36} {:<24} {}", kind.key(), kind.label(), phases.join(" -> "));
    }
    Ok(())
}

fn kinds_json() -> serde_json::Value {
    StationKind::ALL
        .iter()
        .map(|kind| {
            json!({
                "key": kind.key(),
                "kind": kind,
                "label": kind.label(),
                "phases": kind.phases(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_json_lists_every_key() {
        let listed = kinds_json();
        let entries = listed.as_array().unwrap();

        assert_eq!(entries.len(), 16);
        let release_gated: Vec<_> = entries
            .iter()
            .filter(|e| e["phases"].as_array().map(Vec::len) == Some(3))
            .map(|e| e["key"].as_str().unwrap())
            .collect();
        assert_eq!(release_gated, vec!["ST.CONV.GROUPBUFFER"]);
    }
}
