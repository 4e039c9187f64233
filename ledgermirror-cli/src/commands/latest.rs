//! Latest command - locate the newest published snapshot

use std::path::Path;

use anyhow::Result;

use super::get_context;
use crate::output;

pub fn run(env_file: Option<&Path>, json: bool) -> Result<()> {
    let ctx = get_context(env_file, "latest")?;
    let snapshots = ctx.snapshots()?;

    let Some(key) = snapshots.latest_key()? else {
        if json {
            println!("{}", serde_json::json!({ "key": null }));
        } else {
            output::warning(&format!("No snapshot published under {}", snapshots.location()));
        }
        return Ok(());
    };
    let rows = snapshots.load(&key)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "key": key,
                "location": snapshots.location(),
                "operations": rows.len(),
            }))?
        );
        return Ok(());
    }

    output::info(&format!("{}{}", snapshots.location(), key));
    println!("  Operations: {}", rows.len());
    if let Some(newest) = rows.iter().map(|r| r.timestamp_local.as_str()).max() {
        println!("  Latest operation: {}", newest);
    }
    Ok(())
}
