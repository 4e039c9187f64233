//! Reload command - replay the newest snapshot into the downstream sinks

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use ledgermirror_core::RunStatus;

use super::get_context;
use crate::output;

pub fn run(env_file: Option<&Path>, sequential: bool, json: bool) -> Result<ExitCode> {
    let ctx = get_context(env_file, "reload")?;
    let report = ctx.snapshots()?.reload(!sequential)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        output::info(&format!("Reloaded {} operations from {}", report.operations, report.key));
        println!("{}", output::sink_table(&report.sinks));
        match report.status {
            RunStatus::Succeeded => output::success("Reload complete"),
            status => println!("Status: {}", output::run_status(status)),
        }
    }

    Ok(if report.status == RunStatus::Failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
