//! Status command - relational store summary

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use super::get_context;
use crate::output;

pub fn run(env_file: Option<&Path>, json: bool) -> Result<()> {
    let ctx = get_context(env_file, "status")?;
    let status = ctx.status_service.get_status()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", "Ledger Status".bold());
    println!();

    let mut table = output::create_table();
    table.add_row(vec!["Backend", status.backend.as_str()]);
    table.add_row(vec!["Operations", &status.total_operations.to_string()]);
    table.add_row(vec![
        "Latest operation",
        status.last_operation_at.as_deref().unwrap_or("-"),
    ]);
    println!("{}", table);

    Ok(())
}
