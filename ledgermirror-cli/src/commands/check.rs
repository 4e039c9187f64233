//! Check command - show effective settings without touching any service

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use colored::Colorize;
use ledgermirror_core::config::Config;

use crate::output;

pub fn run(env_file: Option<&Path>, json: bool) -> Result<ExitCode> {
    let vars = Config::collect_vars(env_file)?;
    let settings = Config::describe(&vars);
    let parsed = Config::from_vars(&vars);

    let sinks: Vec<&str> = parsed
        .as_ref()
        .map(|c| c.sink_names())
        .unwrap_or_default();
    let problem = match &parsed {
        Ok(_) if sinks.is_empty() => Some("No sink configured".to_string()),
        Ok(_) => None,
        Err(e) => Some(e.to_string()),
    };

    if json {
        let settings: serde_json::Map<String, serde_json::Value> = settings
            .into_iter()
            .map(|(k, v)| (k, v.map(serde_json::Value::String).unwrap_or_default()))
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "valid": problem.is_none(),
                "error": problem,
                "source": parsed.as_ref().ok().map(|c| c.source),
                "sinks": sinks,
                "settings": settings,
            }))?
        );
    } else {
        let mut table = output::create_table();
        table.set_header(vec!["Setting", "Value"]);
        for (key, value) in &settings {
            let shown = match value {
                Some(v) => v.clone(),
                None => "-".dimmed().to_string(),
            };
            table.add_row(vec![key.clone(), shown]);
        }
        println!("{}", table);

        if let Ok(config) = &parsed {
            output::info(&format!(
                "Source: {:?}, lookback {} days, timezone {}",
                config.source, config.days_back, config.reporting_tz
            ));
        }
        if !sinks.is_empty() {
            println!("Sinks: {}", sinks.join(", "));
        }
        match &problem {
            Some(problem) => output::error(problem),
            None => output::success("Configuration OK"),
        }
    }

    Ok(if problem.is_some() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
