//! Logs command implementation

use anyhow::Result;
use lantern_core::format_timestamp;
use serde_json::json;

use crate::cli::LogsArgs;
use crate::output::{is_json_mode, print_json, print_log_lines};

pub async fn execute(args: LogsArgs) -> Result<()> {
    let (_, service) = super::resolve_service(args.name.as_deref())?;
    let supervisor = super::get_supervisor().await?;

    let (record, rows) = supervisor.logs(&service.key(), args.lines).await?;
    if is_json_mode() {
        print_json(&json!({ "process": record, "logs": rows }));
        return Ok(());
    }

    if rows.is_empty() {
        println!(
            "No logs found for service '{}' in '{}'.",
            service.name,
            service.project_dir.display()
        );
        return Ok(());
    }

    match &record {
        Some(r) => println!(
            "=== Logs for '{}' ({}, started: {}) ===",
            service.name,
            r.status(),
            format_timestamp(r.start_time)
        ),
        None => println!("=== Logs for '{}' ===", service.name),
    }
    print_log_lines(&rows);
    Ok(())
}
