//! Cleanup command implementation

use anyhow::Result;
use lantern_core::RetentionPolicy;
use serde_json::json;

use crate::output::{is_json_mode, print_json, print_success};

pub async fn execute(vacuum: bool) -> Result<()> {
    let supervisor = super::get_supervisor().await?;
    let report = supervisor
        .cleanup(&RetentionPolicy::default(), vacuum)
        .await?;

    if is_json_mode() {
        print_json(&json!({
            "logsOverCap": report.logs_over_cap,
            "expiredLogs": report.expired_logs,
            "failedProcesses": report.failed_processes,
            "successfulProcesses": report.successful_processes,
            "orphanLogs": report.orphan_logs,
            "vacuumed": vacuum,
        }));
        return Ok(());
    }

    print_success("Cleanup completed");
    println!(
        "  Removed {} old processes ({} failed, {} successful)",
        report.failed_processes + report.successful_processes,
        report.failed_processes,
        report.successful_processes
    );
    println!(
        "  Removed {} log lines ({} expired, {} over the per-launch cap, {} orphaned)",
        report.expired_logs + report.logs_over_cap + report.orphan_logs,
        report.expired_logs,
        report.logs_over_cap,
        report.orphan_logs
    );
    Ok(())
}
