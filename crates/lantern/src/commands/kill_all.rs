//! Kill-all command implementation

use anyhow::Result;

use crate::output::print_kill_all_report;

pub async fn execute() -> Result<()> {
    let supervisor = super::get_supervisor().await?;
    let report = supervisor.kill_all().await?;
    print_kill_all_report(&report);
    Ok(())
}
