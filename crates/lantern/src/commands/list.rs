//! List commands: configured services, or every running process

use anyhow::Result;

use crate::output::{print_processes_table, print_services_table};

pub async fn execute() -> Result<()> {
    let project = super::current_project()?;
    let supervisor = super::get_supervisor().await?;
    let statuses = supervisor.list_services(&project).await?;
    print_services_table(&statuses);
    Ok(())
}

pub async fn execute_all() -> Result<()> {
    let supervisor = super::get_supervisor().await?;
    let records = supervisor.list_running(None).await?;
    print_processes_table(&records);
    Ok(())
}
