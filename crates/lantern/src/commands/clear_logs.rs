//! Clear-logs command implementation

use anyhow::Result;

use crate::output::print_success_json;

pub async fn execute(name: Option<String>) -> Result<()> {
    let (_, service) = super::resolve_service(name.as_deref())?;
    let supervisor = super::get_supervisor().await?;

    let removed = supervisor.clear_logs(&service.key()).await?;
    print_success_json(
        &format!("Cleared {} log lines for '{}'", removed, service.name),
        Some(removed),
    );
    Ok(())
}
