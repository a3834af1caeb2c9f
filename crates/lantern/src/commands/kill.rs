//! Kill command implementation

use anyhow::Result;

use crate::output::{is_json_mode, print_info, print_json, print_success};

pub async fn execute(name: Option<String>) -> Result<()> {
    let (_, service) = super::resolve_service(name.as_deref())?;
    let supervisor = super::get_supervisor().await?;

    let output = supervisor.kill(&service.key()).await?;
    if is_json_mode() {
        print_json(&output);
        return Ok(());
    }

    if let Some(message) = &output.message {
        print_info(message);
    }
    for record in &output.killed {
        print_success(&format!(
            "Killed '{}' (pid {}, launch {})",
            record.service_name, record.pid, record.launch_id
        ));
    }
    Ok(())
}
