//! Restart command implementation

use anyhow::Result;

use crate::cli::RestartArgs;
use crate::output::{is_json_mode, print_info, print_json, print_success_json};

pub async fn execute(args: RestartArgs) -> Result<()> {
    let (_, service) = super::resolve_service(args.name.as_deref())?;
    let supervisor = super::get_supervisor().await?;

    if args.in_place {
        let record = supervisor.signal_restart(&service.key()).await?;
        print_success_json(
            &format!(
                "Sent restart signal to '{}' (wrapper pid {})",
                service.name,
                record.wrapper_pid.unwrap_or_default()
            ),
            Some(&record),
        );
        return Ok(());
    }

    let restarted = supervisor.restart(&service).await?;
    if is_json_mode() {
        print_json(&restarted);
        return Ok(());
    }
    if let Some(message) = &restarted.kill.message {
        print_info(message);
    }
    super::run::print_launched(&restarted.run);
    Ok(())
}
