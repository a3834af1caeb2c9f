//! Wait-for-log command implementation

use anyhow::{bail, Result};
use lantern_core::POLL_INTERVAL;
use lantern_supervisor::WaitOutcome;
use std::time::Duration;

use crate::cli::WaitForLogArgs;
use crate::output::{format_log_line, is_json_mode, print_json, print_success};

pub async fn execute(args: WaitForLogArgs) -> Result<()> {
    let (_, service) = super::resolve_service(args.name.as_deref())?;
    let supervisor = super::get_supervisor().await?;

    let outcome = supervisor
        .wait_for_log(
            &service.key(),
            &args.message,
            Duration::from_secs(args.timeout),
            POLL_INTERVAL,
        )
        .await?;
    if is_json_mode() {
        print_json(&outcome);
    }

    match outcome {
        WaitOutcome::Found { line } => {
            if !is_json_mode() {
                print_success(&format!("Found message in '{}'", service.name));
                println!("{}", format_log_line(&line));
            }
            Ok(())
        }
        WaitOutcome::NotStarted => bail!(
            "No process started event found for '{}'",
            service.name
        ),
        WaitOutcome::Exited { exit_code } => bail!(
            "Process exited before finding message (exit code {})",
            exit_code.map_or("unknown".to_string(), |c| c.to_string())
        ),
        WaitOutcome::TimedOut => bail!(
            "Timed out after {}s waiting for '{}'",
            args.timeout,
            args.message
        ),
    }
}
