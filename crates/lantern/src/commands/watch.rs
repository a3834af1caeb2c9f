//! Watch command implementation

use anyhow::{bail, Result};
use lantern_db::LogSelector;
use lantern_supervisor::{Supervisor, WatchOptions, WatchOutcome};
use std::time::Duration;

use crate::cli::WatchArgs;
use crate::output::{is_json_mode, print_info, print_json, print_log_lines};

pub async fn execute(args: WatchArgs) -> Result<()> {
    let (_, service) = super::resolve_service(args.name.as_deref())?;
    let supervisor = super::get_supervisor().await?;
    let key = service.key();

    let Some(record) = supervisor.db().processes().find_active_by_key(&key).await? else {
        let running = supervisor.list_running(None).await?;
        if is_json_mode() {
            print_json(&running);
        } else {
            println!(
                "No running process found for service '{}' in '{}'.",
                key.service_name,
                key.project_dir.display()
            );
            println!();
            println!("Running processes:");
            if running.is_empty() {
                println!("  (none)");
            }
            for r in &running {
                println!("  {} ({})", r.service_name, r.project_dir.display());
            }
        }
        bail!("Nothing to watch for '{}'", key.service_name);
    };

    if !is_json_mode() {
        print_info(&format!(
            "Watching '{}' (pid {}, launch {})",
            record.service_name, record.pid, record.launch_id
        ));
        println!("Press Ctrl+C to stop watching.");
        println!();
    }
    let options = WatchOptions {
        exit_after: args.exit_after.map(Duration::from_secs),
        ..Default::default()
    };
    follow(
        &supervisor,
        LogSelector::Launch(record.launch_id),
        &service.name,
        options,
    )
    .await
}

/// Stream logs until the process stops or the user interrupts
pub async fn follow(
    supervisor: &Supervisor,
    selector: LogSelector,
    name: &str,
    options: WatchOptions,
) -> Result<()> {
    let outcome = supervisor
        .watch(
            selector,
            options,
            |rows| print_log_lines(rows),
            super::interrupted(),
        )
        .await?;

    if is_json_mode() {
        print_json(&outcome);
    } else {
        println!();
        print_info(&outcome.describe(name));
    }
    match outcome {
        WatchOutcome::Stopped {
            exit_code: Some(code),
        } if code != 0 => bail!("'{}' exited with code {}", name, code),
        _ => Ok(()),
    }
}
