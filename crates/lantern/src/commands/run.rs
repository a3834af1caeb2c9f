//! Run command implementation

use anyhow::Result;
use lantern_db::LogSelector;
use lantern_supervisor::{RunOutput, WatchOptions};
use std::time::Duration;

use crate::cli::RunArgs;
use crate::output::{is_json_mode, print_info, print_json, print_success};

pub async fn execute(args: RunArgs) -> Result<()> {
    let (_, service) = super::resolve_service(args.name.as_deref())?;
    let supervisor = super::get_supervisor().await?;

    let launched = supervisor.run(&service).await?;
    if args.detach {
        print_launched(&launched);
        return Ok(());
    }

    if !is_json_mode() {
        print_launched(&launched);
        println!("Press Ctrl+C to stop watching.");
        println!();
    }
    let options = WatchOptions {
        exit_after: args.exit_after.map(Duration::from_secs),
        ..Default::default()
    };
    super::watch::follow(
        &supervisor,
        LogSelector::Service(service.key()),
        &service.name,
        options,
    )
    .await
}

pub fn print_launched(launched: &RunOutput) {
    if is_json_mode() {
        print_json(launched);
        return;
    }
    let record = &launched.record;
    for old in &launched.replaced {
        print_info(&format!(
            "Stopped previous '{}' (pid {})",
            old.service_name, old.pid
        ));
    }
    let port = record
        .assigned_port
        .map(|p| format!(", port {}", p))
        .unwrap_or_default();
    let pid = match record.child_pid() {
        Some(pid) => format!("pid {}", pid),
        None => "pid pending".to_string(),
    };
    print_success(&format!(
        "Started '{}' ({}{}, launch {})",
        record.service_name, pid, port, record.launch_id
    ));
}
