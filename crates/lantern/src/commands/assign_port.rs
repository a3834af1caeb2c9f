//! Assign-port command implementation

use anyhow::{bail, Result};
use lantern_runtime::port_is_free;

use crate::output::print_success_json;

pub async fn execute(port: u16) -> Result<()> {
    if port == 0 {
        bail!("Port must be between 1 and 65535");
    }
    if !port_is_free(port) {
        bail!("Port {} is already in use", port);
    }

    let project = super::current_project()?;
    let supervisor = super::get_supervisor().await?;
    supervisor.assign_port(&project.project_dir, port).await?;

    print_success_json(
        &format!(
            "Assigned port {} to project {}",
            port,
            project.project_dir.display()
        ),
        Some(port),
    );
    Ok(())
}
