//! Add-service command implementation

use anyhow::{Context, Result};
use lantern_core::{add_service, ServiceConfig};
use std::collections::HashMap;

use crate::cli::AddServiceArgs;
use crate::output::print_success_json;

pub async fn execute(args: AddServiceArgs) -> Result<()> {
    let env: HashMap<String, String> = match &args.env {
        Some(raw) => serde_json::from_str(raw).context("--env must be a JSON object of strings")?,
        None => HashMap::new(),
    };

    let service = ServiceConfig {
        name: args.name.clone(),
        shell: args.shell,
        root: args.root,
        env,
        default: args.default,
        assign_port: args.assign_port,
    };
    let path = add_service(&args.dir, service)?;

    print_success_json(
        &format!("Added service '{}' to {}", args.name, path.display()),
        Some(&path),
    );
    Ok(())
}
