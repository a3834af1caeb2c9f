//! Start command implementation

use anyhow::{bail, Result};
use lantern_core::ProcessRecord;
use serde::Serialize;

use crate::output::{is_json_mode, print_error, print_json};

#[derive(Serialize)]
struct StartResult {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    record: Option<ProcessRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub async fn execute(names: Vec<String>) -> Result<()> {
    let project = super::current_project()?;
    let services = if names.is_empty() {
        vec![project.resolve(None)?]
    } else {
        names
            .iter()
            .map(|name| project.resolve(Some(name.as_str())))
            .collect::<lantern_core::Result<Vec<_>>>()?
    };

    let supervisor = super::get_supervisor().await?;
    let mut results = Vec::new();
    for service in &services {
        match supervisor.run(service).await {
            Ok(launched) => {
                if !is_json_mode() {
                    super::run::print_launched(&launched);
                }
                results.push(StartResult {
                    name: service.name.clone(),
                    record: Some(launched.record),
                    error: None,
                });
            }
            Err(e) => {
                if !is_json_mode() {
                    print_error(&format!("{}: {}", service.name, e));
                }
                results.push(StartResult {
                    name: service.name.clone(),
                    record: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    let failed = results.iter().filter(|r| r.error.is_some()).count();
    if is_json_mode() {
        print_json(&results);
    } else if results.len() > 1 {
        println!(
            "Started {} of {} services",
            results.len() - failed,
            results.len()
        );
    }

    if failed > 0 {
        bail!("{} of {} services failed to start", failed, results.len());
    }
    Ok(())
}
