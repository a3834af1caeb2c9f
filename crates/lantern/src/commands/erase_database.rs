//! Erase-database command implementation

use anyhow::Result;
use lantern_core::constants;
use tracing::debug;

use crate::output::{print_info, print_success_json};

pub async fn execute() -> Result<()> {
    let mut removed = Vec::new();
    for path in constants::db_files() {
        if path.exists() {
            std::fs::remove_file(&path)?;
            debug!("Removed {}", path.display());
            removed.push(path);
        }
    }

    if removed.is_empty() {
        print_info(&format!(
            "No database found at {}",
            constants::db_path().display()
        ));
        return Ok(());
    }
    print_success_json(
        "Database erased. A new one will be created on next use.",
        Some(&removed),
    );
    Ok(())
}
