//! Command implementations

pub mod add_service;
pub mod assign_port;
pub mod cleanup;
pub mod clear_logs;
pub mod erase_database;
pub mod kill;
pub mod kill_all;
pub mod list;
pub mod logs;
pub mod restart;
pub mod run;
pub mod start;
pub mod wait_for_log;
pub mod watch;

use anyhow::Result;
use lantern_core::{constants, Project, ResolvedService};
use lantern_db::Database;
use lantern_runtime::{wrapper_executable, OsProcessControl};
use lantern_supervisor::Supervisor;
use std::sync::Arc;

/// Open the store and build a supervisor over the real OS
pub async fn get_supervisor() -> Result<Supervisor> {
    let home = constants::lantern_home();
    if !home.exists() {
        std::fs::create_dir_all(&home)?;
    }
    let db = Database::open(&constants::db_path()).await?;
    Ok(Supervisor::new(
        db,
        Arc::new(OsProcessControl::new()),
        wrapper_executable(),
    ))
}

/// Config of the project containing the working directory
pub fn current_project() -> Result<Project> {
    Ok(Project::discover(&std::env::current_dir()?)?)
}

/// Resolve a named service, or the default one
pub fn resolve_service(name: Option<&str>) -> Result<(Project, ResolvedService)> {
    let project = current_project()?;
    let service = project.resolve(name)?;
    Ok((project, service))
}

/// Wait for Ctrl+C; never resolves if the handler cannot be installed
pub async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
