//! Processes repository - one row per launch

use lantern_core::{unix_now, Error, ProcessRecord, Result, ServiceKey, EXIT_FOUND_DEAD};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const COLUMNS: &str = "launch_id, service_name, command_line, working_directory, project_dir, \
                       pid, wrapper_pid, assigned_port, start_time, end_time, is_running, exit_code";

/// Repository for process records
pub struct ProcessesRepository {
    pool: SqlitePool,
}

impl ProcessesRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a running record with no pid yet, returning its launch id
    pub async fn create(
        &self,
        key: &ServiceKey,
        command_line: &str,
        working_directory: &Path,
        assigned_port: Option<u16>,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO processes
                (service_name, command_line, working_directory, project_dir, assigned_port, start_time)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(key.service_name.as_str())
        .bind(command_line)
        .bind(working_directory.to_string_lossy().into_owned())
        .bind(key.project_str())
        .bind(assigned_port.map(i64::from))
        .bind(unix_now())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::DbError(e.to_string()))?;

        let launch_id = result.last_insert_rowid();
        debug!("Created process record {} for {}", launch_id, key);
        Ok(launch_id)
    }

    pub async fn update_pid(&self, launch_id: i64, pid: u32) -> Result<()> {
        self.update_column("pid", launch_id, i64::from(pid)).await
    }

    pub async fn update_wrapper_pid(&self, launch_id: i64, wrapper_pid: u32) -> Result<()> {
        self.update_column("wrapper_pid", launch_id, i64::from(wrapper_pid))
            .await
    }

    async fn update_column(&self, column: &'static str, launch_id: i64, value: i64) -> Result<()> {
        let sql = format!("UPDATE processes SET {} = ? WHERE launch_id = ?", column);
        sqlx::query(&sql)
            .bind(value)
            .bind(launch_id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;
        Ok(())
    }

    /// Mark a running record stopped in one statement.
    ///
    /// Only applies while the record is still running, so the first writer's
    /// exit code wins. Returns whether this call changed the record.
    pub async fn mark_exited(&self, launch_id: i64, exit_code: i32) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE processes
            SET is_running = 0,
                end_time = ?,
                exit_code = ?
            WHERE launch_id = ? AND is_running = 1
            "#,
        )
        .bind(unix_now())
        .bind(exit_code)
        .bind(launch_id)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::DbError(e.to_string()))?;

        let changed = result.rows_affected() > 0;
        if changed {
            debug!("Marked launch {} exited with code {}", launch_id, exit_code);
        }
        Ok(changed)
    }

    pub async fn get(&self, launch_id: i64) -> Result<Option<ProcessRecord>> {
        let sql = format!("SELECT {} FROM processes WHERE launch_id = ?", COLUMNS);
        let row = sqlx::query(&sql)
            .bind(launch_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        row.as_ref().map(row_to_process).transpose()
    }

    /// Running record launched with this exact command line in this directory
    pub async fn find_active(
        &self,
        command_line: &str,
        working_directory: &Path,
    ) -> Result<Option<ProcessRecord>> {
        let sql = format!(
            "SELECT {} FROM processes \
             WHERE command_line = ? AND working_directory = ? AND is_running = 1 \
             ORDER BY launch_id DESC LIMIT 1",
            COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(command_line)
            .bind(working_directory.to_string_lossy().into_owned())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        row.as_ref().map(row_to_process).transpose()
    }

    pub async fn find_active_by_key(&self, key: &ServiceKey) -> Result<Option<ProcessRecord>> {
        let sql = format!(
            "SELECT {} FROM processes \
             WHERE service_name = ? AND project_dir = ? AND is_running = 1 \
             ORDER BY launch_id DESC LIMIT 1",
            COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(key.service_name.as_str())
            .bind(key.project_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        row.as_ref().map(row_to_process).transpose()
    }

    /// Most recent launch for a key, running or not
    pub async fn latest_for_key(&self, key: &ServiceKey) -> Result<Option<ProcessRecord>> {
        let sql = format!(
            "SELECT {} FROM processes \
             WHERE service_name = ? AND project_dir = ? \
             ORDER BY launch_id DESC LIMIT 1",
            COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(key.service_name.as_str())
            .bind(key.project_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        row.as_ref().map(row_to_process).transpose()
    }

    /// Running records, optionally restricted to one project
    pub async fn list_running(&self, project_dir: Option<&Path>) -> Result<Vec<ProcessRecord>> {
        let rows = match project_dir {
            Some(dir) => {
                let sql = format!(
                    "SELECT {} FROM processes WHERE is_running = 1 AND project_dir = ? \
                     ORDER BY launch_id",
                    COLUMNS
                );
                sqlx::query(&sql)
                    .bind(dir.to_string_lossy().into_owned())
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM processes WHERE is_running = 1 ORDER BY launch_id",
                    COLUMNS
                );
                sqlx::query(&sql).fetch_all(&self.pool).await
            }
        }
        .map_err(|e| Error::DbError(e.to_string()))?;

        rows.iter().map(row_to_process).collect()
    }

    /// Ports held by running records
    pub async fn used_ports(&self) -> Result<Vec<u16>> {
        let ports: Vec<i64> = sqlx::query_scalar(
            "SELECT assigned_port FROM processes WHERE is_running = 1 AND assigned_port IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::DbError(e.to_string()))?;

        Ok(ports
            .into_iter()
            .filter_map(|p| u16::try_from(p).ok())
            .collect())
    }

    /// Mark every running record whose processes are gone as exited with -1.
    ///
    /// `is_alive` decides liveness per record. Returns the records this sweep
    /// stopped.
    pub async fn sweep_dead<F>(&self, is_alive: F) -> Result<Vec<ProcessRecord>>
    where
        F: Fn(&ProcessRecord) -> bool,
    {
        let mut swept = Vec::new();
        for record in self.list_running(None).await? {
            if is_alive(&record) {
                continue;
            }
            if self.mark_exited(record.launch_id, EXIT_FOUND_DEAD).await? {
                info!(
                    "Process {} (launch {}) found dead, marked exited",
                    record.service_name, record.launch_id
                );
                swept.push(record);
            }
        }
        Ok(swept)
    }
}

fn row_to_process(row: &SqliteRow) -> Result<ProcessRecord> {
    let working_directory: String = row.get("working_directory");
    let project_dir: String = row.get("project_dir");
    let pid: i64 = row.get("pid");
    let wrapper_pid: Option<i64> = row.get("wrapper_pid");
    let assigned_port: Option<i64> = row.get("assigned_port");
    let is_running: i64 = row.get("is_running");
    let exit_code: Option<i64> = row.get("exit_code");

    Ok(ProcessRecord {
        launch_id: row.get("launch_id"),
        service_name: row.get("service_name"),
        command_line: row.get("command_line"),
        working_directory: PathBuf::from(working_directory),
        project_dir: PathBuf::from(project_dir),
        pid: u32::try_from(pid).unwrap_or(0),
        wrapper_pid: wrapper_pid.and_then(|p| u32::try_from(p).ok()),
        assigned_port: assigned_port.and_then(|p| u16::try_from(p).ok()),
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        is_running: is_running != 0,
        exit_code: exit_code.map(|c| c as i32),
    })
}
