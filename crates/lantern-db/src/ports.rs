//! Project-scoped port assignments

use lantern_core::{unix_now, Error, Result};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::path::{Path, PathBuf};

/// Repository for per-project ports
pub struct PortsRepository {
    pool: SqlitePool,
}

impl PortsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, project_dir: &Path) -> Result<Option<u16>> {
        let port: Option<i64> =
            sqlx::query_scalar("SELECT port FROM project_ports WHERE project_dir = ?")
                .bind(project_dir.to_string_lossy().into_owned())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| Error::DbError(e.to_string()))?;

        Ok(port.and_then(|p| u16::try_from(p).ok()))
    }

    pub async fn set(&self, project_dir: &Path, port: u16) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO project_ports (project_dir, port, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(project_dir) DO UPDATE SET
                port = excluded.port,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(project_dir.to_string_lossy().into_owned())
        .bind(i64::from(port))
        .bind(unix_now())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::DbError(e.to_string()))?;

        Ok(())
    }

    /// Every assignment, ordered by project
    pub async fn all(&self) -> Result<Vec<(PathBuf, u16)>> {
        let rows = sqlx::query("SELECT project_dir, port FROM project_ports ORDER BY project_dir")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let dir: String = row.get("project_dir");
                let port: i64 = row.get("port");
                u16::try_from(port).ok().map(|p| (PathBuf::from(dir), p))
            })
            .collect())
    }
}
