//! Lantern Database - SQLite persistence layer
//!
//! One on-disk store shared by every CLI invocation and every wrapper. WAL
//! mode plus a busy timeout is the only cross-process coordination.

pub mod logs;
pub mod ports;
pub mod processes;
pub mod retention;
pub mod schema;

use lantern_core::{Error, Result, DB_BUSY_TIMEOUT};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::{debug, info};

pub use logs::{LogOrder, LogQuery, LogSelector, LogsRepository};
pub use ports::PortsRepository;
pub use processes::ProcessesRepository;
pub use retention::CleanupReport;

/// Database connection and operations
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the store at `path`
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::DbError(e.to_string()))?;
        }

        debug!("Opening database: {}", path.display());

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(DB_BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        // Owner-only access
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
                tracing::warn!("Failed to set database file permissions: {}", e);
            }
        }

        sqlx::query(schema::SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        info!("Database initialized at {}", path.display());
        Ok(Self { pool })
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get processes repository
    pub fn processes(&self) -> ProcessesRepository {
        ProcessesRepository::new(self.pool.clone())
    }

    /// Get logs repository
    pub fn logs(&self) -> LogsRepository {
        LogsRepository::new(self.pool.clone())
    }

    /// Get project ports repository
    pub fn ports(&self) -> PortsRepository {
        PortsRepository::new(self.pool.clone())
    }

    /// Reclaim space freed by cleanup
    pub async fn vacuum(&self) -> Result<()> {
        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;
        Ok(())
    }

    /// Close the database connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
