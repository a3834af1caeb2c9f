//! Logs repository - persisted output lines

use lantern_core::{unix_now, Error, LogRecord, LogType, Result, ServiceKey};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::path::PathBuf;

const COLUMNS: &str =
    "id, launch_id, service_name, project_dir, line_number, content, log_type, timestamp";

/// Which rows a query addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSelector {
    /// Every launch of a service in a project
    Service(ServiceKey),
    /// A single launch
    Launch(i64),
}

impl LogSelector {
    fn clause(&self) -> &'static str {
        match self {
            LogSelector::Service(_) => "service_name = ? AND project_dir = ?",
            LogSelector::Launch(_) => "launch_id = ?",
        }
    }
}

/// Which end of the matching rows a limit keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogOrder {
    /// First rows after the cursor
    #[default]
    Oldest,
    /// Most recent rows
    Newest,
}

/// Log query parameters. Results are always in ascending id order.
#[derive(Debug, Clone)]
pub struct LogQuery {
    pub selector: LogSelector,
    pub since_timestamp: Option<i64>,
    pub after_id: Option<i64>,
    pub limit: Option<i64>,
    pub order: LogOrder,
}

impl LogQuery {
    pub fn new(selector: LogSelector) -> Self {
        Self {
            selector,
            since_timestamp: None,
            after_id: None,
            limit: None,
            order: LogOrder::Oldest,
        }
    }

    pub fn after(mut self, id: i64) -> Self {
        self.after_id = Some(id);
        self
    }

    pub fn since(mut self, timestamp: i64) -> Self {
        self.since_timestamp = Some(timestamp);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Keep the most recent `limit` rows instead of the first
    pub fn newest(mut self) -> Self {
        self.order = LogOrder::Newest;
        self
    }
}

/// Repository for log rows
pub struct LogsRepository {
    pool: SqlitePool,
}

impl LogsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one line, returning its id
    pub async fn append(
        &self,
        launch_id: i64,
        key: &ServiceKey,
        line_number: i64,
        content: &str,
        log_type: LogType,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO process_output
                (launch_id, service_name, project_dir, line_number, content, log_type, timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(launch_id)
        .bind(key.service_name.as_str())
        .bind(key.project_str())
        .bind(line_number)
        .bind(content)
        .bind(log_type.as_str())
        .bind(unix_now())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::DbError(e.to_string()))?;

        Ok(result.last_insert_rowid())
    }

    /// Run a log query
    pub async fn query(&self, query: &LogQuery) -> Result<Vec<LogRecord>> {
        let direction = match query.order {
            LogOrder::Oldest => "ASC",
            LogOrder::Newest => "DESC",
        };
        let sql = format!(
            "SELECT {} FROM process_output \
             WHERE {} AND timestamp >= ? AND id > ? \
             ORDER BY id {} LIMIT ?",
            COLUMNS,
            query.selector.clause(),
            direction
        );

        let mut q = sqlx::query(&sql);
        q = match &query.selector {
            LogSelector::Service(key) => q.bind(key.service_name.as_str()).bind(key.project_str()),
            LogSelector::Launch(launch_id) => q.bind(*launch_id),
        };
        let rows = q
            .bind(query.since_timestamp.unwrap_or(i64::MIN))
            .bind(query.after_id.unwrap_or(0))
            // LIMIT -1 is unbounded in SQLite
            .bind(query.limit.unwrap_or(-1))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        let mut records = rows
            .iter()
            .map(row_to_log)
            .collect::<Result<Vec<_>>>()?;
        if query.order == LogOrder::Newest {
            records.reverse();
        }
        Ok(records)
    }

    /// Last row of one type written by a launch
    pub async fn last_of_type(&self, launch_id: i64, log_type: LogType) -> Result<Option<LogRecord>> {
        let sql = format!(
            "SELECT {} FROM process_output WHERE launch_id = ? AND log_type = ? \
             ORDER BY id DESC LIMIT 1",
            COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(launch_id)
            .bind(log_type.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        row.as_ref().map(row_to_log).transpose()
    }

    /// Delete every row for a service
    pub async fn clear_for_key(&self, key: &ServiceKey) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM process_output WHERE service_name = ? AND project_dir = ?")
                .bind(key.service_name.as_str())
                .bind(key.project_str())
                .execute(&self.pool)
                .await
                .map_err(|e| Error::DbError(e.to_string()))?;

        Ok(result.rows_affected())
    }

    pub async fn count(&self, selector: &LogSelector) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM process_output WHERE {}",
            selector.clause()
        );
        let q = sqlx::query_scalar::<_, i64>(&sql);
        let q = match selector {
            LogSelector::Service(key) => q.bind(key.service_name.as_str()).bind(key.project_str()),
            LogSelector::Launch(launch_id) => q.bind(*launch_id),
        };
        q.fetch_one(&self.pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))
    }
}

fn row_to_log(row: &SqliteRow) -> Result<LogRecord> {
    let project_dir: String = row.get("project_dir");
    let log_type: String = row.get("log_type");

    Ok(LogRecord {
        id: row.get("id"),
        launch_id: row.get("launch_id"),
        service_name: row.get("service_name"),
        project_dir: PathBuf::from(project_dir),
        line_number: row.get("line_number"),
        content: row.get("content"),
        log_type: log_type.parse()?,
        timestamp: row.get("timestamp"),
    })
}
