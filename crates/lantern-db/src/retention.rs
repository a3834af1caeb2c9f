//! Retention cleanup for old logs and stopped processes

use crate::Database;
use lantern_core::{unix_now, Error, Result, RetentionPolicy};
use tracing::{debug, info};

/// Rows removed by one cleanup pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub logs_over_cap: u64,
    pub expired_logs: u64,
    pub failed_processes: u64,
    pub successful_processes: u64,
    pub orphan_logs: u64,
}

impl CleanupReport {
    pub fn total(&self) -> u64 {
        self.logs_over_cap
            + self.expired_logs
            + self.failed_processes
            + self.successful_processes
            + self.orphan_logs
    }
}

impl Database {
    /// Apply the retention policy now
    pub async fn cleanup(&self, policy: &RetentionPolicy) -> Result<CleanupReport> {
        self.cleanup_at(unix_now(), policy).await
    }

    /// Apply the retention policy as of `now`. Running records are never deleted.
    pub async fn cleanup_at(&self, now: i64, policy: &RetentionPolicy) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();

        report.logs_over_cap = self
            .exec(
                r#"
                DELETE FROM process_output WHERE id IN (
                    SELECT id FROM (
                        SELECT id, ROW_NUMBER() OVER (PARTITION BY launch_id ORDER BY id DESC) AS rn
                        FROM process_output
                    ) WHERE rn > ?
                )
                "#,
                Some(policy.max_logs_per_launch),
            )
            .await?;

        report.expired_logs = self
            .exec(
                "DELETE FROM process_output WHERE timestamp < ?",
                Some(now - policy.log_max_age.as_secs() as i64),
            )
            .await?;

        report.failed_processes = self
            .exec(
                r#"
                DELETE FROM processes
                WHERE is_running = 0
                  AND COALESCE(exit_code, -1) != 0
                  AND COALESCE(end_time, start_time) < ?
                "#,
                Some(now - policy.failed_max_age.as_secs() as i64),
            )
            .await?;

        report.successful_processes = self
            .exec(
                r#"
                DELETE FROM processes
                WHERE is_running = 0
                  AND exit_code = 0
                  AND COALESCE(end_time, start_time) < ?
                "#,
                Some(now - policy.success_max_age.as_secs() as i64),
            )
            .await?;

        report.orphan_logs = self
            .exec(
                "DELETE FROM process_output WHERE launch_id NOT IN (SELECT launch_id FROM processes)",
                None,
            )
            .await?;

        if report.total() > 0 {
            info!("Cleanup removed {} rows: {:?}", report.total(), report);
        } else {
            debug!("Cleanup found nothing to remove");
        }
        Ok(report)
    }

    async fn exec(&self, sql: &str, arg: Option<i64>) -> Result<u64> {
        let mut query = sqlx::query(sql);
        if let Some(arg) = arg {
            query = query.bind(arg);
        }
        let result = query
            .execute(self.pool())
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;
        Ok(result.rows_affected())
    }
}
