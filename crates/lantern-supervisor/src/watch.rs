//! Polling watch loop over a service's logs

use crate::Supervisor;
use lantern_core::{LogRecord, ProcessRecord, Result, INITIAL_LOG_COUNT, POLL_INTERVAL};
use lantern_db::LogSelector;
use lantern_logs::LogIterator;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct WatchOptions {
    pub poll_interval: Duration,
    /// Stop watching after this long even if the process is still running
    pub exit_after: Option<Duration>,
    /// Rows shown before following
    pub initial_limit: i64,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            exit_after: None,
            initial_limit: INITIAL_LOG_COUNT,
        }
    }
}

/// Why a watch session ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum WatchOutcome {
    Stopped { exit_code: Option<i32> },
    Disappeared,
    TimedOut,
    Interrupted,
}

impl WatchOutcome {
    pub fn describe(&self, name: &str) -> String {
        match self {
            WatchOutcome::Stopped {
                exit_code: Some(0),
            } => format!("Process '{}' has stopped: completed successfully", name),
            WatchOutcome::Stopped {
                exit_code: Some(code),
            } => format!("Process '{}' has stopped: failed with exit code {}", name, code),
            WatchOutcome::Stopped { exit_code: None } => {
                format!("Process '{}' has stopped", name)
            }
            WatchOutcome::Disappeared => format!("Process '{}' is no longer tracked", name),
            WatchOutcome::TimedOut | WatchOutcome::Interrupted => {
                "Stopped watching, process is still running in background".to_string()
            }
        }
    }
}

impl Supervisor {
    /// Stream logs for `selector` to `on_logs` until the process stops, the
    /// record disappears, `exit_after` elapses or `cancel` resolves.
    ///
    /// Cancelling never touches the supervised process.
    pub async fn watch<F, C>(
        &self,
        selector: LogSelector,
        options: WatchOptions,
        mut on_logs: F,
        cancel: C,
    ) -> Result<WatchOutcome>
    where
        F: FnMut(&[LogRecord]),
        C: Future<Output = ()>,
    {
        tokio::pin!(cancel);
        let deadline = options
            .exit_after
            .map(|d| tokio::time::Instant::now() + d);

        let mut iter = LogIterator::tail(
            self.db().clone(),
            selector.clone(),
            Some(options.initial_limit),
        );
        let initial = iter.next_logs().await?;
        if !initial.is_empty() {
            on_logs(&initial);
        }

        loop {
            self.sweep().await?;
            // Read the record before the logs so lines written just before
            // exit are still delivered
            let record = self.current_record(&selector).await?;

            let rows = iter.next_logs_with(None).await?;
            if !rows.is_empty() {
                on_logs(&rows);
            }

            match record {
                None => return Ok(WatchOutcome::Disappeared),
                Some(r) if !r.is_running => {
                    return Ok(WatchOutcome::Stopped {
                        exit_code: r.exit_code,
                    })
                }
                Some(_) => {}
            }

            let sleep = tokio::time::sleep(options.poll_interval);
            let expired = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                _ = &mut cancel => {
                    debug!("Watch interrupted");
                    return Ok(WatchOutcome::Interrupted);
                }
                _ = expired => return Ok(WatchOutcome::TimedOut),
                _ = sleep => {}
            }
        }
    }

    async fn current_record(&self, selector: &LogSelector) -> Result<Option<ProcessRecord>> {
        let processes = self.db().processes();
        match selector {
            LogSelector::Service(key) => processes.latest_for_key(key).await,
            LogSelector::Launch(id) => processes.get(*id).await,
        }
    }
}
