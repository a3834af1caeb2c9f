//! Control operations over the store, the wrapper and the OS

use lantern_core::{
    unix_now, Error, LaunchPayload, LogRecord, LogType, ProcessRecord, Project, ResolvedService,
    Result, RetentionPolicy, ServiceKey, EXIT_FOUND_DEAD, EXIT_KILLED, EXIT_SPAWN_FAILED,
    KILL_ALL_GRACE, KILL_GRACE, PID_REPORT_TIMEOUT,
};
use lantern_db::{CleanupReport, Database, LogSelector};
use lantern_logs::LogIterator;
use lantern_runtime::{
    allocate_port, port_is_free, spawn_wrapper, split_command_line, ProcessControl, Signal,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Child;
use tracing::{debug, info, warn};

const PID_POLL: Duration = Duration::from_millis(50);

/// Result of launching a service
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    pub record: ProcessRecord,
    /// Previously running instances stopped first
    pub replaced: Vec<ProcessRecord>,
}

/// Result of stopping a service
#[derive(Debug, Clone, Serialize)]
pub struct KillOutput {
    pub service_name: String,
    pub project_dir: PathBuf,
    pub killed: Vec<ProcessRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KillAllFailure {
    pub record: ProcessRecord,
    pub error: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KillAllSummary {
    pub total_found: usize,
    pub killed: usize,
    pub failed: usize,
    pub already_dead: usize,
}

/// Per-process outcome of stopping everything
#[derive(Debug, Clone, Default, Serialize)]
pub struct KillAllReport {
    pub killed: Vec<ProcessRecord>,
    pub failed: Vec<KillAllFailure>,
    pub already_dead: Vec<ProcessRecord>,
    pub summary: KillAllSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestartOutput {
    pub kill: KillOutput,
    pub run: RunOutput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceState {
    Running,
    Stopped,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Running => "RUNNING",
            ServiceState::Stopped => "STOPPED",
        }
    }
}

/// A configured service cross-referenced with the store
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub name: String,
    pub cwd: PathBuf,
    pub state: ServiceState,
    /// Active record, or the most recent one when stopped
    pub record: Option<ProcessRecord>,
}

/// How a wait-for-log ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WaitOutcome {
    Found { line: LogRecord },
    Exited { exit_code: Option<i32> },
    NotStarted,
    TimedOut,
}

/// Orchestrates the store, the wrapper and process control
pub struct Supervisor {
    db: Database,
    control: Arc<dyn ProcessControl>,
    wrapper_exe: PathBuf,
    kill_grace: Duration,
    kill_all_grace: Duration,
    pid_timeout: Duration,
}

impl Supervisor {
    pub fn new(db: Database, control: Arc<dyn ProcessControl>, wrapper_exe: PathBuf) -> Self {
        Self {
            db,
            control,
            wrapper_exe,
            kill_grace: KILL_GRACE,
            kill_all_grace: KILL_ALL_GRACE,
            pid_timeout: PID_REPORT_TIMEOUT,
        }
    }

    /// Override how long kill waits before escalating to SIGKILL
    pub fn with_kill_grace(mut self, kill_grace: Duration, kill_all_grace: Duration) -> Self {
        self.kill_grace = kill_grace;
        self.kill_all_grace = kill_all_grace;
        self
    }

    /// Override how long run waits for the wrapper to report the child's pid
    pub fn with_pid_timeout(mut self, pid_timeout: Duration) -> Self {
        self.pid_timeout = pid_timeout;
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// A record is alive while its child or its wrapper is. A fresh record
    /// with neither pid yet is still being launched.
    pub fn is_record_alive(&self, record: &ProcessRecord) -> bool {
        let child = record
            .child_pid()
            .is_some_and(|pid| self.control.is_alive(pid));
        let wrapper = record
            .wrapper_pid
            .is_some_and(|pid| self.control.is_alive(pid));
        let launching = record.pid == 0
            && record.wrapper_pid.is_none()
            && unix_now() - record.start_time < self.pid_timeout.as_secs() as i64;
        child || wrapper || launching
    }

    /// Mark running records whose processes are gone as exited (-1)
    pub async fn sweep(&self) -> Result<Vec<ProcessRecord>> {
        self.db
            .processes()
            .sweep_dead(|record| self.is_record_alive(record))
            .await
    }

    /// Launch a service, replacing any running instance
    pub async fn run(&self, service: &ResolvedService) -> Result<RunOutput> {
        self.sweep().await?;
        let key = service.key();
        let processes = self.db.processes();

        let mut replaced = Vec::new();
        if let Some(existing) = processes.find_active_by_key(&key).await? {
            info!("Replacing running instance of {} (launch {})", key, existing.launch_id);
            self.stop_record(&existing).await?;
            replaced.push(existing);
        }
        if let Some(existing) = processes.find_active(&service.shell, &service.cwd).await? {
            info!(
                "Stopping launch {} running the same command in {}",
                existing.launch_id,
                service.cwd.display()
            );
            self.stop_record(&existing).await?;
            replaced.push(existing);
        }

        let port = if service.assign_port {
            Some(self.pick_port(&service.project_dir).await?)
        } else {
            None
        };

        let launch_id = processes
            .create(&key, &service.shell, &service.cwd, port)
            .await?;

        let (command, args) = split_command_line(&service.shell);
        let payload = LaunchPayload {
            command,
            args,
            cwd: service.cwd.clone(),
            launch_id,
            env: service.env.clone(),
            assigned_port: port,
        };

        let mut wrapper = match spawn_wrapper(&self.wrapper_exe, &payload).await {
            Ok(child) => child,
            Err(e) => {
                processes.mark_exited(launch_id, EXIT_SPAWN_FAILED).await?;
                return Err(e);
            }
        };
        if let Some(wrapper_pid) = wrapper.id() {
            processes.update_wrapper_pid(launch_id, wrapper_pid).await?;
        }

        let record = self.await_pid(launch_id, &mut wrapper).await?;
        Ok(RunOutput { record, replaced })
    }

    /// Wait for the wrapper to report the child's pid or to die trying
    async fn await_pid(&self, launch_id: i64, wrapper: &mut Child) -> Result<ProcessRecord> {
        let processes = self.db.processes();
        let deadline = tokio::time::Instant::now() + self.pid_timeout;

        loop {
            let record = processes
                .get(launch_id)
                .await?
                .ok_or_else(|| Error::ProcessNotFound(format!("launch {}", launch_id)))?;
            // A reported pid means the child started, even if it already exited
            if record.pid != 0 {
                return Ok(record);
            }

            let wrapper_exit = wrapper.try_wait()?;
            if !record.is_running || wrapper_exit.is_some() {
                let code = wrapper_exit
                    .and_then(|status| status.code())
                    .unwrap_or(EXIT_SPAWN_FAILED);
                processes.mark_exited(launch_id, code).await?;
                return Err(self.spawn_error(launch_id).await);
            }

            if tokio::time::Instant::now() >= deadline {
                warn!(
                    "Wrapper for launch {} has not reported a pid after {:?}",
                    launch_id, self.pid_timeout
                );
                return Ok(record);
            }
            tokio::time::sleep(PID_POLL).await;
        }
    }

    async fn spawn_error(&self, launch_id: i64) -> Error {
        match self
            .db
            .logs()
            .last_of_type(launch_id, LogType::Stderr)
            .await
        {
            Ok(Some(line)) => Error::SpawnFailed(line.content),
            _ => Error::spawn(format!("wrapper for launch {} exited before starting", launch_id)),
        }
    }

    /// The project's port if it is assigned and free, else a fresh one
    async fn pick_port(&self, project_dir: &Path) -> Result<u16> {
        if let Some(port) = self.db.ports().get(project_dir).await? {
            let held = self.db.processes().used_ports().await?.contains(&port);
            if !held && port_is_free(port) {
                return Ok(port);
            }
            warn!("Project port {} is busy, allocating another", port);
        }
        allocate_port(&self.db).await
    }

    /// Terminate a record's wrapper tree, then its child tree; escalate to
    /// SIGKILL after the grace period
    async fn stop_record(&self, record: &ProcessRecord) -> Result<()> {
        let pids: Vec<u32> = record
            .wrapper_pid
            .into_iter()
            .chain(record.child_pid())
            .collect();

        for &pid in &pids {
            if !self.control.kill_tree(pid, Signal::SIGTERM)? {
                debug!("Process {} already gone", pid);
            }
        }

        if !self.wait_dead(&pids, self.kill_grace).await {
            warn!(
                "Launch {} did not stop within {:?}, sending SIGKILL",
                record.launch_id, self.kill_grace
            );
            for &pid in &pids {
                self.control.kill_tree(pid, Signal::SIGKILL)?;
            }
            self.wait_dead(&pids, Duration::from_millis(500)).await;
        }

        // No-op if the wrapper already recorded the real exit code
        self.db
            .processes()
            .mark_exited(record.launch_id, EXIT_KILLED)
            .await?;
        Ok(())
    }

    async fn wait_dead(&self, pids: &[u32], timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if pids.iter().all(|&pid| !self.control.is_alive(pid)) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(PID_POLL).await;
        }
    }

    /// Stop every running instance of a service
    pub async fn kill(&self, key: &ServiceKey) -> Result<KillOutput> {
        self.sweep().await?;
        let running = self
            .db
            .processes()
            .list_running(Some(&key.project_dir))
            .await?;

        let mut killed = Vec::new();
        for record in running
            .into_iter()
            .filter(|r| r.service_name == key.service_name)
        {
            self.stop_record(&record).await?;
            info!("Killed {} (launch {})", key, record.launch_id);
            killed.push(record);
        }

        let message = killed.is_empty().then(|| {
            format!(
                "No running processes found for service '{}' in project '{}'",
                key.service_name,
                key.project_dir.display()
            )
        });
        Ok(KillOutput {
            service_name: key.service_name.clone(),
            project_dir: key.project_dir.clone(),
            killed,
            message,
        })
    }

    /// Stop every running process in the store; failures are reported per item
    pub async fn kill_all(&self) -> Result<KillAllReport> {
        let running = self.db.processes().list_running(None).await?;
        if running.is_empty() {
            return Ok(KillAllReport {
                message: Some("No running processes found to kill.".to_string()),
                ..Default::default()
            });
        }

        let mut report = KillAllReport::default();
        report.summary.total_found = running.len();
        for record in running {
            match self.force_stop(&record).await {
                Ok(true) => report.killed.push(record),
                Ok(false) => report.already_dead.push(record),
                Err(e) => {
                    warn!("Failed to kill launch {}: {}", record.launch_id, e);
                    report.failed.push(KillAllFailure {
                        record,
                        error: e.to_string(),
                    });
                }
            }
        }

        report.summary.killed = report.killed.len();
        report.summary.failed = report.failed.len();
        report.summary.already_dead = report.already_dead.len();
        Ok(report)
    }

    /// TERM, short wait, then KILL. `Ok(false)` if the record was already dead.
    async fn force_stop(&self, record: &ProcessRecord) -> Result<bool> {
        let processes = self.db.processes();
        if !self.is_record_alive(record) {
            processes
                .mark_exited(record.launch_id, EXIT_FOUND_DEAD)
                .await?;
            return Ok(false);
        }

        let pids: Vec<u32> = record
            .child_pid()
            .into_iter()
            .chain(record.wrapper_pid)
            .collect();
        for &pid in &pids {
            self.control.kill_tree(pid, Signal::SIGTERM)?;
        }

        tokio::time::sleep(self.kill_all_grace).await;
        let survivors: Vec<u32> = pids
            .iter()
            .copied()
            .filter(|&pid| self.control.is_alive(pid))
            .collect();
        if !survivors.is_empty() {
            for &pid in &survivors {
                self.control.kill_tree(pid, Signal::SIGKILL)?;
            }
            tokio::time::sleep(self.kill_all_grace).await;
        }

        processes.mark_exited(record.launch_id, EXIT_KILLED).await?;
        Ok(true)
    }

    /// Kill then run the same service
    pub async fn restart(&self, service: &ResolvedService) -> Result<RestartOutput> {
        let kill = self.kill(&service.key()).await?;
        let run = self.run(service).await?;
        Ok(RestartOutput { kill, run })
    }

    /// Ask a running wrapper to restart its child in place (SIGUSR1)
    pub async fn signal_restart(&self, key: &ServiceKey) -> Result<ProcessRecord> {
        self.sweep().await?;
        let record = self
            .db
            .processes()
            .find_active_by_key(key)
            .await?
            .ok_or_else(|| Error::ProcessNotFound(key.to_string()))?;
        let wrapper_pid = record
            .wrapper_pid
            .ok_or_else(|| Error::ProcessNotFound(format!("wrapper for {}", key)))?;

        if !self.control.signal(wrapper_pid, Signal::SIGUSR1)? {
            return Err(Error::ProcessNotFound(format!(
                "wrapper {} for {}",
                wrapper_pid, key
            )));
        }
        info!("Sent restart signal to wrapper {} for {}", wrapper_pid, key);
        Ok(record)
    }

    /// Running records, optionally limited to one project
    pub async fn list_running(&self, project_dir: Option<&Path>) -> Result<Vec<ProcessRecord>> {
        self.sweep().await?;
        self.db.processes().list_running(project_dir).await
    }

    /// Every configured service with its RUNNING/STOPPED state
    pub async fn list_services(&self, project: &Project) -> Result<Vec<ServiceStatus>> {
        self.sweep().await?;
        let processes = self.db.processes();

        let mut statuses = Vec::new();
        for service in project.resolve_all() {
            let key = service.key();
            let (state, record) = match processes.find_active_by_key(&key).await? {
                Some(active) => (ServiceState::Running, Some(active)),
                None => (ServiceState::Stopped, processes.latest_for_key(&key).await?),
            };
            statuses.push(ServiceStatus {
                name: service.name,
                cwd: service.cwd,
                state,
                record,
            });
        }
        Ok(statuses)
    }

    /// Latest record for a service and its most recent `lines` log rows
    pub async fn logs(
        &self,
        key: &ServiceKey,
        lines: i64,
    ) -> Result<(Option<ProcessRecord>, Vec<LogRecord>)> {
        self.sweep().await?;
        let record = self.db.processes().latest_for_key(key).await?;
        let mut iter = LogIterator::tail(
            self.db.clone(),
            LogSelector::Service(key.clone()),
            Some(lines),
        );
        let rows = iter.next_logs().await?;
        Ok((record, rows))
    }

    pub async fn clear_logs(&self, key: &ServiceKey) -> Result<u64> {
        self.db.logs().clear_for_key(key).await
    }

    /// Sweep, apply retention, optionally vacuum
    pub async fn cleanup(&self, policy: &RetentionPolicy, vacuum: bool) -> Result<CleanupReport> {
        self.sweep().await?;
        let report = self.db.cleanup(policy).await?;
        if vacuum {
            self.db.vacuum().await?;
        }
        Ok(report)
    }

    /// Assign a port to a project
    pub async fn assign_port(&self, project_dir: &Path, port: u16) -> Result<()> {
        let held = self.db.processes().list_running(None).await?.into_iter().find(|r| {
            r.assigned_port == Some(port) && r.project_dir.as_path() != project_dir
        });
        if let Some(record) = held {
            warn!("Port {} is held by {}", port, record.key());
            return Err(Error::PortUnavailable(port));
        }
        self.db.ports().set(project_dir, port).await?;
        info!("Assigned port {} to {}", port, project_dir.display());
        Ok(())
    }

    /// Wait until the current launch of a service prints `message`
    pub async fn wait_for_log(
        &self,
        key: &ServiceKey,
        message: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<WaitOutcome> {
        const SEARCH_LIMIT: i64 = 1000;

        let mut iter = LogIterator::tail(
            self.db.clone(),
            LogSelector::Service(key.clone()),
            Some(SEARCH_LIMIT),
        );
        let initial = iter.next_logs().await?;

        // Only the latest launch counts
        match initial.iter().rposition(is_start_marker) {
            Some(start) => {
                if let Some(outcome) = scan(&initial[start..], message) {
                    return Ok(outcome);
                }
            }
            None => {
                // A chatty launch can push its start marker out of the tail window
                let Some(record) = self.db.processes().find_active_by_key(key).await? else {
                    return Ok(WaitOutcome::NotStarted);
                };
                iter = LogIterator::from_start(
                    self.db.clone(),
                    LogSelector::Launch(record.launch_id),
                    Some(SEARCH_LIMIT),
                );
                if let Some(outcome) = scan_from_start(&mut iter, message).await? {
                    return Ok(outcome);
                }
            }
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() >= deadline {
                return Ok(WaitOutcome::TimedOut);
            }
            tokio::time::sleep(poll_interval).await;

            let rows = iter.next_logs_with(None).await?;
            if let Some(outcome) = scan(&rows, message) {
                return Ok(outcome);
            }
            if rows.is_empty() {
                self.sweep().await?;
                if let Some(record) = self.db.processes().latest_for_key(key).await? {
                    if !record.is_running {
                        return Ok(WaitOutcome::Exited {
                            exit_code: record.exit_code,
                        });
                    }
                }
            }
        }
    }
}

fn is_start_marker(row: &LogRecord) -> bool {
    row.log_type == LogType::ProcessStarted
}

/// Page through a launch from its first row. A later start marker (an in-place
/// restart) discards matches from before it.
async fn scan_from_start(iter: &mut LogIterator, message: &str) -> Result<Option<WaitOutcome>> {
    let mut found = None;
    loop {
        let page = iter.next_logs().await?;
        if page.is_empty() {
            return Ok(found);
        }
        let from = match page.iter().rposition(is_start_marker) {
            Some(start) => {
                found = None;
                start
            }
            None => 0,
        };
        if found.is_none() {
            found = scan(&page[from..], message);
        }
    }
}

fn scan(rows: &[LogRecord], message: &str) -> Option<WaitOutcome> {
    for row in rows {
        if row.log_type == LogType::ProcessExited {
            let exit_code = row
                .content
                .rsplit(' ')
                .next()
                .and_then(|c| c.parse().ok());
            return Some(WaitOutcome::Exited { exit_code });
        }
        if !row.log_type.is_marker() && row.content.contains(message) {
            return Some(WaitOutcome::Found { line: row.clone() });
        }
    }
    None
}
