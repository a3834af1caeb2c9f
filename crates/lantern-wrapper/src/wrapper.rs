//! The wrapper event loop: owns one child process and streams its output

use lantern_core::{
    Error, LaunchPayload, LogType, Result, RetentionPolicy, ServiceKey, EXIT_SPAWN_FAILED,
    PORT_FREE_TIMEOUT, RESTART_DELAY,
};
use lantern_db::Database;
use lantern_logs::strip_clear_screen;
use lantern_runtime::{wait_port_free, ProcessControl, Signal};
use std::io::Write;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::state::{Control, WrapperState};

/// Timing knobs for the wrapper
#[derive(Debug, Clone)]
pub struct WrapperOptions {
    /// Pause between the old child exiting and the new one starting
    pub restart_delay: Duration,
    /// Bound on waiting for the assigned port to be released
    pub port_wait: Duration,
    /// How long to wait for output readers after the child exits
    pub drain_timeout: Duration,
    /// Retention policy applied once after the first start
    pub cleanup: Option<RetentionPolicy>,
}

impl Default for WrapperOptions {
    fn default() -> Self {
        Self {
            restart_delay: RESTART_DELAY,
            port_wait: PORT_FREE_TIMEOUT,
            drain_timeout: Duration::from_millis(500),
            cleanup: Some(RetentionPolicy::default()),
        }
    }
}

#[derive(Debug)]
struct OutputLine {
    log_type: LogType,
    content: String,
}

enum Event {
    Control(Control),
    Output(OutputLine),
    Exited(std::io::Result<ExitStatus>),
}

/// Supervises one launch: starts the child, persists its output, and reacts
/// to restart and shutdown requests until the child is gone for good.
pub struct Wrapper {
    db: Database,
    payload: LaunchPayload,
    key: ServiceKey,
    control: Arc<dyn ProcessControl>,
    options: WrapperOptions,
    state: WrapperState,
    /// Next line number; never reset across restarts
    next_line: i64,
    child: Option<Child>,
    child_pid: Option<u32>,
    readers: Vec<JoinHandle<()>>,
    lines_tx: mpsc::UnboundedSender<OutputLine>,
    lines_rx: mpsc::UnboundedReceiver<OutputLine>,
}

impl Wrapper {
    pub fn new(
        db: Database,
        payload: LaunchPayload,
        key: ServiceKey,
        control: Arc<dyn ProcessControl>,
    ) -> Self {
        let (lines_tx, lines_rx) = mpsc::unbounded_channel();
        Self {
            db,
            payload,
            key,
            control,
            options: WrapperOptions::default(),
            state: WrapperState::Starting,
            next_line: 1,
            child: None,
            child_pid: None,
            readers: Vec::new(),
            lines_tx,
            lines_rx,
        }
    }

    pub fn with_options(mut self, options: WrapperOptions) -> Self {
        self.options = options;
        self
    }

    /// Run until the child exits for good, returning its exit code
    pub async fn run(mut self, mut control_rx: mpsc::UnboundedReceiver<Control>) -> Result<i32> {
        info!(
            "Wrapper for {} (launch {}) starting: {}",
            self.key,
            self.payload.launch_id,
            self.payload.display_command()
        );

        if let Err(e) = self.start_child(false).await {
            return self.fail_spawn(e).await;
        }

        if let Some(policy) = self.options.cleanup {
            if let Err(e) = self.db.cleanup(&policy).await {
                warn!("Retention cleanup failed: {}", e);
            }
        }

        loop {
            let event = tokio::select! {
                Some(control) = control_rx.recv() => Event::Control(control),
                Some(line) = self.lines_rx.recv() => Event::Output(line),
                status = wait_for_exit(&mut self.child) => Event::Exited(status),
            };

            match event {
                Event::Output(line) => self.persist_line(line).await,
                Event::Control(Control::Restart) => self.request_restart().await,
                Event::Control(Control::Shutdown(reason)) => self.request_shutdown(reason),
                Event::Exited(status) => {
                    self.child = None;
                    self.drain_output().await;

                    let code = match status {
                        Ok(status) => exit_code(status),
                        Err(e) => {
                            error!("Failed to wait for child: {}", e);
                            1
                        }
                    };
                    info!(
                        "Child {:?} exited with code {} while {}",
                        self.child_pid, code, self.state
                    );

                    if self.state != WrapperState::Restarting {
                        return self.finish(code).await;
                    }
                    if !self.await_restart_window(&mut control_rx).await {
                        return self.finish(code).await;
                    }
                    if let Err(e) = self.start_child(true).await {
                        return self.fail_spawn(e).await;
                    }
                }
            }
        }
    }

    async fn start_child(&mut self, restarted: bool) -> Result<()> {
        self.state = WrapperState::Starting;

        let mut cmd = Command::new(&self.payload.command);
        cmd.args(&self.payload.args)
            .current_dir(&self.payload.cwd)
            .envs(&self.payload.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);
        if let Some(port) = self.payload.assigned_port {
            cmd.env("PORT", port.to_string());
        }

        let mut child = cmd.spawn().map_err(|e| {
            Error::spawn(format!(
                "Cannot run '{}': {}",
                self.payload.display_command(),
                e
            ))
        })?;
        let pid = child
            .id()
            .ok_or_else(|| Error::spawn("Process started but no PID available"))?;

        if let Some(stdout) = child.stdout.take() {
            self.readers
                .push(spawn_reader(stdout, LogType::Stdout, self.lines_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            self.readers
                .push(spawn_reader(stderr, LogType::Stderr, self.lines_tx.clone()));
        }
        self.child = Some(child);
        self.child_pid = Some(pid);

        if let Err(e) = self
            .db
            .processes()
            .update_pid(self.payload.launch_id, pid)
            .await
        {
            error!("Failed to record PID {}: {}", pid, e);
            self.abandon_child(pid).await;
            return Err(e);
        }

        let verb = if restarted { "restarted" } else { "started" };
        self.append(
            LogType::ProcessStarted,
            &format!("Process {} (pid {})", verb, pid),
        )
        .await;
        info!("Process {} {} with PID {}", self.key.service_name, verb, pid);

        self.state = WrapperState::Running;
        Ok(())
    }

    /// Kill a child whose pid never reached the store and reap it
    async fn abandon_child(&mut self, pid: u32) {
        if let Err(e) = self.control.kill_tree(pid, Signal::SIGKILL) {
            error!("Failed to kill untracked process {}: {}", pid, e);
        }
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.wait().await {
                error!("Failed to reap process {}: {}", pid, e);
            }
        }
        self.drain_output().await;
    }

    async fn request_restart(&mut self) {
        if !self.state.accepts_restart() {
            debug!("Ignoring restart request while {}", self.state);
            return;
        }
        let Some(pid) = self.child_pid else {
            return;
        };

        self.append(LogType::Stdout, "Restart signal received").await;
        self.state = WrapperState::Restarting;

        if let Err(e) = self.control.kill_tree(pid, Signal::SIGTERM) {
            error!("Failed to stop process {} for restart: {}", pid, e);
            self.append(LogType::Stderr, &format!("Restart failed: {}", e))
                .await;
            self.state = WrapperState::Running;
        }
    }

    fn request_shutdown(&mut self, reason: &str) {
        if !self.state.accepts_shutdown() {
            debug!("Already shutting down, ignoring {}", reason);
            return;
        }
        info!("Shutdown requested ({})", reason);
        let was_restarting = self.state == WrapperState::Restarting;
        self.state = WrapperState::ShuttingDown;

        // A restart already sent the signal
        if was_restarting || self.child.is_none() {
            return;
        }
        if let Some(pid) = self.child_pid {
            if let Err(e) = self.control.kill_tree(pid, Signal::SIGTERM) {
                error!("Failed to stop process {}: {}", pid, e);
            }
        }
    }

    /// Wait out the restart delay and the port release. Returns false if the
    /// restart is abandoned.
    async fn await_restart_window(
        &mut self,
        control_rx: &mut mpsc::UnboundedReceiver<Control>,
    ) -> bool {
        let delay = self.options.restart_delay;
        let port_wait = self.options.port_wait;
        let port = self.payload.assigned_port;
        let ready = async move {
            tokio::time::sleep(delay).await;
            match port {
                Some(port) => wait_port_free(port, port_wait).await,
                None => true,
            }
        };
        tokio::pin!(ready);

        loop {
            tokio::select! {
                ok = &mut ready => {
                    if !ok {
                        let port = port.unwrap_or_default();
                        error!("Port {} still in use after {:?}, restart abandoned", port, port_wait);
                        self.append(
                            LogType::Stderr,
                            &format!("Port {} still in use, restart abandoned", port),
                        )
                        .await;
                    }
                    return ok;
                }
                Some(control) = control_rx.recv() => match control {
                    Control::Shutdown(reason) => {
                        info!("Shutdown ({}) during restart, not relaunching", reason);
                        self.state = WrapperState::ShuttingDown;
                        return false;
                    }
                    Control::Restart => debug!("Restart already in progress"),
                },
            }
        }
    }

    /// Wait briefly for readers to hit EOF, then persist whatever they sent
    async fn drain_output(&mut self) {
        for mut reader in std::mem::take(&mut self.readers) {
            if tokio::time::timeout(self.options.drain_timeout, &mut reader)
                .await
                .is_err()
            {
                debug!("Output pipe still held open after exit, detaching reader");
                reader.abort();
            }
        }
        while let Ok(line) = self.lines_rx.try_recv() {
            self.persist_line(line).await;
        }
    }

    async fn persist_line(&mut self, line: OutputLine) {
        let content = match line.log_type {
            LogType::Stdout => strip_clear_screen(&line.content).into_owned(),
            _ => line.content,
        };

        match line.log_type {
            LogType::Stderr => {
                let _ = writeln!(std::io::stderr(), "{}", content);
            }
            _ => {
                let _ = writeln!(std::io::stdout(), "{}", content);
            }
        }

        self.append(line.log_type, &content).await;
    }

    async fn append(&mut self, log_type: LogType, content: &str) {
        let line_number = self.next_line;
        self.next_line += 1;
        if let Err(e) = self
            .db
            .logs()
            .append(
                self.payload.launch_id,
                &self.key,
                line_number,
                content,
                log_type,
            )
            .await
        {
            error!("Failed to persist log line {}: {}", line_number, e);
        }
    }

    async fn finish(&mut self, code: i32) -> Result<i32> {
        self.state = WrapperState::Terminated;
        self.append(
            LogType::ProcessExited,
            &format!("Process exited with code {}", code),
        )
        .await;
        self.db
            .processes()
            .mark_exited(self.payload.launch_id, code)
            .await?;
        info!("Wrapper for {} finished with code {}", self.key, code);
        Ok(code)
    }

    async fn fail_spawn(&mut self, err: Error) -> Result<i32> {
        error!("{}", err);
        // The reader of this row wraps it back into `SpawnFailed`
        let detail = match &err {
            Error::SpawnFailed(message) => message.clone(),
            other => other.to_string(),
        };
        self.append(LogType::Stderr, &detail).await;
        self.finish(EXIT_SPAWN_FAILED).await?;
        Err(err)
    }
}

/// Resolves when the child exits; pends forever when there is none
async fn wait_for_exit(child: &mut Option<Child>) -> std::io::Result<ExitStatus> {
    match child {
        Some(child) => child.wait().await,
        None => std::future::pending().await,
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(1)
}

fn spawn_reader<R>(
    stream: R,
    log_type: LogType,
    tx: mpsc::UnboundedSender<OutputLine>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let content = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\n', '\r'])
                        .to_string();
                    if tx.send(OutputLine { log_type, content }).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!("Output reader error: {}", e);
                    break;
                }
            }
        }
    })
}
