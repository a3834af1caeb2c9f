//! Lantern Wrapper - detached supervisor for one launched service
//!
//! The wrapper reads its launch payload from stdin, starts the child, streams
//! its output into the store and turns OS signals into [`Control`] messages:
//! SIGUSR1 restarts the child, SIGINT and SIGTERM shut it down.

mod state;
mod wrapper;

pub use state::{Control, WrapperState};
pub use wrapper::{Wrapper, WrapperOptions};

use lantern_core::{constants, Error, LaunchPayload, Result};
use lantern_db::Database;
use lantern_runtime::OsProcessControl;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging: stderr by default, `wrapper.log` in the state
/// directory when `LANTERN_ENABLE_LOGS` is set
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "lantern_wrapper=info,lantern_db=info".into());

    let to_file = std::env::var_os(constants::ENABLE_LOGS_ENV).is_some_and(|v| !v.is_empty());
    if to_file {
        let log_path = constants::wrapper_log_path();
        let log_dir = log_path.parent().unwrap_or_else(|| Path::new("."));
        let appender = tracing_appender::rolling::never(log_dir, constants::WRAPPER_LOG_FILE);
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(appender)
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Translate SIGUSR1/SIGINT/SIGTERM into control messages
pub fn forward_signals(tx: mpsc::UnboundedSender<Control>) -> Result<JoinHandle<()>> {
    let mut usr1 = signal(SignalKind::user_defined1())?;
    let mut term = signal(SignalKind::terminate())?;
    let mut int = signal(SignalKind::interrupt())?;

    Ok(tokio::spawn(async move {
        loop {
            let control = tokio::select! {
                Some(()) = usr1.recv() => Control::Restart,
                Some(()) = term.recv() => Control::Shutdown("SIGTERM"),
                Some(()) = int.recv() => Control::Shutdown("SIGINT"),
                else => break,
            };
            info!("Received {:?}", control);
            if tx.send(control).is_err() {
                break;
            }
        }
    }))
}

/// Wrapper entry point: read the payload from stdin and supervise until done.
///
/// Returns the exit code the wrapper process should exit with.
pub async fn run_from_stdin() -> Result<i32> {
    let mut input = String::new();
    tokio::io::stdin().read_to_string(&mut input).await?;
    let payload = LaunchPayload::from_json(&input)?;

    let home = constants::lantern_home();
    if !home.exists() {
        std::fs::create_dir_all(&home)?;
    }
    let db = Database::open(&constants::db_path()).await?;

    let record = db
        .processes()
        .get(payload.launch_id)
        .await?
        .ok_or_else(|| Error::ProcessNotFound(format!("launch {}", payload.launch_id)))?;

    let (tx, rx) = mpsc::unbounded_channel();
    let signals = forward_signals(tx)?;

    let wrapper = Wrapper::new(db.clone(), payload, record.key(), Arc::new(OsProcessControl));
    let result = wrapper.run(rx).await;

    signals.abort();
    db.close().await;
    result
}
