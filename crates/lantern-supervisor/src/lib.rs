//! Lantern Supervisor - control operations over launched services
//!
//! Run, kill, restart and list services, follow their logs and keep the
//! store consistent with the OS by sweeping records whose processes died.

mod supervisor;
mod watch;

pub use supervisor::{
    KillAllFailure, KillAllReport, KillAllSummary, KillOutput, RestartOutput, RunOutput,
    ServiceState, ServiceStatus, Supervisor, WaitOutcome,
};
pub use watch::{WatchOptions, WatchOutcome};
