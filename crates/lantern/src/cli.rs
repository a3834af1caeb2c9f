//! CLI argument definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lantern")]
#[command(version, about = "Local dev-process supervisor with persisted logs")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output in JSON format instead of tables
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Launch a service and follow its logs
    Run(RunArgs),

    /// Launch services in the background
    Start {
        /// Service names (default service when omitted)
        names: Vec<String>,
    },

    /// Kill and relaunch a service
    Restart(RestartArgs),

    /// Kill a service's running processes
    #[command(visible_alias = "stop")]
    Kill {
        /// Service name (default service when omitted)
        name: Option<String>,
    },

    /// Kill every process Lantern knows about
    KillAll,

    /// Show the configured services of this project
    #[command(visible_alias = "ls")]
    List,

    /// Show every running process across projects
    ListAll,

    /// Print recent logs of a service
    Logs(LogsArgs),

    /// Follow the logs of a running service
    Watch(WatchArgs),

    /// Wait until a service prints a message
    WaitForLog(WaitForLogArgs),

    /// Delete stored logs of a service
    ClearLogs {
        /// Service name (default service when omitted)
        name: Option<String>,
    },

    /// Delete the whole Lantern database
    EraseDatabase,

    /// Apply log and process retention now
    Cleanup {
        /// Reclaim disk space afterwards
        #[arg(long)]
        vacuum: bool,
    },

    /// Add a service to .lantern-setup.json
    AddService(AddServiceArgs),

    /// Assign a port to this project
    AssignPort {
        port: u16,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Service name (default service when omitted)
    pub name: Option<String>,

    /// Return once the process is launched instead of following logs
    #[arg(short, long)]
    pub detach: bool,

    /// Stop following after this many seconds
    #[arg(long)]
    pub exit_after: Option<u64>,
}

#[derive(Args)]
pub struct RestartArgs {
    /// Service name (default service when omitted)
    pub name: Option<String>,

    /// Ask the wrapper to restart the child instead of relaunching it
    #[arg(long)]
    pub in_place: bool,
}

#[derive(Args)]
pub struct LogsArgs {
    /// Service name (default service when omitted)
    pub name: Option<String>,

    /// Number of lines to show
    #[arg(short = 'n', long, default_value = "100")]
    pub lines: i64,
}

#[derive(Args)]
pub struct WatchArgs {
    /// Service name (default service when omitted)
    pub name: Option<String>,

    /// Stop watching after this many seconds
    #[arg(long)]
    pub exit_after: Option<u64>,
}

#[derive(Args)]
pub struct WaitForLogArgs {
    /// Text to look for
    pub message: String,

    /// Service name (default service when omitted)
    pub name: Option<String>,

    /// Give up after this many seconds
    #[arg(long, default_value = "60")]
    pub timeout: u64,
}

#[derive(Args)]
pub struct AddServiceArgs {
    /// Service name
    pub name: String,

    /// Shell command line to launch
    pub shell: String,

    /// Working directory relative to the config file
    #[arg(long)]
    pub root: Option<String>,

    /// Environment as a JSON object, e.g. '{"NODE_ENV":"development"}'
    #[arg(long)]
    pub env: Option<String>,

    /// Make this the default service
    #[arg(long)]
    pub default: bool,

    /// Pass an allocated port through PORT
    #[arg(long)]
    pub assign_port: bool,

    /// Directory to create or extend the config in
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,
}
