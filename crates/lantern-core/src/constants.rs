//! Constants and default values for Lantern

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

/// Default Lantern state directory name (under the user's home)
pub const LANTERN_DIR: &str = ".lantern";

/// Environment variable overriding the state directory
pub const STATE_DIR_ENV: &str = "LANTERN_STATE_DIR";

/// Environment variable overriding the wrapper executable
pub const WRAPPER_BIN_ENV: &str = "LANTERN_WRAPPER_BIN";

/// Environment variable enabling the wrapper's diagnostic log file
pub const ENABLE_LOGS_ENV: &str = "LANTERN_ENABLE_LOGS";

/// Wrapper executable name
pub const WRAPPER_BIN: &str = "lantern-wrapper";

/// Database file name
pub const DB_FILE: &str = "lantern.db";

/// Wrapper diagnostic log file name
pub const WRAPPER_LOG_FILE: &str = "wrapper.log";

/// Per-project service configuration file
pub const SETUP_FILE: &str = ".lantern-setup.json";

/// Ports handed out by the allocator
pub const PORT_RANGE: RangeInclusive<u16> = 3001..=4000;

/// SQLite busy timeout shared by every process touching the store
pub const DB_BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll interval of the watch loop and wait-for-log
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Rows printed when a watch session starts
pub const INITIAL_LOG_COUNT: i64 = 100;

/// Pause between killing a child and relaunching it on restart
pub const RESTART_DELAY: Duration = Duration::from_millis(500);

/// How long a restart waits for the previous port to be released
pub const PORT_FREE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long Run waits for the wrapper to report the child's pid
pub const PID_REPORT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long Kill waits for terminated trees before escalating to SIGKILL
pub const KILL_GRACE: Duration = Duration::from_secs(3);

/// KillAll pause between SIGTERM and the liveness re-check
pub const KILL_ALL_GRACE: Duration = Duration::from_millis(100);

/// Exit code recorded for a process found dead by the sweep
pub const EXIT_FOUND_DEAD: i32 = -1;

/// Exit code recorded for a force-killed process
pub const EXIT_KILLED: i32 = -9;

/// Exit code of a wrapper whose child could not be spawned
pub const EXIT_SPAWN_FAILED: i32 = 127;

/// Get the Lantern state directory
pub fn lantern_home() -> PathBuf {
    if let Some(dir) = std::env::var_os(STATE_DIR_ENV).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .map(|h| h.join(LANTERN_DIR))
        .unwrap_or_else(|| PathBuf::from(LANTERN_DIR))
}

/// Get the database path
pub fn db_path() -> PathBuf {
    lantern_home().join(DB_FILE)
}

/// Database file plus its WAL and shared-memory sidecars
pub fn db_files() -> [PathBuf; 3] {
    let db = db_path();
    let wal = PathBuf::from(format!("{}-wal", db.display()));
    let shm = PathBuf::from(format!("{}-shm", db.display()));
    [db, wal, shm]
}

/// Get the wrapper diagnostic log path
pub fn wrapper_log_path() -> PathBuf {
    lantern_home().join(WRAPPER_LOG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_files_share_prefix() {
        let [db, wal, shm] = db_files();
        assert!(db.to_string_lossy().ends_with(DB_FILE));
        assert!(wal.to_string_lossy().ends_with("lantern.db-wal"));
        assert!(shm.to_string_lossy().ends_with("lantern.db-shm"));
    }

    #[test]
    fn test_port_range_bounds() {
        assert_eq!(*PORT_RANGE.start(), 3001);
        assert_eq!(*PORT_RANGE.end(), 4000);
    }
}
