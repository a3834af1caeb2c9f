//! Core types for Lantern

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;

/// Regex pattern for valid service names: only alphanumeric, underscore, dot and hyphen
static SERVICE_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_.-]+$").expect("Invalid service name regex"));

/// Validate a service name
pub fn validate_service_name(name: &str) -> bool {
    !name.is_empty() && SERVICE_NAME_REGEX.is_match(name)
}

/// Current Unix time in seconds
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// Render a Unix timestamp as local wall-clock time
pub fn format_timestamp(ts: i64) -> String {
    match Utc.timestamp_opt(ts, 0).single() {
        Some(dt) => dt
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => ts.to_string(),
    }
}

/// Scoping key for processes and logs: a service inside one project
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceKey {
    pub service_name: String,
    pub project_dir: PathBuf,
}

impl ServiceKey {
    pub fn new(service_name: impl Into<String>, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            service_name: service_name.into(),
            project_dir: project_dir.into(),
        }
    }

    /// Project directory as stored in the database
    pub fn project_str(&self) -> String {
        self.project_dir.to_string_lossy().into_owned()
    }
}

impl std::fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.service_name, self.project_dir.display())
    }
}

/// One launched process instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub launch_id: i64,
    pub service_name: String,
    pub command_line: String,
    pub working_directory: PathBuf,
    pub project_dir: PathBuf,
    /// Child pid, 0 until the wrapper reports it
    pub pid: u32,
    pub wrapper_pid: Option<u32>,
    pub assigned_port: Option<u16>,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub is_running: bool,
    pub exit_code: Option<i32>,
}

impl ProcessRecord {
    pub fn key(&self) -> ServiceKey {
        ServiceKey::new(self.service_name.clone(), self.project_dir.clone())
    }

    /// Child pid if the wrapper has reported one
    pub fn child_pid(&self) -> Option<u32> {
        (self.pid != 0).then_some(self.pid)
    }

    pub fn status(&self) -> ProcessStatus {
        if self.is_running {
            ProcessStatus::Running
        } else if self.exit_code == Some(0) {
            ProcessStatus::Exited
        } else {
            ProcessStatus::Failed
        }
    }

    /// Time since start, or total runtime for a stopped process
    pub fn uptime(&self, now: i64) -> Duration {
        let end = self.end_time.unwrap_or(now);
        Duration::from_secs((end - self.start_time).max(0) as u64)
    }
}

/// Display status derived from a process record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Running,
    Exited,
    Failed,
}

impl ProcessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessStatus::Running => "running",
            ProcessStatus::Exited => "exited",
            ProcessStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of a persisted log row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogType {
    Stdout,
    Stderr,
    ProcessStarted,
    ProcessExited,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::Stdout => "stdout",
            LogType::Stderr => "stderr",
            LogType::ProcessStarted => "processStarted",
            LogType::ProcessExited => "processExited",
        }
    }

    /// Synthetic marker rows written by the wrapper itself
    pub fn is_marker(&self) -> bool {
        matches!(self, LogType::ProcessStarted | LogType::ProcessExited)
    }
}

impl FromStr for LogType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stdout" => Ok(LogType::Stdout),
            "stderr" => Ok(LogType::Stderr),
            "processStarted" => Ok(LogType::ProcessStarted),
            "processExited" => Ok(LogType::ProcessExited),
            _ => Err(Error::db(format!("Invalid log type: {}", s))),
        }
    }
}

impl std::fmt::Display for LogType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One persisted output line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: i64,
    pub launch_id: i64,
    pub service_name: String,
    pub project_dir: PathBuf,
    pub line_number: i64,
    pub content: String,
    pub log_type: LogType,
    pub timestamp: i64,
}

/// Startup descriptor handed to the wrapper over stdin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchPayload {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub launch_id: i64,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_port: Option<u16>,
}

impl LaunchPayload {
    /// Decode the payload, rejecting anything missing a required field
    pub fn from_json(input: &str) -> Result<Self> {
        let payload: LaunchPayload =
            serde_json::from_str(input).map_err(|e| Error::InvalidPayload(e.to_string()))?;
        if payload.command.trim().is_empty() {
            return Err(Error::InvalidPayload("command is empty".to_string()));
        }
        Ok(payload)
    }

    /// Command line as shown to users
    pub fn display_command(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }
}

/// Age and size bounds applied by retention cleanup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Log rows older than this are deleted
    pub log_max_age: Duration,
    /// Stopped records with a non-zero exit code
    pub failed_max_age: Duration,
    /// Stopped records that exited cleanly
    pub success_max_age: Duration,
    /// Most recent rows kept per launch
    pub max_logs_per_launch: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            log_max_age: Duration::from_secs(24 * 3600),
            failed_max_age: Duration::from_secs(24 * 3600),
            success_max_age: Duration::from_secs(4 * 3600),
            max_logs_per_launch: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ProcessRecord {
        ProcessRecord {
            launch_id: 1,
            service_name: "web".to_string(),
            command_line: "sleep 100".to_string(),
            working_directory: PathBuf::from("/proj"),
            project_dir: PathBuf::from("/proj"),
            pid: 0,
            wrapper_pid: None,
            assigned_port: None,
            start_time: 1_000,
            end_time: None,
            is_running: true,
            exit_code: None,
        }
    }

    #[test]
    fn test_validate_service_name() {
        assert!(validate_service_name("web"));
        assert!(validate_service_name("api-v2.local"));
        assert!(!validate_service_name(""));
        assert!(!validate_service_name("../etc"));
        assert!(!validate_service_name("a b"));
    }

    #[test]
    fn test_log_type_str_roundtrip() {
        for t in [
            LogType::Stdout,
            LogType::Stderr,
            LogType::ProcessStarted,
            LogType::ProcessExited,
        ] {
            assert_eq!(t.as_str().parse::<LogType>().unwrap(), t);
        }
        assert!("bogus".parse::<LogType>().is_err());
    }

    #[test]
    fn test_record_status() {
        let mut r = record();
        assert_eq!(r.status(), ProcessStatus::Running);
        assert_eq!(r.child_pid(), None);

        r.is_running = false;
        r.exit_code = Some(0);
        assert_eq!(r.status(), ProcessStatus::Exited);

        r.exit_code = Some(-9);
        assert_eq!(r.status(), ProcessStatus::Failed);
    }

    #[test]
    fn test_uptime_uses_end_time() {
        let mut r = record();
        assert_eq!(r.uptime(1_030), Duration::from_secs(30));
        r.end_time = Some(1_010);
        assert_eq!(r.uptime(5_000), Duration::from_secs(10));
    }

    #[test]
    fn test_payload_camel_case() {
        let json = r#"{"command":"node","args":["server.js"],"cwd":"/proj","launchId":7,"env":{"A":"1"},"assignedPort":3001}"#;
        let payload = LaunchPayload::from_json(json).unwrap();
        assert_eq!(payload.launch_id, 7);
        assert_eq!(payload.assigned_port, Some(3001));
        assert_eq!(payload.env.get("A").map(String::as_str), Some("1"));
        assert_eq!(payload.display_command(), "node server.js");
    }

    #[test]
    fn test_payload_missing_field() {
        let err = LaunchPayload::from_json(r#"{"command":"node","cwd":"/proj","launchId":1}"#)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPayload(_)));
    }

    #[test]
    fn test_payload_empty_command() {
        let err = LaunchPayload::from_json(r#"{"command":" ","args":[],"cwd":"/","launchId":1}"#)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPayload(_)));
    }
}
