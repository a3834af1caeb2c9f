//! Output formatting: tables, log lines and JSON mode

use colored::Colorize;
use lantern_core::{format_timestamp, unix_now, LogRecord, LogType, ProcessRecord};
use lantern_supervisor::{KillAllReport, ServiceState, ServiceStatus};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tabled::{
    settings::{object::Columns, Alignment, Modify, Style},
    Table, Tabled,
};

/// Global flag for JSON output mode
static JSON_MODE: AtomicBool = AtomicBool::new(false);

/// Enable or disable JSON output mode
pub fn set_json_mode(enabled: bool) {
    JSON_MODE.store(enabled, Ordering::SeqCst);
}

/// Check if JSON output mode is enabled
pub fn is_json_mode() -> bool {
    JSON_MODE.load(Ordering::SeqCst)
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing to JSON: {}", e),
    }
}

#[derive(Tabled)]
pub struct ServiceRow {
    #[tabled(rename = "service")]
    pub name: String,
    #[tabled(rename = "status")]
    pub status: String,
    #[tabled(rename = "pid")]
    pub pid: String,
    #[tabled(rename = "port")]
    pub port: String,
    #[tabled(rename = "uptime")]
    pub uptime: String,
    #[tabled(rename = "cwd")]
    pub cwd: String,
}

impl From<&ServiceStatus> for ServiceRow {
    fn from(status: &ServiceStatus) -> Self {
        let running = status.state == ServiceState::Running;
        let record = status.record.as_ref().filter(|_| running);
        ServiceRow {
            name: status.name.clone(),
            status: match status.state {
                ServiceState::Running => status.state.as_str().green().to_string(),
                ServiceState::Stopped => status.state.as_str().red().to_string(),
            },
            pid: record.map(pid_cell).unwrap_or_else(dash),
            port: record.map(port_cell).unwrap_or_else(dash),
            uptime: record.map(uptime_cell).unwrap_or_else(dash),
            cwd: status.cwd.display().to_string(),
        }
    }
}

#[derive(Tabled)]
pub struct ProcessRow {
    #[tabled(rename = "id")]
    pub launch_id: i64,
    #[tabled(rename = "service")]
    pub service: String,
    #[tabled(rename = "directory")]
    pub directory: String,
    #[tabled(rename = "pid")]
    pub pid: String,
    #[tabled(rename = "port")]
    pub port: String,
    #[tabled(rename = "uptime")]
    pub uptime: String,
    #[tabled(rename = "status")]
    pub status: String,
}

impl From<&ProcessRecord> for ProcessRow {
    fn from(record: &ProcessRecord) -> Self {
        ProcessRow {
            launch_id: record.launch_id,
            service: record.service_name.clone(),
            directory: shorten(&record.working_directory.display().to_string(), 40),
            pid: pid_cell(record),
            port: port_cell(record),
            uptime: uptime_cell(record),
            status: "RUNNING".green().to_string(),
        }
    }
}

fn dash() -> String {
    "-".to_string()
}

fn pid_cell(record: &ProcessRecord) -> String {
    record
        .child_pid()
        .map(|p| p.to_string())
        .unwrap_or_else(dash)
}

fn port_cell(record: &ProcessRecord) -> String {
    record
        .assigned_port
        .map(|p| p.to_string())
        .unwrap_or_else(dash)
}

fn uptime_cell(record: &ProcessRecord) -> String {
    format_duration(record.uptime(unix_now()).as_secs())
}

/// Keep the tail of long paths
fn shorten(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    let tail: String = text.chars().skip(count - (max - 3)).collect();
    format!("...{}", tail)
}

fn render<T: Tabled>(rows: Vec<T>) -> String {
    Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(0)).with(Alignment::left()))
        .to_string()
}

pub fn print_services_table(statuses: &[ServiceStatus]) {
    if is_json_mode() {
        print_json(statuses);
        return;
    }
    let rows: Vec<ServiceRow> = statuses.iter().map(ServiceRow::from).collect();
    println!("{}", render(rows));
}

pub fn print_processes_table(records: &[ProcessRecord]) {
    if is_json_mode() {
        print_json(records);
        return;
    }
    if records.is_empty() {
        println!("No active processes found.");
        return;
    }
    let rows: Vec<ProcessRow> = records.iter().map(ProcessRow::from).collect();
    println!("{}", render(rows));
}

/// `12:00:01 [stdout] text`
pub fn format_log_line(log: &LogRecord) -> String {
    let time = format_timestamp(log.timestamp);
    let time = time.split(' ').nth(1).unwrap_or(&time).to_string();
    match log.log_type {
        LogType::Stdout => format!("{} {} {}", time.dimmed(), "[stdout]".dimmed(), log.content),
        LogType::Stderr => format!("{} {} {}", time.dimmed(), "[stderr]".red(), log.content),
        LogType::ProcessStarted => {
            format!("{} {} {}", time.dimmed(), "[process]".cyan(), log.content.green())
        }
        LogType::ProcessExited => {
            format!("{} {} {}", time.dimmed(), "[process]".cyan(), log.content.red())
        }
    }
}

/// Log rows as text, or one JSON object per row in JSON mode
pub fn print_log_lines(logs: &[LogRecord]) {
    for log in logs {
        if is_json_mode() {
            match serde_json::to_string(log) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("Error serializing to JSON: {}", e),
            }
        } else {
            println!("{}", format_log_line(log));
        }
    }
}

pub fn print_kill_all_report(report: &KillAllReport) {
    if is_json_mode() {
        print_json(report);
        return;
    }
    if let Some(message) = &report.message {
        print_info(message);
        return;
    }
    for record in &report.killed {
        print_success(&format!(
            "Killed {} (pid {}) in {}",
            record.service_name,
            record.pid,
            record.project_dir.display()
        ));
    }
    for record in &report.already_dead {
        print_info(&format!(
            "{} (pid {}) was already stopped",
            record.service_name, record.pid
        ));
    }
    for failure in &report.failed {
        print_error(&format!(
            "Failed to kill {} (pid {}): {}",
            failure.record.service_name, failure.record.pid, failure.error
        ));
    }
    let summary = report.summary;
    println!(
        "Found {}, killed {}, already stopped {}, failed {}",
        summary.total_found, summary.killed, summary.already_dead, summary.failed
    );
}

/// `1d 2h 3m 4s`, omitting zero units
pub fn format_duration(secs: u64) -> String {
    let units = [
        (secs / 86400, "d"),
        ((secs % 86400) / 3600, "h"),
        ((secs % 3600) / 60, "m"),
    ];
    let mut parts: Vec<String> = units
        .iter()
        .filter(|(value, _)| *value > 0)
        .map(|(value, unit)| format!("{}{}", value, unit))
        .collect();
    if secs % 60 > 0 || parts.is_empty() {
        parts.push(format!("{}s", secs % 60));
    }
    parts.join(" ")
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue(), message);
}

/// JSON wrapper for generic responses
#[derive(Serialize)]
pub struct ResponseJson<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// Print a success message, or a JSON response carrying `data`
pub fn print_success_json<T: Serialize>(message: &str, data: Option<T>) {
    if is_json_mode() {
        print_json(&ResponseJson {
            success: true,
            message: Some(message.to_string()),
            data,
        });
    } else {
        print_success(message);
    }
}

/// Print an error message, or a JSON error response on stdout
pub fn print_error_json(message: &str) {
    if is_json_mode() {
        print_json(&ResponseJson::<()> {
            success: false,
            message: Some(message.to_string()),
            data: None,
        });
    } else {
        eprintln!("{} {}", "Error:".red().bold(), message);
    }
}
