//! Database schema for Lantern

/// SQLite schema initialization
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS processes (
    launch_id INTEGER PRIMARY KEY AUTOINCREMENT,
    service_name TEXT NOT NULL,
    command_line TEXT NOT NULL,
    working_directory TEXT NOT NULL,
    project_dir TEXT NOT NULL,
    pid INTEGER NOT NULL DEFAULT 0,
    wrapper_pid INTEGER,
    assigned_port INTEGER,
    start_time INTEGER NOT NULL,
    end_time INTEGER,
    is_running INTEGER NOT NULL DEFAULT 1,
    exit_code INTEGER
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_processes_active_key
    ON processes(service_name, project_dir) WHERE is_running = 1;
CREATE INDEX IF NOT EXISTS idx_processes_key ON processes(service_name, project_dir, launch_id);
CREATE INDEX IF NOT EXISTS idx_processes_running ON processes(is_running);

CREATE TABLE IF NOT EXISTS process_output (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    launch_id INTEGER NOT NULL,
    service_name TEXT NOT NULL,
    project_dir TEXT NOT NULL,
    line_number INTEGER NOT NULL,
    content TEXT NOT NULL,
    log_type TEXT NOT NULL,
    timestamp INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_output_key ON process_output(service_name, project_dir, id);
CREATE INDEX IF NOT EXISTS idx_output_launch ON process_output(launch_id, id);
CREATE INDEX IF NOT EXISTS idx_output_timestamp ON process_output(timestamp);

CREATE TABLE IF NOT EXISTS project_ports (
    project_dir TEXT PRIMARY KEY,
    port INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
"#;
