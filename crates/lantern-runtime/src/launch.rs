//! Command splitting and detached wrapper launch

use lantern_core::{Error, LaunchPayload, Result, WRAPPER_BIN, WRAPPER_BIN_ENV};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::{debug, info};

const SHELL_METACHARACTERS: &[char] = &[
    '|', '&', ';', '<', '>', '(', ')', '$', '`', '\\', '"', '\'', '*', '?', '[', ']', '#', '~',
    '=', '%', '{', '}', '\n',
];

/// Split a configured command line into program and arguments.
///
/// Plain commands run directly so a missing binary fails to spawn. Anything
/// using shell syntax runs under `sh -c`.
pub fn split_command_line(line: &str) -> (String, Vec<String>) {
    let line = line.trim();
    if line.contains(SHELL_METACHARACTERS) {
        return ("sh".to_string(), vec!["-c".to_string(), line.to_string()]);
    }
    let mut parts = line.split_whitespace().map(str::to_string);
    let program = parts.next().unwrap_or_default();
    (program, parts.collect())
}

/// Locate the wrapper executable
pub fn wrapper_executable() -> PathBuf {
    if let Some(path) = std::env::var_os(WRAPPER_BIN_ENV).filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(WRAPPER_BIN)))
        .filter(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from(WRAPPER_BIN))
}

/// Spawn the wrapper in its own process group and hand it the payload on stdin.
///
/// The returned child is not killed on drop; the wrapper outlives the caller.
pub async fn spawn_wrapper(exe: &Path, payload: &LaunchPayload) -> Result<Child> {
    let input = serde_json::to_vec(payload)?;

    let mut cmd = Command::new(exe);
    cmd.current_dir(&payload.cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .kill_on_drop(false);

    let mut child = cmd.spawn().map_err(|e| {
        Error::spawn(format!(
            "Failed to start wrapper '{}': {}",
            exe.display(),
            e
        ))
    })?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| Error::spawn("Wrapper started without a stdin pipe"))?;
    stdin.write_all(&input).await?;
    stdin.shutdown().await?;
    drop(stdin);

    let pid = child
        .id()
        .ok_or_else(|| Error::spawn("Wrapper started but no PID available"))?;
    info!(
        "Spawned wrapper {} for launch {} ({})",
        pid,
        payload.launch_id,
        payload.display_command()
    );
    debug!("Wrapper executable: {}", exe.display());
    Ok(child)
}
