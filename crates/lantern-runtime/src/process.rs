//! Process liveness and tree termination

use lantern_core::{Error, Result};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid as NixPid;
use std::collections::{HashMap, HashSet, VecDeque};
use sysinfo::{Pid, System};
use tracing::{debug, trace};

/// OS process operations used by the supervisor and the wrapper
pub trait ProcessControl: Send + Sync {
    /// Whether `pid` exists and is not a zombie
    fn is_alive(&self, pid: u32) -> bool;

    /// Signal one process. `Ok(false)` if it is already gone.
    fn signal(&self, pid: u32, signal: Signal) -> Result<bool>;

    /// Signal `pid` and all of its descendants. `Ok(false)` if `pid` is already gone.
    fn kill_tree(&self, pid: u32, signal: Signal) -> Result<bool>;
}

/// [`ProcessControl`] backed by `kill(2)` and the system process table
#[derive(Debug, Default, Clone, Copy)]
pub struct OsProcessControl;

impl OsProcessControl {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessControl for OsProcessControl {
    fn is_alive(&self, pid: u32) -> bool {
        // pid 0 would address our own process group
        if pid == 0 {
            return false;
        }
        match kill(NixPid::from_raw(pid as i32), None) {
            Ok(()) | Err(Errno::EPERM) => !is_zombie(pid),
            Err(_) => false,
        }
    }

    fn signal(&self, pid: u32, signal: Signal) -> Result<bool> {
        if pid == 0 {
            return Ok(false);
        }
        match kill(NixPid::from_raw(pid as i32), signal) {
            Ok(()) => {
                trace!("Sent {} to {}", signal, pid);
                Ok(true)
            }
            Err(Errno::ESRCH) => Ok(false),
            Err(Errno::EPERM) => Err(Error::PermissionDenied(format!(
                "cannot signal process {}",
                pid
            ))),
            Err(e) => Err(Error::IoError(std::io::Error::from(e))),
        }
    }

    fn kill_tree(&self, pid: u32, signal: Signal) -> Result<bool> {
        if pid == 0 {
            return Ok(false);
        }
        let descendants = descendants_of(pid);
        debug!(
            "Sending {} to {} and {} descendants",
            signal,
            pid,
            descendants.len()
        );

        // Deepest first so parents cannot respawn what was just killed
        for child in descendants.iter().rev() {
            if let Err(e) = self.signal(*child, signal) {
                debug!("Failed to signal descendant {}: {}", child, e);
            }
        }
        self.signal(pid, signal)
    }
}

fn is_zombie(pid: u32) -> bool {
    let mut sys = System::new();
    let sys_pid = Pid::from_u32(pid);
    if !sys.refresh_process(sys_pid) {
        return false;
    }
    sys.process(sys_pid)
        .map(|p| p.status() == sysinfo::ProcessStatus::Zombie)
        .unwrap_or(false)
}

/// Descendants of `root` in breadth-first order
fn descendants_of(root: u32) -> Vec<u32> {
    let mut sys = System::new();
    sys.refresh_processes();

    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for (pid, process) in sys.processes() {
        if let Some(parent) = process.parent() {
            children.entry(parent.as_u32()).or_default().push(pid.as_u32());
        }
    }
    collect_descendants(root, &children)
}

fn collect_descendants(root: u32, children: &HashMap<u32, Vec<u32>>) -> Vec<u32> {
    let mut out = Vec::new();
    let mut seen = HashSet::from([root]);
    let mut queue = VecDeque::from([root]);
    while let Some(pid) = queue.pop_front() {
        for &child in children.get(&pid).map(Vec::as_slice).unwrap_or_default() {
            if seen.insert(child) {
                out.push(child);
                queue.push_back(child);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_collect_descendants_breadth_first() {
        let children = HashMap::from([
            (1, vec![2, 3]),
            (2, vec![4]),
            (4, vec![5]),
            (9, vec![10]),
        ]);
        assert_eq!(collect_descendants(1, &children), vec![2, 3, 4, 5]);
        assert!(collect_descendants(10, &children).is_empty());
    }

    #[test]
    fn test_pid_zero_is_never_signalled() {
        let control = OsProcessControl::new();
        assert!(!control.is_alive(0));
        assert!(!control.signal(0, Signal::SIGTERM).unwrap());
        assert!(!control.kill_tree(0, Signal::SIGTERM).unwrap());
    }

    #[test]
    fn test_self_is_alive() {
        assert!(OsProcessControl.is_alive(std::process::id()));
    }

    #[tokio::test]
    async fn test_kill_tree_reaches_grandchildren() {
        let mut child = tokio::process::Command::new("sh")
            .args(["-c", "sleep 30 & sleep 30 & wait"])
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let grandchildren = descendants_of(pid);
        assert_eq!(grandchildren.len(), 2);

        let control = OsProcessControl::new();
        assert!(control.kill_tree(pid, Signal::SIGKILL).unwrap());
        child.wait().await.unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        for gc in grandchildren {
            assert!(!control.is_alive(gc), "grandchild {} survived", gc);
        }
        assert!(!control.signal(pid, Signal::SIGTERM).unwrap());
    }
}
