//! TCP port allocation by bind probing

use lantern_core::{Error, Result, PORT_RANGE};
use lantern_db::Database;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::net::TcpListener;
use std::ops::RangeInclusive;
use std::time::Duration;
use tracing::debug;

/// Whether nothing is listening on `port`
pub fn port_is_free(port: u16) -> bool {
    if TcpListener::bind(("0.0.0.0", port)).is_err() {
        return false;
    }
    // Hosts without IPv6 fail this bind for reasons other than the port
    match TcpListener::bind(("::", port)) {
        Ok(_) => true,
        Err(e) => e.kind() != ErrorKind::AddrInUse,
    }
}

/// First port in `range` that is not in `used` and passes `probe`
pub fn allocate_from<F>(range: RangeInclusive<u16>, used: &HashSet<u16>, probe: F) -> Result<u16>
where
    F: Fn(u16) -> bool,
{
    let (start, end) = (*range.start(), *range.end());
    range
        .filter(|port| !used.contains(port))
        .find(|&port| probe(port))
        .ok_or(Error::PortsExhausted { start, end })
}

/// Allocate a free port, skipping ports recorded for running processes and projects
pub async fn allocate_port(db: &Database) -> Result<u16> {
    let mut used: HashSet<u16> = db.processes().used_ports().await?.into_iter().collect();
    used.extend(db.ports().all().await?.into_iter().map(|(_, port)| port));

    let port = allocate_from(PORT_RANGE, &used, port_is_free)?;
    debug!("Allocated port {} ({} recorded in use)", port, used.len());
    Ok(port)
}

/// Poll until `port` is free or `timeout` elapses
pub async fn wait_port_free(port: u16, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if port_is_free(port) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_allocate_skips_used_and_busy() {
        let used = HashSet::from([3001, 3002]);
        let port = allocate_from(3001..=3010, &used, |p| p != 3003).unwrap();
        assert_eq!(port, 3004);
    }

    #[test]
    fn test_allocate_exhausted() {
        let err = allocate_from(3001..=3003, &HashSet::new(), |_| false).unwrap_err();
        assert!(matches!(
            err,
            Error::PortsExhausted {
                start: 3001,
                end: 3003
            }
        ));
    }

    #[test]
    fn test_bound_port_is_not_free() {
        let listener = TcpListener::bind(("0.0.0.0", 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(!port_is_free(port));
        drop(listener);
        assert!(port_is_free(port));
    }

    #[tokio::test]
    async fn test_wait_port_free_times_out() {
        let listener = TcpListener::bind(("0.0.0.0", 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(!wait_port_free(port, Duration::from_millis(250)).await);
    }

    #[tokio::test]
    async fn test_allocate_port_excludes_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.db")).await.unwrap();

        let first = allocate_port(&db).await.unwrap();
        db.ports().set(Path::new("/proj"), first).await.unwrap();
        let second = allocate_port(&db).await.unwrap();
        assert_ne!(first, second);
        assert!(PORT_RANGE.contains(&second));
    }
}
