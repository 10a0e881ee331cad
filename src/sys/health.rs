// src/sys/health.rs

use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::TcpStream;

use crate::config::WardenConfig;
use crate::error::WardenError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

fn pidfile_path(run_dir: &str, daemon: &str) -> PathBuf {
    Path::new(run_dir).join(format!("{daemon}.pid"))
}

/// Recorded at launch so the container health check can find the daemons
/// without guessing at process names.
pub async fn write_pidfile(run_dir: &str, daemon: &str, pid: u32) -> Result<(), WardenError> {
    tokio::fs::create_dir_all(run_dir)
        .await
        .map_err(|e| WardenError::io(format!("creating {run_dir}"), e))?;
    let path = pidfile_path(run_dir, daemon);
    tokio::fs::write(&path, format!("{pid}\n"))
        .await
        .map_err(|e| WardenError::io(format!("writing {}", path.display()), e))
}

async fn read_pid(run_dir: &str, daemon: &str) -> Option<i32> {
    let raw = tokio::fs::read_to_string(pidfile_path(run_dir, daemon))
        .await
        .ok()?;
    raw.trim().parse().ok()
}

/// Signal 0 existence probe; works on anything we have permission to signal.
pub fn pid_alive(pid: i32) -> bool {
    kill(Pid::from_raw(pid), None).is_ok()
}

async fn daemon_alive(run_dir: &str, daemon: &str) -> bool {
    match read_pid(run_dir, daemon).await {
        Some(pid) => pid_alive(pid),
        None => false,
    }
}

/// Container health probe, run as `warden health`. Healthy means: the
/// primary daemon's process exists and its admin endpoint accepts a TCP
/// connection, and the secondary daemon's process exists whenever a
/// transport config was supplied. Exit code doubles as the HEALTHCHECK
/// result.
pub async fn probe(config: &WardenConfig) -> i32 {
    if !daemon_alive(&config.run_dir, "caddy").await {
        tracing::error!("health: primary daemon process not found");
        return 1;
    }

    let admin_ok = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&config.admin_addr))
        .await
        .map(|r| r.is_ok())
        .unwrap_or(false);
    if !admin_ok {
        tracing::error!(addr = %config.admin_addr, "health: admin endpoint unreachable");
        return 1;
    }

    if Path::new(&config.xray_config).exists() && !daemon_alive(&config.run_dir, "xray").await {
        tracing::error!("health: transport config supplied but daemon process not found");
        return 1;
    }

    tracing::info!("health: ok");
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn pidfile_round_trip() {
        let tmp = TempDir::new().unwrap();
        let run_dir = tmp.path().join("run");
        let run_dir = run_dir.to_str().unwrap();

        write_pidfile(run_dir, "caddy", 12345).await.unwrap();
        assert_eq!(read_pid(run_dir, "caddy").await, Some(12345));
        assert_eq!(read_pid(run_dir, "xray").await, None);
    }

    #[test]
    fn own_pid_is_alive() {
        assert!(pid_alive(std::process::id() as i32));
        // Kernel pid space never reaches this in a test container.
        assert!(!pid_alive(i32::MAX - 1));
    }
}
