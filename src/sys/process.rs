// src/sys/process.rs

use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::time::sleep;

use crate::error::WardenError;

/// A daemon spawned and observed by the supervisor. Output is pumped
/// line-by-line into the structured log so both daemons interleave cleanly
/// in the container log stream, and whatever a crashing child managed to
/// print is already on record by the time the liveness check notices.
#[derive(Debug)]
pub struct ManagedProcess {
    name: &'static str,
    child: Child,
}

fn pump<R: AsyncRead + Unpin + Send + 'static>(name: &'static str, stream: &'static str, reader: R) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::info!(daemon = name, stream, "{line}");
        }
    });
}

impl ManagedProcess {
    pub fn spawn(name: &'static str, mut cmd: Command) -> Result<Self, WardenError> {
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        // The supervisor's lifetime is the container's lifetime; anything
        // still holding a handle when we unwind should not outlive us.
        cmd.kill_on_drop(true);
        let mut child = cmd
            .spawn()
            .map_err(|e| WardenError::Spawn { daemon: name, source: e })?;

        if let Some(stdout) = child.stdout.take() {
            pump(name, "stdout", stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            pump(name, "stderr", stderr);
        }

        tracing::info!(daemon = name, pid = child.id(), "daemon started");
        Ok(Self { name, child })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Non-blocking liveness probe.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// One post-launch check after a fixed settle delay. A daemon that died
    /// this early almost always printed its reason, and the log pumps have
    /// already forwarded it.
    pub async fn liveness_check(&mut self, settle: Duration) -> bool {
        sleep(settle).await;
        let alive = self.is_alive();
        if !alive {
            tracing::warn!(
                daemon = self.name,
                "daemon exited during settle window, see its captured output above"
            );
        }
        alive
    }

    /// Blocks until the child exits and yields its exit code (-1 when the
    /// process was killed by a signal).
    pub async fn wait(mut self) -> i32 {
        match self.child.wait().await {
            Ok(status) => {
                let code = status.code().unwrap_or(-1);
                tracing::info!(daemon = self.name, code, "daemon exited");
                code
            }
            Err(e) => {
                tracing::error!(daemon = self.name, error = %e, "wait on daemon failed");
                -1
            }
        }
    }
}
