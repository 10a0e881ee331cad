// src/sys/caddy.rs

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::WardenError;
use crate::sys::process::ManagedProcess;
use crate::sys::traits::ProxyRunner;

/// Launch contract for the primary daemon: `<bin> validate|run
/// --config <path> --adapter <adapter>`.
pub struct CaddyRunner {
    bin: String,
    config_path: String,
    adapter: String,
}

impl CaddyRunner {
    pub fn new(bin: String, config_path: String, adapter: String) -> Self {
        Self {
            bin,
            config_path,
            adapter,
        }
    }

    fn args(&self, verb: &'static str) -> [&str; 5] {
        [verb, "--config", &self.config_path, "--adapter", &self.adapter]
    }
}

#[async_trait]
impl ProxyRunner for CaddyRunner {
    async fn validate(&self) -> Result<(), WardenError> {
        let output = Command::new(&self.bin)
            .args(self.args("validate"))
            .output()
            .await
            .map_err(|e| WardenError::Spawn {
                daemon: "caddy validate",
                source: e,
            })?;

        if !output.status.success() {
            return Err(WardenError::ConfigInvalid {
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        tracing::info!(config = %self.config_path, "primary configuration validated");
        Ok(())
    }

    async fn spawn(&self) -> Result<ManagedProcess, WardenError> {
        let mut cmd = Command::new(&self.bin);
        cmd.args(self.args("run"));
        ManagedProcess::spawn("caddy", cmd)
    }
}
