// src/supervisor.rs

use std::path::Path;
use std::time::Instant;

use crate::config::WardenConfig;
use crate::error::WardenError;
use crate::sys::caddy::CaddyRunner;
use crate::sys::certs::{CertificateStore, DEFAULT_DOMAIN, root_domain};
use crate::sys::health;
use crate::sys::process::ManagedProcess;
use crate::sys::retry::poll_until;
use crate::sys::traits::{ProxyRunner, TransportRunner};
use crate::sys::xray::{
    ActivationMode, XrayRunner, determine_activation_mode, extract_server_name,
    rewrite_certificate_paths,
};

/// Startup orchestration for the two daemons sharing this container.
///
/// The primary daemon is authoritative for the container's lifetime: its
/// config problems abort the start, and its exit code becomes ours. The
/// secondary daemon is best-effort; every failure on its path degrades to a
/// warning so transport problems can never take the proxy down.
pub struct Supervisor {
    config: WardenConfig,
    proxy: Box<dyn ProxyRunner>,
    transport: Box<dyn TransportRunner>,
}

impl Supervisor {
    pub fn new(config: WardenConfig) -> Self {
        Self {
            proxy: Box::new(CaddyRunner::new(
                config.caddy_bin.clone(),
                config.caddy_config.clone(),
                config.caddy_adapter.clone(),
            )),
            transport: Box::new(XrayRunner::new(
                config.xray_bin.clone(),
                config.xray_config.clone(),
            )),
            config,
        }
    }

    /// Top-level driver. Returns the primary daemon's exit code.
    pub async fn run(&self) -> Result<i32, WardenError> {
        // 1. Primary daemon: presence check, validator, launch.
        if !Path::new(&self.config.caddy_config).exists() {
            return Err(WardenError::ConfigMissing {
                path: self.config.caddy_config.clone(),
            });
        }
        self.proxy.validate().await?;
        let primary = self.proxy.spawn().await?;
        self.record_pid(&primary).await;

        // 2. Secondary daemon: activation-mode dispatch. Launched at most
        //    once, and only ever after the primary is already running.
        let _secondary = self.maybe_launch_secondary().await;

        // 3. Container lifetime follows the primary; the secondary's exit,
        //    if any, changes nothing here.
        Ok(primary.wait().await)
    }

    async fn record_pid(&self, process: &ManagedProcess) {
        if let Some(pid) = process.pid() {
            if let Err(e) = health::write_pidfile(&self.config.run_dir, process.name(), pid).await {
                tracing::warn!(daemon = process.name(), error = %e, "could not record pidfile");
            }
        }
    }

    async fn maybe_launch_secondary(&self) -> Option<ManagedProcess> {
        let raw = match tokio::fs::read_to_string(&self.config.xray_config).await {
            Ok(raw) => raw,
            Err(_) => {
                tracing::info!(
                    path = %self.config.xray_config,
                    "no transport config supplied, secondary daemon disabled"
                );
                return None;
            }
        };

        match determine_activation_mode(&raw) {
            ActivationMode::None => {
                tracing::info!("transport config has no recognizable inbound security, secondary daemon skipped");
                None
            }
            ActivationMode::Immediate => {
                tracing::info!("REALITY inbound detected, launching transport daemon immediately");
                self.launch_secondary().await
            }
            ActivationMode::CertificateGated => self.wait_for_certificate_and_launch(&raw).await,
        }
    }

    /// Spawn plus one non-fatal liveness check after a short settle delay.
    async fn launch_secondary(&self) -> Option<ManagedProcess> {
        let mut process = match self.transport.spawn().await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "transport daemon failed to start, continuing without it");
                return None;
            }
        };
        self.record_pid(&process).await;

        if !process.liveness_check(self.config.poll_interval).await {
            return None;
        }
        tracing::info!(pid = process.pid(), "transport daemon is up");
        Some(process)
    }

    /// The one stateful loop in the system: poll the certificate store until
    /// the primary daemon has produced a usable pair, patch the transport
    /// config to point at it, then launch. Timeout degrades gracefully: the
    /// operator restarts the container once issuance has completed.
    async fn wait_for_certificate_and_launch(&self, raw: &str) -> Option<ManagedProcess> {
        let server_name = extract_server_name(raw).unwrap_or_else(|| {
            tracing::warn!(
                fallback = DEFAULT_DOMAIN,
                "transport config has no server name, using fallback domain"
            );
            DEFAULT_DOMAIN.to_string()
        });
        let store = CertificateStore::new(&self.config.cert_root);
        let started = Instant::now();
        tracing::info!(
            server_name = %server_name,
            root = %root_domain(&server_name),
            store = %self.config.cert_root,
            timeout = ?self.config.cert_wait,
            "waiting for certificate issuance"
        );

        let outcome = poll_until(self.config.cert_wait, self.config.poll_interval, || {
            store.scan(&server_name)
        })
        .await;

        let Some(artifact) = outcome.found() else {
            tracing::warn!(
                waited = ?started.elapsed(),
                "no certificate/key pair appeared in time; transport daemon not started. \
                 Restart the container once issuance completes."
            );
            return None;
        };

        tracing::info!(
            cert = %artifact.cert_path.display(),
            key = %artifact.key_path.display(),
            waited = ?started.elapsed(),
            "certificate pair discovered"
        );

        let cert = artifact.cert_path.to_string_lossy();
        let key = artifact.key_path.to_string_lossy();
        match rewrite_certificate_paths(&self.config.xray_config, &cert, &key).await {
            Ok(patched) => {
                tracing::info!(fields = patched, "transport config updated in place");
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to patch transport config, continuing without it");
                return None;
            }
        }

        self.launch_secondary().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::process::Command;

    use crate::sys::certs::plant_pair;

    const ISSUER: &str = "acme-v02.api.letsencrypt.org-directory";

    struct ShellProxy {
        valid: bool,
        script: &'static str,
    }

    #[async_trait]
    impl ProxyRunner for ShellProxy {
        async fn validate(&self) -> Result<(), WardenError> {
            if self.valid {
                Ok(())
            } else {
                Err(WardenError::ConfigInvalid {
                    detail: "stub validator rejection".into(),
                })
            }
        }

        async fn spawn(&self) -> Result<ManagedProcess, WardenError> {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", self.script]);
            ManagedProcess::spawn("caddy", cmd)
        }
    }

    struct ShellTransport {
        script: &'static str,
    }

    #[async_trait]
    impl TransportRunner for ShellTransport {
        async fn spawn(&self) -> Result<ManagedProcess, WardenError> {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", self.script]);
            ManagedProcess::spawn("xray", cmd)
        }
    }

    struct Fixture {
        _tmp: TempDir,
        config: WardenConfig,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let path = |p: &str| tmp.path().join(p).to_str().unwrap().to_string();
        std::fs::write(tmp.path().join("Caddyfile"), "example.com\n").unwrap();
        let config = WardenConfig {
            caddy_bin: "true".into(),
            caddy_config: path("Caddyfile"),
            caddy_adapter: "caddyfile".into(),
            xray_bin: "true".into(),
            xray_config: path("xray.json"),
            cert_root: path("certificates"),
            run_dir: path("run"),
            admin_addr: "127.0.0.1:1".into(),
            cert_wait: Duration::from_millis(300),
            poll_interval: Duration::from_millis(50),
        };
        Fixture { _tmp: tmp, config }
    }

    fn supervisor(config: WardenConfig, proxy: ShellProxy, transport: ShellTransport) -> Supervisor {
        Supervisor {
            config,
            proxy: Box::new(proxy),
            transport: Box::new(transport),
        }
    }

    fn gated_config(server_name: &str) -> String {
        format!(
            r#"{{
  "inbounds": [{{
    "streamSettings": {{
      "security": "tls",
      "tlsSettings": {{
        "serverName": "{server_name}",
        "certificates": [{{
          "certificateFile": "/nonexistent/cert.crt",
          "keyFile": "/nonexistent/cert.key"
        }}]
      }}
    }}
  }}]
}}"#
        )
    }

    const REALITY_CONFIG: &str = r#"{
  "inbounds": [{
    "streamSettings": {
      "security": "reality",
      "realitySettings": { "privateKey": "abc", "serverNames": ["api.example.com"] }
    }
  }]
}"#;

    #[tokio::test]
    async fn scenario_a_primary_only() {
        let fx = fixture();
        let sup = supervisor(
            fx.config.clone(),
            ShellProxy { valid: true, script: "exit 7" },
            ShellTransport { script: "exit 0" },
        );
        assert_eq!(sup.run().await.unwrap(), 7);
        // No transport config existed, so no secondary pidfile either.
        assert!(!Path::new(&fx.config.run_dir).join("xray.pid").exists());
    }

    #[tokio::test]
    async fn scenario_b_reality_launches_without_polling() {
        let fx = fixture();
        std::fs::write(&fx.config.xray_config, REALITY_CONFIG).unwrap();
        let sup = supervisor(
            fx.config.clone(),
            ShellProxy { valid: true, script: "sleep 0.3" },
            ShellTransport { script: "sleep 2" },
        );
        assert_eq!(sup.run().await.unwrap(), 0);
        assert!(Path::new(&fx.config.run_dir).join("xray.pid").exists());
        // Immediate mode never touches the config file.
        assert_eq!(
            std::fs::read_to_string(&fx.config.xray_config).unwrap(),
            REALITY_CONFIG
        );
    }

    #[tokio::test]
    async fn scenario_c_pre_issued_pair_is_found_and_patched() {
        let fx = fixture();
        std::fs::write(&fx.config.xray_config, gated_config("api.example.com")).unwrap();
        let cert = plant_pair(Path::new(&fx.config.cert_root), ISSUER, "api.example.com", true);

        let sup = supervisor(
            fx.config.clone(),
            ShellProxy { valid: true, script: "exit 3" },
            ShellTransport { script: "sleep 2" },
        );
        assert_eq!(sup.run().await.unwrap(), 3);

        let doc: Value =
            serde_json::from_str(&std::fs::read_to_string(&fx.config.xray_config).unwrap())
                .unwrap();
        let patched = &doc["inbounds"][0]["streamSettings"]["tlsSettings"]["certificates"][0];
        assert_eq!(patched["certificateFile"], cert.to_str().unwrap());
        assert_eq!(patched["keyFile"], cert.with_extension("key").to_str().unwrap());
    }

    #[tokio::test]
    async fn scenario_d_missing_primary_config_is_fatal() {
        let fx = fixture();
        std::fs::remove_file(&fx.config.caddy_config).unwrap();
        let sup = supervisor(
            fx.config.clone(),
            ShellProxy { valid: true, script: "exit 0" },
            ShellTransport { script: "exit 0" },
        );
        let err = sup.run().await.unwrap_err();
        assert!(matches!(err, WardenError::ConfigMissing { .. }));
        assert!(!Path::new(&fx.config.run_dir).join("caddy.pid").exists());
    }

    #[tokio::test]
    async fn invalid_primary_config_is_fatal() {
        let fx = fixture();
        let sup = supervisor(
            fx.config.clone(),
            ShellProxy { valid: false, script: "exit 0" },
            ShellTransport { script: "exit 0" },
        );
        assert!(matches!(
            sup.run().await.unwrap_err(),
            WardenError::ConfigInvalid { .. }
        ));
    }

    #[tokio::test]
    async fn certificate_timeout_degrades_to_primary_only() {
        let fx = fixture();
        let raw = gated_config("api.example.com");
        std::fs::write(&fx.config.xray_config, &raw).unwrap();

        let sup = supervisor(
            fx.config.clone(),
            ShellProxy { valid: true, script: "exit 0" },
            ShellTransport { script: "sleep 2" },
        );
        assert_eq!(sup.run().await.unwrap(), 0);
        // Nothing was patched and no secondary pidfile was recorded.
        assert_eq!(std::fs::read_to_string(&fx.config.xray_config).unwrap(), raw);
        assert!(!Path::new(&fx.config.run_dir).join("xray.pid").exists());
    }

    #[tokio::test]
    async fn secondary_early_death_is_non_fatal() {
        let fx = fixture();
        std::fs::write(&fx.config.xray_config, REALITY_CONFIG).unwrap();
        let sup = supervisor(
            fx.config.clone(),
            ShellProxy { valid: true, script: "exit 0" },
            ShellTransport { script: "echo refusing to start >&2; exit 1" },
        );
        assert_eq!(sup.run().await.unwrap(), 0);
    }
}
