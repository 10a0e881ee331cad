// src/config.rs

use std::env;
use std::time::Duration;

/// Everything the supervisor needs is resolved here, once, from the
/// environment. The daemons themselves read their own config files; this
/// struct only carries paths and launch parameters.
#[derive(Clone, Debug)]
pub struct WardenConfig {
    // Primary daemon (TLS-terminating reverse proxy)
    pub caddy_bin: String,
    pub caddy_config: String,
    pub caddy_adapter: String,

    // Secondary daemon (multi-protocol transport)
    pub xray_bin: String,
    pub xray_config: String,

    // Shared filesystem contract
    pub cert_root: String,
    pub run_dir: String,

    // Health surface
    pub admin_addr: String,

    // Timing
    pub cert_wait: Duration,
    pub poll_interval: Duration,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_secs_or(key: &str, default: u64) -> Duration {
    let secs = env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default);
    Duration::from_secs(secs)
}

impl WardenConfig {
    pub fn load() -> Self {
        Self {
            caddy_bin: env_or("WARDEN_CADDY_BIN", "caddy"),
            caddy_config: env_or("WARDEN_CADDY_CONFIG", "/etc/caddy/Caddyfile"),
            caddy_adapter: env_or("WARDEN_CADDY_ADAPTER", "caddyfile"),

            xray_bin: env_or("WARDEN_XRAY_BIN", "xray"),
            xray_config: env_or("WARDEN_XRAY_CONFIG", "/etc/xray/config.json"),

            // Caddy's on-disk certificate storage inside the data volume.
            cert_root: env_or("WARDEN_CERT_ROOT", "/data/caddy/certificates"),
            run_dir: env_or("WARDEN_RUN_DIR", "/run/warden"),

            admin_addr: env_or("WARDEN_ADMIN_ADDR", "127.0.0.1:2019"),

            cert_wait: env_secs_or("WARDEN_CERT_WAIT_SECS", 180),
            poll_interval: env_secs_or("WARDEN_POLL_INTERVAL_SECS", 3),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_environment() {
        assert_eq!(env_or("WARDEN_TEST_UNSET_KEY", "caddy"), "caddy");
        assert_eq!(
            env_secs_or("WARDEN_TEST_UNSET_SECS", 180),
            Duration::from_secs(180)
        );
    }

    #[test]
    fn malformed_duration_falls_back_to_default() {
        // Key is unique to this test so parallel tests never collide.
        unsafe { env::set_var("WARDEN_TEST_BAD_SECS", "not-a-number") };
        assert_eq!(
            env_secs_or("WARDEN_TEST_BAD_SECS", 180),
            Duration::from_secs(180)
        );
        unsafe { env::remove_var("WARDEN_TEST_BAD_SECS") };
    }
}
