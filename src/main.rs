// src/main.rs

use std::process::ExitCode;

mod config;
mod error;
mod supervisor;
mod sys;

use crate::config::WardenConfig;
use crate::supervisor::Supervisor;

#[tokio::main]
async fn main() -> ExitCode {
    // ==============================================================================
    // 1. Configuration & Telemetry
    // ==============================================================================

    // Initialize structured logging; RUST_LOG filters apply.
    tracing_subscriber::fmt::init();
    let config = WardenConfig::load();

    // ==============================================================================
    // 2. Mode Dispatch
    // ==============================================================================

    // `warden health` is the container HEALTHCHECK entrypoint; anything else
    // runs the supervisor proper.
    if std::env::args().nth(1).as_deref() == Some("health") {
        return ExitCode::from(sys::health::probe(&config).await as u8);
    }

    // ==============================================================================
    // 3. Supervision
    // ==============================================================================

    tracing::info!(
        caddy_config = %config.caddy_config,
        xray_config = %config.xray_config,
        "warden starting"
    );

    match Supervisor::new(config).run().await {
        // The primary daemon's exit status is the container's exit status.
        // Signal deaths and out-of-range codes collapse to a plain failure.
        Ok(code) if (0..=255).contains(&code) => ExitCode::from(code as u8),
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e, "supervisor aborted");
            ExitCode::FAILURE
        }
    }
}
