// src/sys/traits.rs

use async_trait::async_trait;

use crate::error::WardenError;
use crate::sys::process::ManagedProcess;

// ==============================================================================
// 1. Primary daemon (TLS-terminating reverse proxy)
// ==============================================================================

#[async_trait]
pub trait ProxyRunner: Send + Sync {
    /// Runs the daemon's own config validator as a subprocess. A rejection
    /// here is fatal for the whole container: better to fail the start than
    /// to serve with a broken config.
    async fn validate(&self) -> Result<(), WardenError>;

    /// Launches the daemon in the background and returns its handle
    /// immediately. The daemon begins certificate acquisition on its own.
    async fn spawn(&self) -> Result<ManagedProcess, WardenError>;
}

// ==============================================================================
// 2. Secondary daemon (multi-protocol transport)
// ==============================================================================

#[async_trait]
pub trait TransportRunner: Send + Sync {
    /// Launches the daemon against whatever its config file currently says.
    /// Any certificate-path patching must already have happened.
    async fn spawn(&self) -> Result<ManagedProcess, WardenError>;
}
