// src/error.rs

use thiserror::Error;

/// Fatal failure modes. Anything on the secondary daemon's path degrades to
/// a warning instead of surfacing here; only the primary proxy capability is
/// allowed to take the container down.
#[derive(Debug, Error)]
pub enum WardenError {
    #[error("required configuration file missing: {path}")]
    ConfigMissing { path: String },

    #[error("primary configuration rejected by validator: {detail}")]
    ConfigInvalid { detail: String },

    #[error("failed to spawn {daemon}: {source}")]
    Spawn {
        daemon: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("transport config {path} is not valid JSON: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl WardenError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
