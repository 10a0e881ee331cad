// src/sys/xray.rs

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tokio::process::Command;

use crate::error::WardenError;
use crate::sys::process::ManagedProcess;
use crate::sys::traits::TransportRunner;

/// How (and whether) the transport daemon gets started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationMode {
    /// No recognizable inbound security config; the daemon is not started.
    None,
    /// REALITY key-exchange: no externally issued material needed.
    Immediate,
    /// TLS with file-referenced certificates: wait for the primary daemon
    /// to produce a pair before starting.
    CertificateGated,
}

// Matched against raw config text, not the parsed document, so a config that
// does not parse as JSON can still be classified.
static REALITY_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""security"\s*:\s*"reality""#).unwrap());
static PRIVATE_KEY_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""privateKey"\s*:"#).unwrap());
static CERT_FILE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""certificateFile"\s*:"#).unwrap());

/// REALITY takes priority over certificate gating: an embedded-trust inbound
/// can serve the moment the process is up, regardless of what else the file
/// declares.
pub fn determine_activation_mode(raw: &str) -> ActivationMode {
    if REALITY_MARKER.is_match(raw) && PRIVATE_KEY_MARKER.is_match(raw) {
        ActivationMode::Immediate
    } else if CERT_FILE_MARKER.is_match(raw) {
        ActivationMode::CertificateGated
    } else {
        ActivationMode::None
    }
}

/// First `serverName` string (or first element of the first `serverNames`
/// array) found in document order.
pub fn extract_server_name(raw: &str) -> Option<String> {
    let doc: Value = serde_json::from_str(raw).ok()?;
    find_server_name(&doc)
}

fn find_server_name(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => {
            for (key, v) in map {
                match (key.as_str(), v) {
                    ("serverName", Value::String(s)) if !s.is_empty() => {
                        return Some(s.clone());
                    }
                    ("serverNames", Value::Array(items)) => {
                        if let Some(Value::String(s)) = items.first() {
                            if !s.is_empty() {
                                return Some(s.clone());
                            }
                        }
                    }
                    _ => {}
                }
                if let Some(found) = find_server_name(v) {
                    return Some(found);
                }
            }
            None
        }
        Value::Array(items) => items.iter().find_map(find_server_name),
        _ => None,
    }
}

/// Points every `certificateFile` / `keyFile` field in the document at the
/// discovered pair. Returns how many fields were rewritten. Operating on the
/// parsed tree keeps paths with JSON-significant characters intact, which a
/// textual substitution would corrupt.
pub fn patch_certificate_paths(doc: &mut Value, cert: &str, key: &str) -> usize {
    let mut patched = 0;
    patch_walk(doc, cert, key, &mut patched);
    patched
}

fn patch_walk(value: &mut Value, cert: &str, key: &str, patched: &mut usize) {
    match value {
        Value::Object(map) => {
            for (k, v) in map.iter_mut() {
                match k.as_str() {
                    "certificateFile" => {
                        *v = Value::String(cert.to_string());
                        *patched += 1;
                    }
                    "keyFile" => {
                        *v = Value::String(key.to_string());
                        *patched += 1;
                    }
                    _ => patch_walk(v, cert, key, patched),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                patch_walk(item, cert, key, patched);
            }
        }
        _ => {}
    }
}

/// In-place rewrite of the config file on disk. Happens exactly once, before
/// the transport daemon ever reads the file.
pub async fn rewrite_certificate_paths(
    config_path: &str,
    cert: &str,
    key: &str,
) -> Result<usize, WardenError> {
    let raw = tokio::fs::read_to_string(config_path)
        .await
        .map_err(|e| WardenError::io(format!("reading {config_path}"), e))?;
    let mut doc: Value = serde_json::from_str(&raw).map_err(|e| WardenError::Json {
        path: config_path.to_string(),
        source: e,
    })?;
    let patched = patch_certificate_paths(&mut doc, cert, key);
    let pretty = serde_json::to_string_pretty(&doc).map_err(|e| WardenError::Json {
        path: config_path.to_string(),
        source: e,
    })?;
    tokio::fs::write(config_path, pretty)
        .await
        .map_err(|e| WardenError::io(format!("writing {config_path}"), e))?;
    Ok(patched)
}

// ==============================================================================
// Concrete runner (Xray binary)
// ==============================================================================

pub struct XrayRunner {
    bin: String,
    config_path: String,
}

impl XrayRunner {
    pub fn new(bin: String, config_path: String) -> Self {
        Self { bin, config_path }
    }
}

#[async_trait]
impl TransportRunner for XrayRunner {
    async fn spawn(&self) -> Result<ManagedProcess, WardenError> {
        let mut cmd = Command::new(&self.bin);
        cmd.args(["run", "-c", &self.config_path]);
        ManagedProcess::spawn("xray", cmd)
    }
}
