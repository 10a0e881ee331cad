// src/sys/certs.rs

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tokio::fs;

/// A certificate/key pair discovered in the primary daemon's storage area.
/// The supervisor only ever observes these files; it never writes or deletes
/// them.
#[derive(Debug, Clone)]
pub struct CertificateArtifact {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub discovered_at: DateTime<Utc>,
}

/// Read-only view over Caddy's on-disk certificate storage:
/// `<root>/<issuer-id>/<subject>/<subject>.crt` plus the sibling `.key`.
/// Wildcard subjects are stored with the `*` label rewritten to `wildcard_`.
pub struct CertificateStore {
    root: PathBuf,
}

/// Used when the transport config yields no usable server name at all.
pub const DEFAULT_DOMAIN: &str = "localhost";

/// Last two dot-separated labels of a fully qualified name; names with fewer
/// than two labels come back unchanged.
pub fn root_domain(server_name: &str) -> String {
    let labels: Vec<&str> = server_name.split('.').collect();
    if labels.len() >= 2 {
        labels[labels.len() - 2..].join(".")
    } else {
        server_name.to_string()
    }
}

/// Ordered selection over the scanned `(subject, cert path)` candidates,
/// most specific strategy first:
///   1. wildcard certificate scoped to the root domain
///   2. exact match on the full server name
///   3. exact match on the root domain
///   4. any certificate whose path contains the root domain
///   5. any certificate at all
///
/// The wildcard strategy intentionally runs before the exact full-name
/// match; swapping the two changes which certificate is selected whenever
/// both exist, which is observable behavior downstream.
fn select<'a>(
    candidates: &'a [(String, PathBuf)],
    server_name: &str,
    root: &str,
) -> Option<&'a (String, PathBuf)> {
    let wildcard_subject = format!("wildcard_.{root}");
    candidates
        .iter()
        .find(|(subject, _)| *subject == wildcard_subject)
        .or_else(|| candidates.iter().find(|(subject, _)| subject == server_name))
        .or_else(|| candidates.iter().find(|(subject, _)| subject == root))
        .or_else(|| {
            candidates
                .iter()
                .find(|(_, path)| path.to_string_lossy().contains(root))
        })
        .or_else(|| candidates.first())
}

impl CertificateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// One scan cycle. Returns the best candidate per the strategy order,
    /// but only when its sibling `.key` exists too; a certificate without
    /// its key is not yet usable and reads as "not found" so the caller
    /// keeps polling.
    pub async fn scan(&self, server_name: &str) -> Option<CertificateArtifact> {
        let root = root_domain(server_name);
        let candidates = self.collect_candidates().await;
        let (subject, cert_path) = select(&candidates, server_name, &root)?;

        let key_path = cert_path.with_extension("key");
        if !key_path.exists() {
            tracing::debug!(
                subject = %subject,
                cert = %cert_path.display(),
                "certificate present but key not yet written, still waiting"
            );
            return None;
        }

        Some(CertificateArtifact {
            cert_path: cert_path.clone(),
            key_path,
            discovered_at: Utc::now(),
        })
    }

    /// Walks `<root>/<issuer>/<subject>` and yields every subject directory
    /// that contains its `<subject>.crt`, sorted by path so that selection
    /// inside a single strategy is deterministic.
    async fn collect_candidates(&self) -> Vec<(String, PathBuf)> {
        let mut out = Vec::new();
        let Ok(mut issuers) = fs::read_dir(&self.root).await else {
            return out;
        };
        while let Ok(Some(issuer)) = issuers.next_entry().await {
            if !issuer.path().is_dir() {
                continue;
            }
            let Ok(mut subjects) = fs::read_dir(issuer.path()).await else {
                continue;
            };
            while let Ok(Some(subject)) = subjects.next_entry().await {
                let subject_path = subject.path();
                if !subject_path.is_dir() {
                    continue;
                }
                let Some(name) = subject_path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                let cert = subject_path.join(format!("{name}.crt"));
                if cert.is_file() {
                    out.push((name.to_string(), cert));
                }
            }
        }
        out.sort_by(|a, b| a.1.cmp(&b.1));
        out
    }
}

/// Test helper shared with the supervisor's scenario tests.
#[cfg(test)]
pub(crate) fn plant_pair(
    store_root: &std::path::Path,
    issuer: &str,
    subject: &str,
    with_key: bool,
) -> PathBuf {
    let dir = store_root.join(issuer).join(subject);
    std::fs::create_dir_all(&dir).unwrap();
    let cert = dir.join(format!("{subject}.crt"));
    std::fs::write(&cert, "-----BEGIN CERTIFICATE-----\n").unwrap();
    if with_key {
        std::fs::write(dir.join(format!("{subject}.key")), "-----BEGIN KEY-----\n").unwrap();
    }
    cert
}
