//! Content fingerprinting: one hashed snapshot per source per scan.
//!
//! The hash is computed over *normalized* content so that re-fetching an
//! unchanged page never produces a spurious difference. Normalization strips
//! only volatile noise (line endings, encoding artifacts, surrounding
//! whitespace); the stored content is kept verbatim for diffing and audit.

use chrono::{DateTime, Utc};

use crate::error::MonitorError;
use crate::models::{FetchStatus, NewSnapshot, Snapshot, Source, compute_hash};
use crate::traits::SnapshotStore;

/// Normalize content for hashing: unify line endings, drop BOM and
/// zero-width characters, trim each line, and skip blank lines.
///
/// Must be stable: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(content: &str) -> String {
    content
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .lines()
        .map(|line| {
            line.chars()
                .filter(|c| !matches!(c, '\u{feff}' | '\u{200b}' | '\u{200c}' | '\u{200d}'))
                .collect::<String>()
        })
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fingerprint the given content: SHA-256 hex over its normalized form.
pub fn fingerprint(content: &str) -> String {
    compute_hash(&normalize(content))
}

/// Persists one content snapshot per source per scan over any
/// [`SnapshotStore`] backend.
#[derive(Clone)]
pub struct FingerprintStore<S: SnapshotStore> {
    store: S,
}

impl<S: SnapshotStore> FingerprintStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Record a successful capture. The content hash is derived here —
    /// callers never set it.
    pub async fn record(
        &self,
        source: &Source,
        content: &str,
        captured_at: DateTime<Utc>,
    ) -> Result<Snapshot, MonitorError> {
        let content_hash = fingerprint(content);
        tracing::debug!(
            source = %source.name,
            hash = %&content_hash[..8],
            bytes = content.len(),
            "Recording snapshot"
        );
        self.store
            .insert(&NewSnapshot {
                source_id: source.id,
                content: content.to_string(),
                content_hash,
                captured_at,
                status: FetchStatus::Success,
                error_detail: None,
            })
            .await
    }

    /// Record a failed fetch. Error snapshots carry no content and an empty
    /// hash; they keep their place in the per-source ordering but are never
    /// compared against.
    pub async fn record_error(
        &self,
        source: &Source,
        detail: &str,
        captured_at: DateTime<Utc>,
    ) -> Result<Snapshot, MonitorError> {
        tracing::warn!(source = %source.name, error = %detail, "Recording error snapshot");
        self.store
            .insert(&NewSnapshot {
                source_id: source.id,
                content: String::new(),
                content_hash: String::new(),
                captured_at,
                status: FetchStatus::Error,
                error_detail: Some(detail.to_string()),
            })
            .await
    }

    /// Most recent successful snapshot.
    pub async fn latest(&self, source: &Source) -> Result<Option<Snapshot>, MonitorError> {
        self.store.latest(source.id).await
    }

    /// Successful snapshot immediately before the latest.
    pub async fn previous(&self, source: &Source) -> Result<Option<Snapshot>, MonitorError> {
        self.store.previous(source.id).await
    }
}
