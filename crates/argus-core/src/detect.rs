//! Change detection between consecutive snapshots of a source.
//!
//! The detector compares the newest successful snapshot against the one
//! before it. Equal hashes are a no-op. Differing hashes produce a
//! line-based unified diff whose hunks are then run through the noise
//! filter; a diff that is empty after filtering produces no change at all.
//! This is the precision mechanism that keeps cosmetic page edits from
//! triggering extraction work.

use chrono::{DateTime, Utc};
use similar::{ChangeTag, TextDiff};

use crate::error::MonitorError;
use crate::fingerprint::FingerprintStore;
use crate::models::{Change, NewChange, Source};
use crate::noise::NoiseFilter;
use crate::traits::{ChangeStore, SnapshotStore};

const DIFF_CONTEXT_LINES: usize = 3;

/// Detects and persists changes for monitored sources.
pub struct ChangeDetector<S, C, N>
where
    S: SnapshotStore,
    C: ChangeStore,
    N: NoiseFilter,
{
    snapshots: FingerprintStore<S>,
    changes: C,
    filter: N,
}

impl<S, C, N> ChangeDetector<S, C, N>
where
    S: SnapshotStore,
    C: ChangeStore,
    N: NoiseFilter,
{
    pub fn new(snapshots: FingerprintStore<S>, changes: C, filter: N) -> Self {
        Self {
            snapshots,
            changes,
            filter,
        }
    }

    /// Run detection for one source.
    ///
    /// Returns `None` when there is nothing new: no snapshot yet, the
    /// current capture was already processed, the hashes match, or the diff
    /// is pure noise. Idempotent: calling twice without a new fetch yields
    /// nothing the second time.
    pub async fn detect(
        &self,
        source: &Source,
        detected_at: DateTime<Utc>,
    ) -> Result<Option<Change>, MonitorError> {
        let Some(latest) = self.snapshots.latest(source).await? else {
            return Ok(None);
        };

        // Already detected against this capture on a previous run.
        if let Some(last_change) = self.changes.latest_for_source(source.id).await?
            && last_change.new_snapshot_id == latest.id
        {
            tracing::debug!(source = %source.name, "Capture already processed");
            return Ok(None);
        }

        let Some(previous) = self.snapshots.previous(source).await? else {
            // First capture: record a structural baseline. There is nothing
            // to diff against, so it is born analyzed and never enters the
            // extraction backlog.
            tracing::info!(source = %source.name, "Baseline capture");
            let change = self
                .changes
                .insert(&NewChange {
                    source_id: source.id,
                    prior_snapshot_id: None,
                    new_snapshot_id: latest.id,
                    diff: String::new(),
                    detected_at,
                    analyzed: true,
                })
                .await?;
            return Ok(Some(change));
        };

        if previous.content_hash == latest.content_hash {
            tracing::debug!(source = %source.name, "No change (hash match)");
            return Ok(None);
        }

        let diff = filtered_diff(&previous.content, &latest.content, &self.filter);
        if diff.is_empty() {
            tracing::info!(source = %source.name, "Change suppressed: noise-only diff");
            return Ok(None);
        }

        tracing::info!(
            source = %source.name,
            diff_bytes = diff.len(),
            "Change detected"
        );
        let change = self
            .changes
            .insert(&NewChange {
                source_id: source.id,
                prior_snapshot_id: Some(previous.id),
                new_snapshot_id: latest.id,
                diff,
                detected_at,
                analyzed: false,
            })
            .await?;
        Ok(Some(change))
    }
}

/// Unified diff of `old` vs `new`, with noise-only hunks stripped.
///
/// A hunk survives when at least one of its added/removed lines is not
/// judged noise. Returns an empty string when nothing survives.
pub fn filtered_diff<N: NoiseFilter>(old: &str, new: &str, filter: &N) -> String {
    let text_diff = TextDiff::from_lines(old, new);
    let mut unified = text_diff.unified_diff();
    unified.context_radius(DIFF_CONTEXT_LINES);

    let mut body = String::new();
    for hunk in unified.iter_hunks() {
        let significant = hunk.iter_changes().any(|change| match change.tag() {
            ChangeTag::Delete | ChangeTag::Insert => {
                !filter.is_noise(change.value().trim_end_matches('\n'))
            }
            ChangeTag::Equal => false,
        });
        if significant {
            body.push_str(&hunk.to_string());
            if !body.ends_with('\n') {
                body.push('\n');
            }
        }
    }

    if body.is_empty() {
        body
    } else {
        format!("--- previous\n+++ current\n{body}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noise::{KeepAllFilter, PatternNoiseFilter};
    use crate::testutil::{MemoryChangeStore, MemorySnapshotStore, make_test_source};

    fn detector(
        snapshots: MemorySnapshotStore,
        changes: MemoryChangeStore,
    ) -> ChangeDetector<MemorySnapshotStore, MemoryChangeStore, PatternNoiseFilter> {
        ChangeDetector::new(
            FingerprintStore::new(snapshots),
            changes,
            PatternNoiseFilter::default(),
        )
    }

    #[tokio::test]
    async fn no_snapshot_means_no_change() {
        let source = make_test_source();
        let det = detector(MemorySnapshotStore::new(), MemoryChangeStore::new());
        assert!(det.detect(&source, Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn first_capture_creates_analyzed_baseline() {
        let source = make_test_source();
        let snapshots = MemorySnapshotStore::new();
        let changes = MemoryChangeStore::new();
        let fp = FingerprintStore::new(snapshots.clone());
        fp.record(&source, "initial body", Utc::now()).await.unwrap();

        let det = detector(snapshots, changes.clone());
        let change = det.detect(&source, Utc::now()).await.unwrap().unwrap();

        assert!(change.is_baseline());
        assert!(change.analyzed);
        assert!(change.diff.is_empty());
        assert!(changes.backlog(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn identical_hash_is_a_no_op() {
        let source = make_test_source();
        let snapshots = MemorySnapshotStore::new();
        let fp = FingerprintStore::new(snapshots.clone());
        fp.record(&source, "same body", Utc::now()).await.unwrap();
        // Second fetch differs only in surrounding whitespace.
        fp.record(&source, "  same body \n", Utc::now()).await.unwrap();

        let det = detector(snapshots, MemoryChangeStore::new());
        assert!(det.detect(&source, Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn real_change_lands_in_backlog() {
        let source = make_test_source();
        let snapshots = MemorySnapshotStore::new();
        let changes = MemoryChangeStore::new();
        let fp = FingerprintStore::new(snapshots.clone());
        fp.record(&source, "Old requirement text\nShared line", Utc::now())
            .await
            .unwrap();
        fp.record(&source, "New mandate for all acquirers\nShared line", Utc::now())
            .await
            .unwrap();

        let det = detector(snapshots, changes.clone());
        let change = det.detect(&source, Utc::now()).await.unwrap().unwrap();

        assert!(!change.analyzed);
        assert!(change.prior_snapshot_id.is_some());
        assert!(change.diff.contains("+New mandate for all acquirers"));
        assert!(change.diff.contains("-Old requirement text"));
        assert_eq!(changes.backlog(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn detect_twice_without_new_fetch_yields_nothing() {
        let source = make_test_source();
        let snapshots = MemorySnapshotStore::new();
        let changes = MemoryChangeStore::new();
        let fp = FingerprintStore::new(snapshots.clone());
        fp.record(&source, "v1", Utc::now()).await.unwrap();
        fp.record(&source, "v2", Utc::now()).await.unwrap();

        let det = detector(snapshots, changes.clone());
        assert!(det.detect(&source, Utc::now()).await.unwrap().is_some());
        assert!(det.detect(&source, Utc::now()).await.unwrap().is_none());
        assert_eq!(changes.inserted_count(), 1);
    }

    #[tokio::test]
    async fn noise_only_diff_produces_no_change() {
        let source = make_test_source();
        let snapshots = MemorySnapshotStore::new();
        let changes = MemoryChangeStore::new();
        let fp = FingerprintStore::new(snapshots.clone());
        fp.record(&source, "Requirement body\nCopyright Acme 2025", Utc::now())
            .await
            .unwrap();
        fp.record(&source, "Requirement body\nCopyright Acme 2026", Utc::now())
            .await
            .unwrap();

        let det = detector(snapshots, changes.clone());
        assert!(det.detect(&source, Utc::now()).await.unwrap().is_none());
        assert_eq!(changes.inserted_count(), 0);
    }

    #[test]
    fn filtered_diff_keeps_mixed_hunks_whole() {
        let old = "line one\nCopyright 2025\nline three";
        let new = "line one\nCopyright 2026\nline three changed";
        let diff = filtered_diff(old, new, &PatternNoiseFilter::default());
        // The hunk has one substantive edit, so the whole hunk survives,
        // copyright churn included.
        assert!(diff.contains("+line three changed"));
        assert!(diff.contains("Copyright"));
    }

    #[test]
    fn filtered_diff_empty_for_identical_input() {
        assert!(filtered_diff("same", "same", &KeepAllFilter).is_empty());
    }

    #[test]
    fn filtered_diff_has_unified_header() {
        let diff = filtered_diff("a", "b", &KeepAllFilter);
        assert!(diff.starts_with("--- previous\n+++ current\n@@"));
    }
}
