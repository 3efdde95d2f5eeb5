//! Scan orchestration: fetch, fingerprint, and detect per source, then
//! drain the extraction backlog.
//!
//! Sources are independent: each one's fetch, snapshot write, and
//! detection run as a single sequential task, fanned out across sources
//! with bounded concurrency. The snapshot write therefore always strictly
//! precedes that source's detection reads, with no cross-source locking.
//! Extraction is a separate phase with its own, smaller pool, because the
//! extraction service is metered; every call goes through the circuit
//! breaker.
//!
//! No failure in here is fatal to the run. The worst outcome for a single
//! source or change is "excluded from this run's output."

use std::collections::HashMap;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::circuit::{Circuit, CircuitError};
use crate::detect::ChangeDetector;
use crate::extract::ExtractionAdapter;
use crate::fingerprint::FingerprintStore;
use crate::models::{ComplianceItem, Profile, Source};
use crate::noise::NoiseFilter;
use crate::score;
use crate::traits::{ChangeStore, Cleaner, Extractor, Fetcher, SnapshotStore};

/// Tuning knobs for one scan run.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Sources fetched and diffed concurrently.
    pub max_concurrent_fetches: usize,
    /// Concurrent calls to the metered extraction service.
    pub extract_concurrency: usize,
    /// Backlog changes drained per run.
    pub backlog_limit: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 4,
            extract_concurrency: 2,
            backlog_limit: 50,
        }
    }
}

/// Counters for one scan run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub sources_scanned: u32,
    pub snapshots_recorded: u32,
    pub changes_detected: u32,
    pub candidates_extracted: u32,
    pub errors: u32,
}

/// What a run produced: counters plus this run's scored automated items,
/// ready for reconciliation.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub report: ScanReport,
    pub automated: Vec<ComplianceItem>,
}

/// Orchestrates the full pipeline over any fetch/clean/extract/store
/// implementations.
pub struct ScanService<F, C, E, S, K, N>
where
    F: Fetcher,
    C: Cleaner,
    E: Extractor,
    S: SnapshotStore,
    K: ChangeStore,
    N: NoiseFilter,
{
    fetcher: F,
    cleaner: C,
    extractor: E,
    snapshots: FingerprintStore<S>,
    detector: ChangeDetector<S, K, N>,
    changes: K,
    circuit: Circuit,
    config: ScanConfig,
}

impl<F, C, E, S, K, N> ScanService<F, C, E, S, K, N>
where
    F: Fetcher,
    C: Cleaner,
    E: Extractor,
    S: SnapshotStore,
    K: ChangeStore,
    N: NoiseFilter,
{
    pub fn new(
        fetcher: F,
        cleaner: C,
        extractor: E,
        snapshot_store: S,
        change_store: K,
        filter: N,
        circuit: Circuit,
        config: ScanConfig,
    ) -> Self {
        Self {
            fetcher,
            cleaner,
            extractor,
            snapshots: FingerprintStore::new(snapshot_store.clone()),
            detector: ChangeDetector::new(
                FingerprintStore::new(snapshot_store),
                change_store.clone(),
                filter,
            ),
            changes: change_store,
            circuit,
            config,
        }
    }

    /// Run both phases for the given sources.
    ///
    /// Cancellation is checked between sources and between changes: a
    /// cancelled run finishes whatever stages are in flight and reports
    /// partial counters.
    pub async fn run(
        &self,
        sources: &[Source],
        profile: &Profile,
        cancel: &CancellationToken,
    ) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();

        let scans: Vec<Option<SourceScan>> = stream::iter(
            sources
                .iter()
                .filter(|s| s.active)
                .map(|source| self.scan_source(source, cancel)),
        )
        .buffer_unordered(self.config.max_concurrent_fetches)
        .collect()
        .await;

        for scan in scans.into_iter().flatten() {
            outcome.report.sources_scanned += 1;
            outcome.report.snapshots_recorded += scan.snapshots;
            outcome.report.changes_detected += scan.changes;
            outcome.report.errors += scan.errors;
        }

        if cancel.is_cancelled() {
            tracing::info!(report = ?outcome.report, "Scan cancelled before extraction phase");
            return outcome;
        }

        self.drain_backlog(sources, profile, cancel, &mut outcome).await;

        tracing::info!(report = ?outcome.report, "Scan complete");
        outcome
    }

    /// Phase 1 for one source: fetch, clean, snapshot, detect — strictly
    /// in that order.
    async fn scan_source(
        &self,
        source: &Source,
        cancel: &CancellationToken,
    ) -> Option<SourceScan> {
        if cancel.is_cancelled() {
            tracing::info!(source = %source.name, "Skipping source: run cancelled");
            return None;
        }

        let mut scan = SourceScan::default();
        let captured_at = Utc::now();

        match self.fetch_and_clean(source).await {
            Ok(text) => match self.snapshots.record(source, &text, captured_at).await {
                Ok(_) => scan.snapshots += 1,
                Err(e) => {
                    tracing::error!(source = %source.name, error = %e, "Snapshot write failed");
                    scan.errors += 1;
                    return Some(scan);
                }
            },
            Err(e) => {
                scan.errors += 1;
                // The error capture keeps its place in history; the
                // source's pipeline ends here for this run.
                match self
                    .snapshots
                    .record_error(source, &e.to_string(), captured_at)
                    .await
                {
                    Ok(_) => scan.snapshots += 1,
                    Err(e) => {
                        tracing::error!(source = %source.name, error = %e, "Error snapshot write failed");
                        scan.errors += 1;
                    }
                }
                return Some(scan);
            }
        }

        match self.detector.detect(source, Utc::now()).await {
            Ok(Some(change)) if !change.is_baseline() => scan.changes += 1,
            Ok(_) => {}
            Err(e) => {
                tracing::error!(source = %source.name, error = %e, "Change detection failed");
                scan.errors += 1;
            }
        }

        Some(scan)
    }

    async fn fetch_and_clean(&self, source: &Source) -> Result<String, crate::MonitorError> {
        let html = self.fetcher.fetch(&source.url).await?;
        self.cleaner.clean(&html)
    }

    /// Phase 2: drain the `analyzed = false` backlog through the circuit
    /// breaker, scoring each candidate against the profile.
    async fn drain_backlog(
        &self,
        sources: &[Source],
        profile: &Profile,
        cancel: &CancellationToken,
        outcome: &mut ScanOutcome,
    ) {
        let backlog = match self.changes.backlog(self.config.backlog_limit).await {
            Ok(backlog) => backlog,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read extraction backlog");
                outcome.report.errors += 1;
                return;
            }
        };
        if backlog.is_empty() {
            return;
        }
        tracing::info!(pending = backlog.len(), "Draining extraction backlog");

        let sources_by_id: HashMap<Uuid, &Source> =
            sources.iter().map(|s| (s.id, s)).collect();
        let adapter = ExtractionAdapter::new(self.extractor.clone(), self.changes.clone());
        let created_at = Utc::now();

        let results: Vec<Extracted> = stream::iter(backlog.iter().filter_map(|change| {
            let source = match sources_by_id.get(&change.source_id) {
                Some(source) => *source,
                None => {
                    // Change for a source no longer configured; leave it
                    // in the backlog.
                    tracing::warn!(change_id = %change.id, "No source for backlog change");
                    return None;
                }
            };
            let adapter = &adapter;
            Some(async move {
                if cancel.is_cancelled() {
                    return Extracted::Skipped;
                }
                match self.circuit.call(|| adapter.analyze(change, source)).await {
                    Ok(candidate) => {
                        let relevance = score::relevance(&candidate, profile);
                        Extracted::Item(ComplianceItem::from_automated(
                            candidate,
                            relevance,
                            change.detected_at,
                            created_at,
                        ))
                    }
                    Err(CircuitError::Open { retry_after }) => {
                        tracing::warn!(
                            change_id = %change.id,
                            retry_after_secs = retry_after.as_secs(),
                            "Extraction skipped: circuit open"
                        );
                        Extracted::Skipped
                    }
                    Err(CircuitError::Inner(e)) => {
                        tracing::warn!(
                            change_id = %change.id,
                            source = %source.name,
                            error = %e,
                            retryable = e.is_retryable(),
                            "Extraction failed"
                        );
                        Extracted::Failed
                    }
                }
            })
        }))
        .buffer_unordered(self.config.extract_concurrency)
        .collect()
        .await;

        for result in results {
            match result {
                Extracted::Item(item) => {
                    outcome.report.candidates_extracted += 1;
                    outcome.automated.push(item);
                }
                Extracted::Failed => outcome.report.errors += 1,
                Extracted::Skipped => {}
            }
        }
    }
}

#[derive(Debug, Default)]
struct SourceScan {
    snapshots: u32,
    changes: u32,
    errors: u32,
}

enum Extracted {
    Item(ComplianceItem),
    Failed,
    Skipped,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MonitorError;
    use crate::models::FetchStatus;
    use crate::noise::PatternNoiseFilter;
    use crate::testutil::{
        MemoryChangeStore, MemorySnapshotStore, MockCleaner, MockExtractor, MockFetcher,
        make_test_source,
    };
    use serde_json::json;

    type TestService = ScanService<
        MockFetcher,
        MockCleaner,
        MockExtractor,
        MemorySnapshotStore,
        MemoryChangeStore,
        PatternNoiseFilter,
    >;

    fn service(
        fetcher: MockFetcher,
        extractor: MockExtractor,
        snapshots: MemorySnapshotStore,
        changes: MemoryChangeStore,
    ) -> TestService {
        ScanService::new(
            fetcher,
            MockCleaner::passthrough(),
            extractor,
            snapshots,
            changes,
            PatternNoiseFilter::default(),
            Circuit::default(),
            ScanConfig {
                max_concurrent_fetches: 1,
                ..Default::default()
            },
        )
    }

    fn payload() -> serde_json::Value {
        json!({
            "title": "New AFT Recipient Requirements",
            "summary": "recipientDetails becomes mandatory.",
            "deadline": "2026-03-31",
            "impact_level": "high",
            "regions": ["Global"],
            "keywords": ["AFT", "Visa"]
        })
    }

    #[tokio::test]
    async fn two_runs_produce_baseline_then_extraction() {
        let source = make_test_source();
        let sources = vec![source];
        let profile = Profile::default();
        let cancel = CancellationToken::new();

        let fetcher = MockFetcher::with_responses(vec![
            Ok("Old requirement body".to_string()),
            Ok("New mandate body for acquirers".to_string()),
        ]);
        let snapshots = MemorySnapshotStore::new();
        let changes = MemoryChangeStore::new();
        let svc = service(
            fetcher,
            MockExtractor::new(payload()),
            snapshots,
            changes.clone(),
        );

        // First run: baseline capture, nothing to extract.
        let first = svc.run(&sources, &profile, &cancel).await;
        assert_eq!(first.report.sources_scanned, 1);
        assert_eq!(first.report.snapshots_recorded, 1);
        assert_eq!(first.report.changes_detected, 0);
        assert!(first.automated.is_empty());

        // Second run: content changed, change detected and extracted.
        let second = svc.run(&sources, &profile, &cancel).await;
        assert_eq!(second.report.changes_detected, 1);
        assert_eq!(second.report.candidates_extracted, 1);
        assert_eq!(second.report.errors, 0);

        let item = &second.automated[0];
        assert_eq!(item.title, "New AFT Recipient Requirements");
        // Base 5 + 2 Global region + 1 high impact.
        assert_eq!(item.relevance, 8);
        assert!(changes.backlog(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_error_becomes_error_snapshot_and_other_sources_continue() {
        let bad = make_test_source();
        let mut good = make_test_source();
        good.url = "https://other.example.com/docs".to_string();
        let sources = vec![bad, good];
        let cancel = CancellationToken::new();

        let fetcher = MockFetcher::with_responses(vec![
            Err(MonitorError::Fetch("HTTP 503".into())),
            Ok("Fine body".to_string()),
        ]);
        let snapshots = MemorySnapshotStore::new();
        let svc = service(
            fetcher,
            MockExtractor::new(payload()),
            snapshots.clone(),
            MemoryChangeStore::new(),
        );

        let outcome = svc.run(&sources, &Profile::default(), &cancel).await;

        assert_eq!(outcome.report.sources_scanned, 2);
        assert_eq!(outcome.report.snapshots_recorded, 2);
        assert_eq!(outcome.report.errors, 1);
        // Both captures persisted: one error, one success.
        assert_eq!(snapshots.count(), 2);
        let error_snap = svc.snapshots.latest(&sources[0]).await.unwrap();
        assert!(error_snap.is_none(), "error snapshots are invisible to reads");
        let good_snap = svc.snapshots.latest(&sources[1]).await.unwrap().unwrap();
        assert_eq!(good_snap.status, FetchStatus::Success);
    }

    #[tokio::test]
    async fn extraction_failure_leaves_change_in_backlog() {
        let source = make_test_source();
        let sources = vec![source];
        let cancel = CancellationToken::new();

        let fetcher = MockFetcher::with_responses(vec![
            Ok("Version one".to_string()),
            Ok("Version two changed".to_string()),
        ]);
        let changes = MemoryChangeStore::new();
        let svc = service(
            fetcher,
            MockExtractor::with_error(MonitorError::Timeout(120)),
            MemorySnapshotStore::new(),
            changes.clone(),
        );

        svc.run(&sources, &Profile::default(), &cancel).await;
        let outcome = svc.run(&sources, &Profile::default(), &cancel).await;

        assert_eq!(outcome.report.changes_detected, 1);
        assert_eq!(outcome.report.candidates_extracted, 0);
        assert_eq!(outcome.report.errors, 1);
        // Retryable on the next run.
        assert_eq!(changes.backlog(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cancelled_run_skips_everything() {
        let sources = vec![make_test_source()];
        let cancel = CancellationToken::new();
        cancel.cancel();

        let svc = service(
            MockFetcher::new("<html>body</html>"),
            MockExtractor::new(payload()),
            MemorySnapshotStore::new(),
            MemoryChangeStore::new(),
        );

        let outcome = svc.run(&sources, &Profile::default(), &cancel).await;
        assert_eq!(outcome.report, ScanReport::default());
    }

    #[tokio::test]
    async fn open_circuit_leaves_backlog_for_later() {
        let source = make_test_source();
        let sources = vec![source];
        let cancel = CancellationToken::new();

        let fetcher = MockFetcher::with_responses(vec![
            Ok("Version one".to_string()),
            Ok("Version two changed".to_string()),
        ]);
        let changes = MemoryChangeStore::new();
        let circuit = Circuit::new(crate::circuit::CircuitConfig {
            failure_threshold: 1,
            recovery_timeout: std::time::Duration::from_secs(600),
            ..Default::default()
        });
        circuit.record_failure(&MonitorError::RateLimited);

        let svc = ScanService::new(
            fetcher,
            MockCleaner::passthrough(),
            MockExtractor::new(payload()),
            MemorySnapshotStore::new(),
            changes.clone(),
            PatternNoiseFilter::default(),
            circuit,
            ScanConfig {
                max_concurrent_fetches: 1,
                ..Default::default()
            },
        );

        svc.run(&sources, &Profile::default(), &cancel).await;
        let outcome = svc.run(&sources, &Profile::default(), &cancel).await;

        // Detected but never handed to the metered service.
        assert_eq!(outcome.report.changes_detected, 1);
        assert_eq!(outcome.report.candidates_extracted, 0);
        assert_eq!(changes.backlog(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn inactive_sources_are_not_scanned() {
        let mut source = make_test_source();
        source.active = false;
        let fetcher = MockFetcher::new("<html>body</html>");
        let svc = service(
            fetcher.clone(),
            MockExtractor::new(payload()),
            MemorySnapshotStore::new(),
            MemoryChangeStore::new(),
        );

        let outcome = svc
            .run(&[source], &Profile::default(), &CancellationToken::new())
            .await;
        assert_eq!(outcome.report.sources_scanned, 0);
        assert!(fetcher.fetched_urls.lock().unwrap().is_empty());
    }
}
