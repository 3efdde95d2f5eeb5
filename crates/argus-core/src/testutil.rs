//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls. The memory stores double as the
//! substrate for fingerprint/detector tests.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::MonitorError;
use crate::models::{
    Change, ComplianceItem, Impact, ItemOrigin, NewChange, NewSnapshot, Snapshot, Source,
};
use crate::traits::{ChangeStore, Cleaner, Extractor, Fetcher, SnapshotStore, SourceStore};

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher that returns a configurable response.
#[derive(Clone)]
pub struct MockFetcher {
    /// Queue of responses. Each call pops the first element.
    /// If empty, returns a default HTML string.
    responses: Arc<Mutex<Vec<Result<String, MonitorError>>>>,
    pub fetched_urls: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn new(html: &str) -> Self {
        Self {
            responses: Arc::new(Mutex::new(vec![Ok(html.to_string())])),
            fetched_urls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_error(error: MonitorError) -> Self {
        Self {
            responses: Arc::new(Mutex::new(vec![Err(error)])),
            fetched_urls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_responses(responses: Vec<Result<String, MonitorError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            fetched_urls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, MonitorError> {
        self.fetched_urls.lock().unwrap().push(url.to_string());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok("<html><body>default</body></html>".to_string())
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockCleaner
// ---------------------------------------------------------------------------

/// Mock cleaner that returns the input unchanged, or a configured error.
#[derive(Clone)]
pub struct MockCleaner {
    error: Arc<Mutex<Option<MonitorError>>>,
}

impl MockCleaner {
    pub fn passthrough() -> Self {
        Self {
            error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_error(error: MonitorError) -> Self {
        Self {
            error: Arc::new(Mutex::new(Some(error))),
        }
    }
}

impl Cleaner for MockCleaner {
    fn clean(&self, html: &str) -> Result<String, MonitorError> {
        let mut err = self.error.lock().unwrap();
        if let Some(e) = err.take() {
            return Err(e);
        }
        Ok(html.to_string())
    }
}

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

/// Mock extractor that returns configurable JSON.
#[derive(Clone)]
pub struct MockExtractor {
    responses: Arc<Mutex<Vec<Result<serde_json::Value, MonitorError>>>>,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl MockExtractor {
    pub fn new(data: serde_json::Value) -> Self {
        Self {
            responses: Arc::new(Mutex::new(vec![Ok(data)])),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_error(error: MonitorError) -> Self {
        Self {
            responses: Arc::new(Mutex::new(vec![Err(error)])),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_responses(responses: Vec<Result<serde_json::Value, MonitorError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Extractor for MockExtractor {
    async fn extract(
        &self,
        diff: &str,
        _source_name: &str,
        _source_url: &str,
    ) -> Result<serde_json::Value, MonitorError> {
        self.calls.lock().unwrap().push(diff.to_string());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(serde_json::json!({"title": "Default Extracted Change"}))
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MemorySourceStore
// ---------------------------------------------------------------------------

/// In-memory source store keyed by URL.
#[derive(Clone)]
pub struct MemorySourceStore {
    sources: Arc<Mutex<Vec<Source>>>,
}

impl MemorySourceStore {
    pub fn new() -> Self {
        Self {
            sources: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Default for MemorySourceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceStore for MemorySourceStore {
    async fn upsert(&self, source: &Source) -> Result<Source, MonitorError> {
        let mut sources = self.sources.lock().unwrap();
        if let Some(existing) = sources.iter_mut().find(|s| s.url == source.url) {
            existing.name = source.name.clone();
            existing.region = source.region.clone();
            existing.active = source.active;
            Ok(existing.clone())
        } else {
            sources.push(source.clone());
            Ok(source.clone())
        }
    }

    async fn list_active(&self) -> Result<Vec<Source>, MonitorError> {
        let sources = self.sources.lock().unwrap();
        Ok(sources.iter().filter(|s| s.active).cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// MemorySnapshotStore
// ---------------------------------------------------------------------------

/// In-memory append-only snapshot store.
///
/// Reads honor the store contract: only successful snapshots are visible
/// to `latest`/`previous`, in insertion order (the tests insert in capture
/// order).
#[derive(Clone)]
pub struct MemorySnapshotStore {
    snapshots: Arc<Mutex<Vec<Snapshot>>>,
    insert_error: Arc<Mutex<Option<MonitorError>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self {
            snapshots: Arc::new(Mutex::new(Vec::new())),
            insert_error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_insert_error(error: MonitorError) -> Self {
        Self {
            snapshots: Arc::new(Mutex::new(Vec::new())),
            insert_error: Arc::new(Mutex::new(Some(error))),
        }
    }

    pub fn count(&self) -> usize {
        self.snapshots.lock().unwrap().len()
    }
}

impl Default for MemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    async fn insert(&self, snapshot: &NewSnapshot) -> Result<Snapshot, MonitorError> {
        let mut err = self.insert_error.lock().unwrap();
        if let Some(e) = err.take() {
            return Err(e);
        }
        let stored = Snapshot {
            id: Uuid::new_v4(),
            source_id: snapshot.source_id,
            content: snapshot.content.clone(),
            content_hash: snapshot.content_hash.clone(),
            captured_at: snapshot.captured_at,
            status: snapshot.status,
            error_detail: snapshot.error_detail.clone(),
        };
        self.snapshots.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn latest(&self, source_id: Uuid) -> Result<Option<Snapshot>, MonitorError> {
        let snapshots = self.snapshots.lock().unwrap();
        Ok(snapshots
            .iter()
            .filter(|s| s.source_id == source_id && s.status == crate::models::FetchStatus::Success)
            .next_back()
            .cloned())
    }

    async fn previous(&self, source_id: Uuid) -> Result<Option<Snapshot>, MonitorError> {
        let snapshots = self.snapshots.lock().unwrap();
        Ok(snapshots
            .iter()
            .filter(|s| s.source_id == source_id && s.status == crate::models::FetchStatus::Success)
            .rev()
            .nth(1)
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// MemoryChangeStore
// ---------------------------------------------------------------------------

/// In-memory append-only change store with backlog semantics.
#[derive(Clone)]
pub struct MemoryChangeStore {
    changes: Arc<Mutex<Vec<Change>>>,
}

impl MemoryChangeStore {
    pub fn new() -> Self {
        Self {
            changes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Insert a change directly, bypassing the async trait. Returns the
    /// stored row for use in test assertions.
    pub fn seed(&self, change: NewChange) -> Change {
        let stored = Change {
            id: Uuid::new_v4(),
            source_id: change.source_id,
            prior_snapshot_id: change.prior_snapshot_id,
            new_snapshot_id: change.new_snapshot_id,
            diff: change.diff,
            detected_at: change.detected_at,
            analyzed: change.analyzed,
        };
        self.changes.lock().unwrap().push(stored.clone());
        stored
    }

    pub fn inserted_count(&self) -> usize {
        self.changes.lock().unwrap().len()
    }

    pub fn is_analyzed(&self, change_id: Uuid) -> bool {
        self.changes
            .lock()
            .unwrap()
            .iter()
            .any(|c| c.id == change_id && c.analyzed)
    }
}

impl Default for MemoryChangeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeStore for MemoryChangeStore {
    async fn insert(&self, change: &NewChange) -> Result<Change, MonitorError> {
        Ok(self.seed(change.clone()))
    }

    async fn backlog(&self, limit: usize) -> Result<Vec<Change>, MonitorError> {
        let changes = self.changes.lock().unwrap();
        let mut backlog: Vec<Change> = changes.iter().filter(|c| !c.analyzed).cloned().collect();
        backlog.sort_by_key(|c| c.detected_at);
        backlog.truncate(limit);
        Ok(backlog)
    }

    async fn latest_for_source(&self, source_id: Uuid) -> Result<Option<Change>, MonitorError> {
        let changes = self.changes.lock().unwrap();
        Ok(changes
            .iter()
            .filter(|c| c.source_id == source_id)
            .max_by_key(|c| c.detected_at)
            .cloned())
    }

    async fn mark_analyzed(&self, change_id: Uuid) -> Result<(), MonitorError> {
        let mut changes = self.changes.lock().unwrap();
        if let Some(change) = changes.iter_mut().find(|c| c.id == change_id) {
            change.analyzed = true;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Create a dummy monitored source.
pub fn make_test_source() -> Source {
    Source {
        id: Uuid::new_v4(),
        name: "Visa Developer Docs".to_string(),
        url: "https://developer.example.com/aft".to_string(),
        region: "Global".to_string(),
        active: true,
    }
}

/// Create a dummy NewChange. `baseline = true` produces a first-capture
/// change with no prior snapshot and an empty diff.
pub fn make_test_change(baseline: bool) -> NewChange {
    NewChange {
        source_id: Uuid::new_v4(),
        prior_snapshot_id: if baseline { None } else { Some(Uuid::new_v4()) },
        new_snapshot_id: Uuid::new_v4(),
        diff: if baseline {
            String::new()
        } else {
            "--- previous\n+++ current\n@@ -1 +1 @@\n-old rule\n+new rule\n".to_string()
        },
        detected_at: Utc::now(),
        analyzed: baseline,
    }
}

/// Build a compliance item for reconciler/publisher tests.
///
/// `origin` decides the hard lock; the dedup key is left empty — the
/// reconciler derives it.
pub fn make_item(
    title: &str,
    deadline: Option<NaiveDate>,
    regions: &[&str],
    origin: ItemOrigin,
    relevance: u8,
    detected_at: DateTime<Utc>,
) -> ComplianceItem {
    ComplianceItem {
        title: title.to_string(),
        summary: format!("{title} summary"),
        deadline,
        deadline_estimated: false,
        impact: Impact::Medium,
        categories: vec![],
        regions: regions.iter().map(|r| r.to_string()).collect(),
        transaction_types: vec![],
        requirements: vec![],
        keywords: vec![],
        source_name: "Test Source".to_string(),
        source_url: "https://example.com".to_string(),
        origin,
        relevance,
        dedup_key: String::new(),
        detected_at,
        created_at: detected_at,
    }
}
