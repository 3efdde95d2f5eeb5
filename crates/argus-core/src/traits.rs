use std::future::Future;

use uuid::Uuid;

use crate::error::MonitorError;
use crate::models::{Change, NewChange, NewSnapshot, Snapshot, Source};

/// Fetches raw HTML content from a URL.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, MonitorError>> + Send;
}

/// Converts raw HTML into the plain text body that gets fingerprinted.
pub trait Cleaner: Send + Sync + Clone {
    fn clean(&self, html: &str) -> Result<String, MonitorError>;
}

/// Extracts candidate compliance fields from a change's diff text.
///
/// Wraps the external text-understanding service. Returns the raw JSON
/// object; structural validation happens in the extraction adapter, not here.
pub trait Extractor: Send + Sync + Clone {
    fn extract(
        &self,
        diff: &str,
        source_name: &str,
        source_url: &str,
    ) -> impl Future<Output = Result<serde_json::Value, MonitorError>> + Send;
}

/// Persists and retrieves monitored sources.
pub trait SourceStore: Send + Sync + Clone {
    /// Insert a source, or update name/region/active if the URL exists.
    fn upsert(&self, source: &Source) -> impl Future<Output = Result<Source, MonitorError>> + Send;

    fn list_active(&self) -> impl Future<Output = Result<Vec<Source>, MonitorError>> + Send;
}

/// Append-only snapshot history.
///
/// Reads skip error snapshots: an error capture participates in ordering but
/// never counts as "changed" relative to the last good snapshot.
pub trait SnapshotStore: Send + Sync + Clone {
    /// Append a snapshot. Returns the stored row with its generated id.
    fn insert(
        &self,
        snapshot: &NewSnapshot,
    ) -> impl Future<Output = Result<Snapshot, MonitorError>> + Send;

    /// Most recent successful snapshot for a source.
    fn latest(
        &self,
        source_id: Uuid,
    ) -> impl Future<Output = Result<Option<Snapshot>, MonitorError>> + Send;

    /// Successful snapshot immediately before the latest one.
    fn previous(
        &self,
        source_id: Uuid,
    ) -> impl Future<Output = Result<Option<Snapshot>, MonitorError>> + Send;
}

/// Append-only change history plus the extraction backlog.
pub trait ChangeStore: Send + Sync + Clone {
    fn insert(
        &self,
        change: &NewChange,
    ) -> impl Future<Output = Result<Change, MonitorError>> + Send;

    /// Changes with `analyzed = false`, oldest first. Baselines never appear
    /// here: they are created already analyzed.
    fn backlog(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Change>, MonitorError>> + Send;

    /// Most recently detected change for a source, baseline or not.
    /// The detector uses this to stay idempotent across repeated runs
    /// against the same capture.
    fn latest_for_source(
        &self,
        source_id: Uuid,
    ) -> impl Future<Output = Result<Option<Change>, MonitorError>> + Send;

    fn mark_analyzed(
        &self,
        change_id: Uuid,
    ) -> impl Future<Output = Result<(), MonitorError>> + Send;
}

