use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A monitored documentation endpoint.
///
/// Owned by configuration (`sources.yaml`); referenced, never owned, by
/// snapshots. Immutable except for `active`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    /// Region tag for the publishing body (e.g. "Global", "Europe", "MENA").
    pub region: String,
    pub active: bool,
}

/// Outcome of one fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Success,
    Error,
}

impl FetchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStatus::Success => "success",
            FetchStatus::Error => "error",
        }
    }
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FetchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(FetchStatus::Success),
            "error" => Ok(FetchStatus::Error),
            other => Err(format!("unknown fetch status: {other}")),
        }
    }
}

/// One fetched, hashed capture of a source's content.
///
/// Append-only; snapshots for a source are totally ordered by `captured_at`.
/// The content hash is derived from the normalized content and is empty for
/// error snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub id: Uuid,
    pub source_id: Uuid,
    pub content: String,
    /// SHA-256 hex of the normalized content; empty when `status` is Error.
    pub content_hash: String,
    pub captured_at: DateTime<Utc>,
    pub status: FetchStatus,
    pub error_detail: Option<String>,
}

/// DTO for inserting a new snapshot.
#[derive(Debug, Clone)]
pub struct NewSnapshot {
    pub source_id: Uuid,
    pub content: String,
    pub content_hash: String,
    pub captured_at: DateTime<Utc>,
    pub status: FetchStatus,
    pub error_detail: Option<String>,
}

/// A detected, noise-filtered delta between two consecutive snapshots.
///
/// `prior_snapshot_id = None` marks a baseline capture, not a real change.
/// `analyzed = false` means the change is backlog awaiting extraction; once
/// analyzed it is immutable.
#[derive(Debug, Clone, Serialize)]
pub struct Change {
    pub id: Uuid,
    pub source_id: Uuid,
    pub prior_snapshot_id: Option<Uuid>,
    pub new_snapshot_id: Uuid,
    pub diff: String,
    pub detected_at: DateTime<Utc>,
    pub analyzed: bool,
}

impl Change {
    /// True for the first capture of a source, which has nothing to diff
    /// against and is never pushed to extraction.
    pub fn is_baseline(&self) -> bool {
        self.prior_snapshot_id.is_none()
    }
}

/// DTO for inserting a new change.
#[derive(Debug, Clone)]
pub struct NewChange {
    pub source_id: Uuid,
    pub prior_snapshot_id: Option<Uuid>,
    pub new_snapshot_id: Uuid,
    pub diff: String,
    pub detected_at: DateTime<Utc>,
    pub analyzed: bool,
}

/// Impact level assigned by extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    High,
    Medium,
    Low,
}

impl Impact {
    /// Lenient parse for extractor output; anything unrecognized is Medium.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "high" => Impact::High,
            "low" => Impact::Low,
            _ => Impact::Medium,
        }
    }
}

/// Structured fields produced by extracting a change.
///
/// Has no identity of its own until it survives reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub title: String,
    pub summary: String,
    pub deadline: Option<NaiveDate>,
    /// True when the deadline was inferred rather than stated verbatim.
    pub deadline_estimated: bool,
    pub impact: Impact,
    /// Merchant category codes (4-digit), validated against the known space.
    pub categories: Vec<String>,
    pub regions: Vec<String>,
    pub transaction_types: Vec<String>,
    pub requirements: Vec<String>,
    pub keywords: Vec<String>,
    pub source_name: String,
    pub source_url: String,
}

/// Where a compliance item came from.
///
/// Manual items are hard-locked: the reconciler never overwrites or removes
/// them regardless of what automated extraction produces for the same
/// real-world event. Making the lock part of the variant means a hard-locked
/// automated item cannot be expressed at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOrigin {
    Manual { manual_id: String },
    Automated,
}

impl ItemOrigin {
    pub fn is_hard_locked(&self) -> bool {
        matches!(self, ItemOrigin::Manual { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemOrigin::Manual { .. } => "manual",
            ItemOrigin::Automated => "automated",
        }
    }
}

/// The reconciled, user-facing record.
#[derive(Debug, Clone)]
pub struct ComplianceItem {
    pub title: String,
    pub summary: String,
    pub deadline: Option<NaiveDate>,
    pub deadline_estimated: bool,
    pub impact: Impact,
    pub categories: Vec<String>,
    pub regions: Vec<String>,
    pub transaction_types: Vec<String>,
    pub requirements: Vec<String>,
    pub keywords: Vec<String>,
    pub source_name: String,
    pub source_url: String,
    pub origin: ItemOrigin,
    /// 1–10 fit against the caller's profile.
    pub relevance: u8,
    /// Derived identity for "the same real-world requirement" (see reconcile).
    pub dedup_key: String,
    /// When the underlying change was first detected (manual items: curation
    /// date). Fixed by the change record, never advanced between runs.
    pub detected_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ComplianceItem {
    /// Promote a scored candidate to an automated item. The dedup key is
    /// left for the reconciler to derive.
    pub fn from_automated(
        candidate: CandidateRecord,
        relevance: u8,
        detected_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            title: candidate.title,
            summary: candidate.summary,
            deadline: candidate.deadline,
            deadline_estimated: candidate.deadline_estimated,
            impact: candidate.impact,
            categories: candidate.categories,
            regions: candidate.regions,
            transaction_types: candidate.transaction_types,
            requirements: candidate.requirements,
            keywords: candidate.keywords,
            source_name: candidate.source_name,
            source_url: candidate.source_url,
            origin: ItemOrigin::Automated,
            relevance,
            dedup_key: String::new(),
            detected_at,
            created_at,
        }
    }
}

/// Observable deadline status, computed from current time only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemStatus {
    Future,
    DueSoon,
    Overdue,
}

impl ItemStatus {
    /// Pure function of (deadline, as_of, window). Items without a deadline
    /// are Future: nothing to be overdue against.
    pub fn classify(deadline: Option<NaiveDate>, as_of: NaiveDate, due_soon_days: i64) -> Self {
        match deadline {
            None => ItemStatus::Future,
            Some(d) if d < as_of => ItemStatus::Overdue,
            Some(d) if (d - as_of).num_days() <= due_soon_days => ItemStatus::DueSoon,
            Some(_) => ItemStatus::Future,
        }
    }
}

/// Caller-supplied relevance profile, explicitly passed into scoring —
/// never ambient state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
