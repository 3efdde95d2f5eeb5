//! Loading of manually curated compliance records.
//!
//! The manual record store is a human-edited YAML file, re-read on every
//! run so edits take effect without a restart. Records become hard-locked
//! [`ComplianceItem`]s; the reconciler never overwrites or removes them.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use crate::error::MonitorError;
use crate::models::{ComplianceItem, Impact, ItemOrigin};

/// One record as it appears in `manual.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ManualRecord {
    /// Stable editor-assigned identifier, e.g. "man-001". Required.
    pub manual_id: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
    #[serde(default)]
    pub deadline_estimated: bool,
    #[serde(default = "default_impact")]
    pub impact: Impact,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub transaction_types: Vec<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub source_name: String,
    #[serde(default)]
    pub source_url: String,
    /// Editor-assigned relevance, clamped into [1, 10] on load.
    #[serde(default = "default_relevance")]
    pub relevance: u8,
    /// When the editor curated the record; defaults to load time.
    #[serde(default)]
    pub curated_at: Option<DateTime<Utc>>,
}

fn default_impact() -> Impact {
    Impact::Medium
}

fn default_relevance() -> u8 {
    5
}

#[derive(Debug, Deserialize)]
struct ManualFile {
    #[serde(default)]
    records: Vec<ManualRecord>,
}

/// Load and validate the manual record file, converting each record to a
/// hard-locked item.
///
/// Validation is strict: a blank `manual_id` or title, or two records
/// sharing a `manual_id`, is a config error — a silently mangled manual
/// set would undermine the hard-lock guarantee.
pub fn load_manual_records(path: &Path) -> Result<Vec<ComplianceItem>, MonitorError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        MonitorError::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    let file: ManualFile = serde_yaml::from_str(&raw).map_err(|e| {
        MonitorError::Config(format!("invalid manual record file {}: {e}", path.display()))
    })?;

    let loaded_at = Utc::now();
    let mut seen_ids = HashSet::new();
    let mut items = Vec::with_capacity(file.records.len());
    for record in file.records {
        if record.manual_id.trim().is_empty() {
            return Err(MonitorError::Config(format!(
                "manual record '{}' has no manual_id",
                record.title
            )));
        }
        if record.title.trim().is_empty() {
            return Err(MonitorError::Config(format!(
                "manual record '{}' has no title",
                record.manual_id
            )));
        }
        if !seen_ids.insert(record.manual_id.clone()) {
            return Err(MonitorError::Config(format!(
                "duplicate manual_id '{}'",
                record.manual_id
            )));
        }
        items.push(into_item(record, loaded_at));
    }

    tracing::debug!(count = items.len(), file = %path.display(), "Manual records loaded");
    Ok(items)
}

fn into_item(record: ManualRecord, loaded_at: DateTime<Utc>) -> ComplianceItem {
    let detected_at = record.curated_at.unwrap_or(loaded_at);
    ComplianceItem {
        title: record.title,
        summary: record.summary,
        deadline: record.deadline,
        deadline_estimated: record.deadline_estimated,
        impact: record.impact,
        categories: record.categories,
        regions: record.regions,
        transaction_types: record.transaction_types,
        requirements: record.requirements,
        keywords: record.keywords,
        source_name: record.source_name,
        source_url: record.source_url,
        origin: ItemOrigin::Manual {
            manual_id: record.manual_id,
        },
        relevance: record.relevance.clamp(1, 10),
        // Derived during reconciliation.
        dedup_key: String::new(),
        detected_at,
        created_at: loaded_at,
    }
}
