//! CSV and JSON export of a published item set.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;

use argus_core::publish::{Publication, PublishedItem};

const CSV_HEADER: &[&str] = &[
    "title",
    "impact",
    "deadline",
    "days_remaining",
    "status",
    "summary",
    "categories",
    "regions",
    "transaction_types",
    "requirements",
    "relevance",
    "origin",
    "source_name",
    "source_url",
    "detected_at",
];

/// Write the publication as CSV. Multi-valued fields are joined with
/// commas inside one quoted cell.
pub fn write_csv(publication: &Publication, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    writer.write_record(CSV_HEADER)?;
    for item in &publication.items {
        writer.write_record(csv_row(item, publication.as_of))?;
    }
    writer.flush()?;
    Ok(())
}

fn csv_row(item: &PublishedItem, as_of: NaiveDate) -> Vec<String> {
    let days_remaining = item
        .deadline
        .map(|d| (d - as_of).num_days().to_string())
        .unwrap_or_default();
    vec![
        item.title.clone(),
        format!("{:?}", item.impact).to_uppercase(),
        item.deadline.map(|d| d.to_string()).unwrap_or_default(),
        days_remaining,
        serde_json::to_value(item.status)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default(),
        item.summary.clone(),
        item.categories.join(", "),
        item.regions.join(", "),
        item.transaction_types.join(", "),
        item.requirements.join(", "),
        item.relevance.to_string(),
        item.origin.clone(),
        item.source_name.clone(),
        item.source_url.clone(),
        item.detected_at.to_rfc3339(),
    ]
}

/// Write the publication as pretty-printed JSON.
pub fn write_json(publication: &Publication, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(publication)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
