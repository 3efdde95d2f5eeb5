//! Publication view: the final, time-filtered, ordered item set handed to
//! any presentation layer.
//!
//! Filtering here is a view concern only. Items whose deadline has passed
//! drop out of the default publication but stay queryable through
//! [`history`]; nothing is ever deleted.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ComplianceItem, Impact, ItemStatus};

/// One item in serialized, presentation-ready form.
///
/// Field names are stable, dates are ISO-8601, multi-valued fields are
/// arrays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedItem {
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
    pub origin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_id: Option<String>,
    pub relevance: u8,
    pub dedup_key: String,
    pub status: ItemStatus,
    pub detected_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl PublishedItem {
    fn from_item(item: &ComplianceItem, as_of: NaiveDate, due_soon_days: i64) -> Self {
        Self {
            title: item.title.clone(),
            summary: item.summary.clone(),
            deadline: item.deadline,
            deadline_estimated: item.deadline_estimated,
            impact: item.impact,
            categories: item.categories.clone(),
            regions: item.regions.clone(),
            transaction_types: item.transaction_types.clone(),
            requirements: item.requirements.clone(),
            keywords: item.keywords.clone(),
            source_name: item.source_name.clone(),
            source_url: item.source_url.clone(),
            origin: item.origin.as_str().to_string(),
            manual_id: match &item.origin {
                crate::models::ItemOrigin::Manual { manual_id } => Some(manual_id.clone()),
                crate::models::ItemOrigin::Automated => None,
            },
            relevance: item.relevance,
            dedup_key: item.dedup_key.clone(),
            status: ItemStatus::classify(item.deadline, as_of, due_soon_days),
            detected_at: item.detected_at,
            created_at: item.created_at,
        }
    }
}

/// The serialized record set handed to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Publication {
    pub last_updated: DateTime<Utc>,
    pub as_of: NaiveDate,
    pub total_items: usize,
    pub items: Vec<PublishedItem>,
}

/// Build the default publication: past-deadline items excluded, ordered by
/// (relevance desc, deadline asc with missing deadlines last, dedup key
/// asc).
///
/// Idempotent: the same items, `as_of`, and `last_updated` always yield
/// identical output.
pub fn publish(
    items: &[ComplianceItem],
    as_of: NaiveDate,
    due_soon_days: i64,
    last_updated: DateTime<Utc>,
) -> Publication {
    let published = ordered(
        items
            .iter()
            .filter(|item| item.deadline.is_none_or(|d| d >= as_of)),
        as_of,
        due_soon_days,
    );
    tracing::debug!(
        total = items.len(),
        published = published.len(),
        "Publication built"
    );
    Publication {
        last_updated,
        as_of,
        total_items: published.len(),
        items: published,
    }
}

/// The unfiltered view: every item regardless of deadline, same ordering.
/// Past-deadline items remain queryable here for audit.
pub fn history(
    items: &[ComplianceItem],
    as_of: NaiveDate,
    due_soon_days: i64,
    last_updated: DateTime<Utc>,
) -> Publication {
    let published = ordered(items.iter(), as_of, due_soon_days);
    Publication {
        last_updated,
        as_of,
        total_items: published.len(),
        items: published,
    }
}

fn ordered<'a>(
    items: impl Iterator<Item = &'a ComplianceItem>,
    as_of: NaiveDate,
    due_soon_days: i64,
) -> Vec<PublishedItem> {
    let mut published: Vec<PublishedItem> = items
        .map(|item| PublishedItem::from_item(item, as_of, due_soon_days))
        .collect();
    published.sort_by(|a, b| {
        b.relevance
            .cmp(&a.relevance)
            .then_with(|| match (a.deadline, b.deadline) {
                (Some(da), Some(db)) => da.cmp(&db),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            })
            .then_with(|| a.dedup_key.cmp(&b.dedup_key))
    });
    published
}
