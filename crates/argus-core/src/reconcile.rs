//! Hybrid reconciliation of manually curated and automatically extracted
//! compliance items.
//!
//! Manual items are hard-locked: an automated candidate that collides with
//! a manual item on the dedup key is dropped outright, never merged or
//! promoted. Surviving automated candidates are then deduplicated against
//! each other, keeping the highest-relevance record per key. Every drop is
//! recorded so false dedups can be audited.
//!
//! The pass is purely functional: identical inputs always produce a
//! byte-identical item set.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{ComplianceItem, compute_hash};

/// Lower-case and trim a key segment.
fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// First region in canonical (normalized lexicographic) order, so that
/// `[UK, Europe]` and `[Europe, UK]` agree on the same segment.
fn primary_region(regions: &[String]) -> String {
    regions
        .iter()
        .map(|r| normalize(r))
        .min()
        .unwrap_or_default()
}

/// Derived identity for "the same real-world requirement reported by
/// different sources": SHA-256 over normalized title, ISO deadline, and
/// the primary region.
///
/// The deadline is part of the key on purpose: records that agree on
/// title and region but differ in deadline are treated as distinct and
/// both publish.
pub fn dedup_key(title: &str, deadline: Option<NaiveDate>, regions: &[String]) -> String {
    let deadline_part = deadline.map(|d| d.to_string()).unwrap_or_default();
    compute_hash(&format!(
        "{}|{}|{}",
        normalize(title),
        deadline_part,
        primary_region(regions)
    ))
}

/// Why an automated candidate was dropped during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Collided with a hard-locked manual item.
    ManualConflict,
    /// Collided with another automated candidate that scored higher (or
    /// equal but detected earlier).
    DuplicateOfHigherScore,
}

/// An automated candidate excluded from the published set, kept for
/// observability.
#[derive(Debug, Clone)]
pub struct DroppedCandidate {
    pub item: ComplianceItem,
    pub reason: DropReason,
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    /// The deduplicated set: all manual items plus surviving automated
    /// candidates, ordered by dedup key.
    pub items: Vec<ComplianceItem>,
    /// Every automated candidate that did not survive, with its reason.
    pub dropped: Vec<DroppedCandidate>,
}

/// Merge the hard-locked manual set with this run's automated candidates.
///
/// Dedup keys are (re)derived here for every input, so callers never need
/// to pre-compute them. Manual items always pass through untouched; they
/// are never deduplicated against each other or against automated
/// candidates.
pub fn reconcile(
    manual: Vec<ComplianceItem>,
    automated: Vec<ComplianceItem>,
) -> ReconcileOutcome {
    let manual: Vec<ComplianceItem> = manual.into_iter().map(with_key).collect();
    let manual_keys: HashSet<&str> = manual.iter().map(|i| i.dedup_key.as_str()).collect();

    let mut dropped = Vec::new();

    // Manual hard lock: a colliding automated candidate is dropped, never
    // merged field-by-field.
    let mut survivors: Vec<ComplianceItem> = Vec::new();
    for item in automated.into_iter().map(with_key) {
        if manual_keys.contains(item.dedup_key.as_str()) {
            tracing::info!(
                title = %item.title,
                source = %item.source_name,
                "Automated candidate dropped: conflicts with manual item"
            );
            dropped.push(DroppedCandidate {
                item,
                reason: DropReason::ManualConflict,
            });
        } else {
            survivors.push(item);
        }
    }

    // Intra-automated dedup: highest relevance wins, ties keep the
    // earliest-detected candidate.
    let mut by_key: HashMap<String, ComplianceItem> = HashMap::new();
    for item in survivors {
        match by_key.get(&item.dedup_key) {
            None => {
                by_key.insert(item.dedup_key.clone(), item);
            }
            Some(kept) => {
                tracing::warn!(
                    title = %item.title,
                    kept_source = %kept.source_name,
                    other_source = %item.source_name,
                    "Multiple automated candidates for the same requirement"
                );
                let replaces = item.relevance > kept.relevance
                    || (item.relevance == kept.relevance && item.detected_at < kept.detected_at);
                if replaces {
                    if let Some(loser) = by_key.insert(item.dedup_key.clone(), item) {
                        dropped.push(DroppedCandidate {
                            item: loser,
                            reason: DropReason::DuplicateOfHigherScore,
                        });
                    }
                } else {
                    dropped.push(DroppedCandidate {
                        item,
                        reason: DropReason::DuplicateOfHigherScore,
                    });
                }
            }
        }
    }

    let mut items: Vec<ComplianceItem> = manual;
    items.extend(by_key.into_values());
    // Stable output order: by key, manual before automated on the rare
    // key shared between two manual items, then manual id.
    items.sort_by(|a, b| {
        a.dedup_key
            .cmp(&b.dedup_key)
            .then_with(|| a.origin.as_str().cmp(b.origin.as_str()))
            .then_with(|| a.title.cmp(&b.title))
    });
    dropped.sort_by(|a, b| a.item.dedup_key.cmp(&b.item.dedup_key));

    ReconcileOutcome { items, dropped }
}

fn with_key(mut item: ComplianceItem) -> ComplianceItem {
    item.dedup_key = dedup_key(&item.title, item.deadline, &item.regions);
    item
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemOrigin;
    use crate::testutil::make_item;
    use chrono::{Duration, Utc};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn key_ignores_case_whitespace_and_region_order() {
        let deadline = Some(date(2026, 3, 31));
        let a = dedup_key(
            "Visa AFT Mandate",
            deadline,
            &["UK".to_string(), "Europe".to_string()],
        );
        let b = dedup_key(
            "  visa aft mandate ",
            deadline,
            &["Europe".to_string(), "UK".to_string()],
        );
        assert_eq!(a, b);
    }

    #[test]
    fn key_distinguishes_deadlines() {
        let regions = vec!["MENA".to_string()];
        let a = dedup_key("Visa AFT Mandate", Some(date(2026, 3, 31)), &regions);
        let b = dedup_key("Visa AFT Mandate", Some(date(2026, 4, 1)), &regions);
        assert_ne!(a, b);
        let c = dedup_key("Visa AFT Mandate", None, &regions);
        assert_ne!(a, c);
    }

    #[test]
    fn manual_hard_lock_drops_automated_collision() {
        let now = Utc::now();
        let manual = make_item(
            "Visa AFT Mandate",
            Some(date(2026, 3, 31)),
            &["MENA"],
            ItemOrigin::Manual {
                manual_id: "man-001".into(),
            },
            9,
            now,
        );
        // Case-different title, same deadline and region: same key.
        let automated = make_item(
            "Visa Aft Mandate",
            Some(date(2026, 3, 31)),
            &["MENA"],
            ItemOrigin::Automated,
            10,
            now,
        );

        let outcome = reconcile(vec![manual], vec![automated]);

        assert_eq!(outcome.items.len(), 1);
        assert!(outcome.items[0].origin.is_hard_locked());
        assert_eq!(outcome.dropped.len(), 1);
        assert_eq!(outcome.dropped[0].reason, DropReason::ManualConflict);
    }

    #[test]
    fn manual_wins_regardless_of_relevance() {
        let now = Utc::now();
        let manual = make_item(
            "PSD3 Strong Auth",
            Some(date(2026, 6, 1)),
            &["Europe"],
            ItemOrigin::Manual {
                manual_id: "man-002".into(),
            },
            1,
            now,
        );
        let automated = make_item(
            "PSD3 Strong Auth",
            Some(date(2026, 6, 1)),
            &["Europe"],
            ItemOrigin::Automated,
            10,
            now,
        );

        let outcome = reconcile(vec![manual], vec![automated]);
        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.items[0].relevance, 1);
    }

    #[test]
    fn intra_automated_dedup_keeps_higher_score() {
        let now = Utc::now();
        let low = make_item(
            "OCT Settlement Window",
            Some(date(2026, 9, 1)),
            &["Global"],
            ItemOrigin::Automated,
            6,
            now,
        );
        let high = make_item(
            "OCT Settlement Window",
            Some(date(2026, 9, 1)),
            &["Global"],
            ItemOrigin::Automated,
            8,
            now + Duration::hours(1),
        );

        let outcome = reconcile(vec![], vec![low, high]);

        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.items[0].relevance, 8);
        assert_eq!(outcome.dropped.len(), 1);
        assert_eq!(
            outcome.dropped[0].reason,
            DropReason::DuplicateOfHigherScore
        );
        assert!(outcome.items[0].relevance >= outcome.dropped[0].item.relevance);
    }

    #[test]
    fn score_tie_keeps_earliest_detected() {
        let now = Utc::now();
        let early = make_item(
            "OCT Settlement Window",
            Some(date(2026, 9, 1)),
            &["Global"],
            ItemOrigin::Automated,
            7,
            now,
        );
        let late = make_item(
            "OCT Settlement Window",
            Some(date(2026, 9, 1)),
            &["Global"],
            ItemOrigin::Automated,
            7,
            now + Duration::hours(2),
        );

        // Feed the later one first to prove order independence.
        let outcome = reconcile(vec![], vec![late, early.clone()]);
        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.items[0].detected_at, early.detected_at);
    }

    #[test]
    fn near_duplicate_deadlines_both_publish() {
        let now = Utc::now();
        let a = make_item(
            "Visa AFT Mandate",
            Some(date(2026, 3, 31)),
            &["MENA"],
            ItemOrigin::Automated,
            7,
            now,
        );
        let b = make_item(
            "Visa AFT Mandate",
            Some(date(2026, 4, 1)),
            &["MENA"],
            ItemOrigin::Automated,
            7,
            now,
        );

        let outcome = reconcile(vec![], vec![a, b]);
        // The key includes the deadline: no fuzzy matching of day-off
        // near-duplicates.
        assert_eq!(outcome.items.len(), 2);
        assert!(outcome.dropped.is_empty());
    }

    #[test]
    fn reconcile_is_idempotent() {
        let now = Utc::now();
        let manual = vec![make_item(
            "Visa AFT Mandate",
            Some(date(2026, 3, 31)),
            &["MENA"],
            ItemOrigin::Manual {
                manual_id: "man-001".into(),
            },
            9,
            now,
        )];
        let automated = vec![
            make_item(
                "Mastercard MoneySend Update",
                Some(date(2026, 5, 1)),
                &["Global"],
                ItemOrigin::Automated,
                8,
                now,
            ),
            make_item(
                "Visa Aft Mandate",
                Some(date(2026, 3, 31)),
                &["MENA"],
                ItemOrigin::Automated,
                10,
                now,
            ),
        ];

        let first = reconcile(manual.clone(), automated.clone());
        let second = reconcile(manual, automated);

        let keys = |o: &ReconcileOutcome| -> Vec<(String, String, u8)> {
            o.items
                .iter()
                .map(|i| (i.dedup_key.clone(), i.title.clone(), i.relevance))
                .collect()
        };
        assert_eq!(keys(&first), keys(&second));
    }

    #[test]
    fn manual_items_are_never_deduped_against_each_other() {
        let now = Utc::now();
        let a = make_item(
            "Visa AFT Mandate",
            Some(date(2026, 3, 31)),
            &["MENA"],
            ItemOrigin::Manual {
                manual_id: "man-001".into(),
            },
            9,
            now,
        );
        let b = make_item(
            "Visa AFT Mandate",
            Some(date(2026, 3, 31)),
            &["MENA"],
            ItemOrigin::Manual {
                manual_id: "man-002".into(),
            },
            7,
            now,
        );

        let outcome = reconcile(vec![a, b], vec![]);
        assert_eq!(outcome.items.len(), 2);
    }

    #[test]
    fn empty_inputs_produce_empty_outcome() {
        let outcome = reconcile(vec![], vec![]);
        assert!(outcome.items.is_empty());
        assert!(outcome.dropped.is_empty());
    }
}
