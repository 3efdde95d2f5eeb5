//! Extraction adapter: one call to the external text-understanding service
//! per change, with structural validation of whatever comes back.
//!
//! Failure semantics matter more than the happy path here. Transport-class
//! failures (timeout, quota, malformed transport) leave the change in the
//! backlog for a later run. Validation discards (missing title) mark the
//! change analyzed — the same diff would fail the same way, so retrying is
//! waste. Individual bad fields never sink a candidate: they degrade to
//! "unknown".

use crate::error::MonitorError;
use crate::models::{CandidateRecord, Change, Impact, Source};
use crate::traits::{ChangeStore, Extractor};
use chrono::NaiveDate;

/// Wraps the extraction collaborator with validation and backlog bookkeeping.
pub struct ExtractionAdapter<E, C>
where
    E: Extractor,
    C: ChangeStore,
{
    extractor: E,
    changes: C,
}

impl<E, C> ExtractionAdapter<E, C>
where
    E: Extractor,
    C: ChangeStore,
{
    pub fn new(extractor: E, changes: C) -> Self {
        Self { extractor, changes }
    }

    /// Analyze one change into a candidate record.
    ///
    /// On success the change is marked analyzed. On a transport failure the
    /// change is left untouched and the error propagates (the caller counts
    /// it and moves on). On a validation discard the change is marked
    /// analyzed anyway and a `Validation` error is returned.
    pub async fn analyze(
        &self,
        change: &Change,
        source: &Source,
    ) -> Result<CandidateRecord, MonitorError> {
        if change.is_baseline() {
            return Err(MonitorError::Validation(
                "baseline captures have nothing to extract".into(),
            ));
        }

        let raw = self
            .extractor
            .extract(&change.diff, &source.name, &source.url)
            .await?;

        let obj = raw.as_object().ok_or_else(|| MonitorError::Extraction {
            message: "extractor returned a non-object payload".into(),
            status_code: 200,
            retryable: false,
        })?;

        let title = obj
            .get("title")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .unwrap_or_default();
        if title.is_empty() {
            tracing::warn!(
                change_id = %change.id,
                source = %source.name,
                "Candidate discarded: missing title"
            );
            self.changes.mark_analyzed(change.id).await?;
            return Err(MonitorError::Validation(format!(
                "candidate for change {} has no title",
                change.id
            )));
        }

        let deadline = obj
            .get("deadline")
            .and_then(|v| v.as_str())
            .and_then(|s| parse_deadline(s));
        let categories = string_list(obj.get("mccs"))
            .into_iter()
            .filter(|code| {
                let known = is_known_category(code);
                if !known {
                    tracing::debug!(code = %code, "Dropping category outside known code space");
                }
                known
            })
            .collect();

        let candidate = CandidateRecord {
            title: title.to_string(),
            summary: obj
                .get("summary")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .trim()
                .to_string(),
            deadline,
            deadline_estimated: obj
                .get("deadline_estimated")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            impact: Impact::parse_lenient(
                obj.get("impact_level").and_then(|v| v.as_str()).unwrap_or(""),
            ),
            categories,
            regions: string_list(obj.get("regions")),
            transaction_types: string_list(obj.get("transaction_types")),
            requirements: string_list(obj.get("technical_requirements")),
            keywords: string_list(obj.get("keywords")),
            source_name: source.name.clone(),
            source_url: source.url.clone(),
        };

        self.changes.mark_analyzed(change.id).await?;
        tracing::info!(
            change_id = %change.id,
            title = %candidate.title,
            "Candidate extracted"
        );
        Ok(candidate)
    }
}

/// Merchant category codes are exactly four ASCII digits.
fn is_known_category(code: &str) -> bool {
    code.len() == 4 && code.bytes().all(|b| b.is_ascii_digit())
}

fn parse_deadline(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// Pull an array of strings, tolerating numbers (MCCs often come back bare).
fn string_list(value: Option<&serde_json::Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    serde_json::Value::String(s) => {
                        let s = s.trim();
                        (!s.is_empty()).then(|| s.to_string())
                    }
                    serde_json::Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MemoryChangeStore, MockExtractor, make_test_change, make_test_source};
    use serde_json::json;

    fn full_payload() -> serde_json::Value {
        json!({
            "title": "Visa AFT Recipient Data Requirements",
            "summary": "New recipientDetails fields required for AFTs.",
            "deadline": "2026-03-31",
            "impact_level": "high",
            "mccs": ["6051", 6211, "not-a-code", "123"],
            "regions": ["MENA", "Global"],
            "transaction_types": ["AFT"],
            "technical_requirements": ["Add recipientDetails object"],
            "keywords": ["AFT", "Visa", "recipient data"]
        })
    }

    #[tokio::test]
    async fn success_marks_change_analyzed() {
        let changes = MemoryChangeStore::new();
        let change = changes.seed(make_test_change(false));
        let adapter = ExtractionAdapter::new(MockExtractor::new(full_payload()), changes.clone());

        let candidate = adapter
            .analyze(&change, &make_test_source())
            .await
            .unwrap();

        assert_eq!(candidate.title, "Visa AFT Recipient Data Requirements");
        assert_eq!(candidate.deadline, NaiveDate::from_ymd_opt(2026, 3, 31));
        assert_eq!(candidate.impact, Impact::High);
        // Out-of-space codes are dropped, numbers are accepted.
        assert_eq!(candidate.categories, vec!["6051", "6211"]);
        assert!(changes.is_analyzed(change.id));
    }

    #[tokio::test]
    async fn missing_title_discards_and_marks_analyzed() {
        let changes = MemoryChangeStore::new();
        let change = changes.seed(make_test_change(false));
        let adapter = ExtractionAdapter::new(
            MockExtractor::new(json!({"summary": "no title here"})),
            changes.clone(),
        );

        let err = adapter
            .analyze(&change, &make_test_source())
            .await
            .unwrap_err();

        assert!(matches!(err, MonitorError::Validation(_)));
        // Terminal discard: the same diff would fail again, so no retry.
        assert!(changes.is_analyzed(change.id));
    }

    #[tokio::test]
    async fn transport_failure_leaves_change_in_backlog() {
        let changes = MemoryChangeStore::new();
        let change = changes.seed(make_test_change(false));
        let adapter = ExtractionAdapter::new(
            MockExtractor::with_error(MonitorError::Timeout(120)),
            changes.clone(),
        );

        let err = adapter
            .analyze(&change, &make_test_source())
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert!(!changes.is_analyzed(change.id));
    }

    #[tokio::test]
    async fn unparseable_deadline_degrades_to_unknown() {
        let changes = MemoryChangeStore::new();
        let change = changes.seed(make_test_change(false));
        let adapter = ExtractionAdapter::new(
            MockExtractor::new(json!({
                "title": "Some Mandate",
                "deadline": "Q3 2026",
                "impact_level": "critical"
            })),
            changes.clone(),
        );

        let candidate = adapter
            .analyze(&change, &make_test_source())
            .await
            .unwrap();

        assert!(candidate.deadline.is_none());
        // Unknown impact strings fall back, they never discard.
        assert_eq!(candidate.impact, Impact::Medium);
    }

    #[tokio::test]
    async fn baseline_is_rejected() {
        let changes = MemoryChangeStore::new();
        let change = changes.seed(make_test_change(true));
        let adapter = ExtractionAdapter::new(MockExtractor::new(full_payload()), changes);

        let err = adapter
            .analyze(&change, &make_test_source())
            .await
            .unwrap_err();
        assert!(matches!(err, MonitorError::Validation(_)));
    }

    #[test]
    fn category_code_space() {
        assert!(is_known_category("6051"));
        assert!(!is_known_category("123"));
        assert!(!is_known_category("60511"));
        assert!(!is_known_category("60a1"));
    }
}
