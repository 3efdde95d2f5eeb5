//! Relevance scoring of candidate records against a caller profile.
//!
//! Total function: absent or empty fields contribute zero, there is no
//! error path. Deterministic and order-independent so the same candidate
//! and profile always produce the same score.

use std::collections::HashSet;

use crate::models::{CandidateRecord, Impact, Profile};

const BASE_SCORE: u8 = 5;
const MAX_SCORE: u8 = 10;
const MIN_SCORE: u8 = 1;
const KEYWORD_MATCH_THRESHOLD: usize = 3;

/// Score a candidate's fit against the profile, clamped to [1, 10].
///
/// Base 5, +3 for any category intersection, +2 for a region match (or a
/// candidate tagged "Global"), +1 for three or more keyword matches, +1
/// for high impact.
pub fn relevance(candidate: &CandidateRecord, profile: &Profile) -> u8 {
    let mut score = BASE_SCORE;

    let profile_categories: HashSet<&str> =
        profile.categories.iter().map(String::as_str).collect();
    if candidate
        .categories
        .iter()
        .any(|c| profile_categories.contains(c.as_str()))
    {
        score += 3;
    }

    let profile_regions: HashSet<String> = profile
        .regions
        .iter()
        .map(|r| r.to_uppercase())
        .collect();
    let candidate_regions: Vec<String> = candidate
        .regions
        .iter()
        .map(|r| r.to_uppercase())
        .collect();
    if candidate_regions
        .iter()
        .any(|r| r == "GLOBAL" || profile_regions.contains(r))
    {
        score += 2;
    }

    let profile_keywords: HashSet<String> = profile
        .keywords
        .iter()
        .map(|k| k.to_lowercase())
        .collect();
    let keyword_matches = candidate
        .keywords
        .iter()
        .map(|k| k.to_lowercase())
        .collect::<HashSet<_>>()
        .intersection(&profile_keywords)
        .count();
    if keyword_matches >= KEYWORD_MATCH_THRESHOLD {
        score += 1;
    }

    if candidate.impact == Impact::High {
        score += 1;
    }

    score.clamp(MIN_SCORE, MAX_SCORE)
}
