use chrono::Utc;
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;

use crate::models::Repository;
use crate::usage::{self, UsageData};

/// Usage weight relative to fuzzy score. Fuzzy scores land in the
/// hundreds, boosts in single digits; this keeps a frequently used repo
/// competitive without letting history drown out a clearly better match.
const BOOST_WEIGHT: f64 = 50.0;

/// Rank repositories against a query.
///
/// An empty query lists everything in usage order. Otherwise each
/// repository's derived search text is fuzzy-matched; non-matches are
/// dropped, and matches are ordered by fuzzy score plus weighted usage
/// boost, best first. The sort is stable, so equal-scoring repositories
/// keep their cache order.
#[must_use]
pub fn rank(repos: &[Repository], query: &str, usage: &UsageData) -> Vec<Repository> {
    if query.trim().is_empty() {
        let mut all = repos.to_vec();
        usage::sort_by_usage(&mut all, usage);
        return all;
    }

    let matcher = SkimMatcherV2::default();
    let needle = query.to_lowercase();
    let now = Utc::now();

    let mut scored: Vec<(f64, Repository)> = repos
        .iter()
        .filter_map(|repo| {
            let fuzzy = matcher.fuzzy_match(&repo.search_text, &needle)?;
            let combined = fuzzy as f64 + usage::boost(usage, repo, now) * BOOST_WEIGHT;
            Some((combined, repo.clone()))
        })
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.into_iter().map(|(_, repo)| repo).collect()
}
