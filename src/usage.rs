use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::cache;
use crate::models::Repository;

/// Per-repository selection history, keyed by the case-insensitive
/// identity key.
pub type UsageData = HashMap<String, UsageEntry>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEntry {
    pub count: u64,
    #[serde(rename = "lastUsedAt")]
    pub last_used_at: DateTime<Utc>,
}

pub fn load_usage() -> Result<UsageData> {
    load_usage_from(&cache::usage_path())
}

pub fn load_usage_from(path: &Path) -> Result<UsageData> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(UsageData::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("Failed to read usage: {}", path.display()))
        }
    };

    serde_json::from_str(&data)
        .with_context(|| format!("Corrupt usage history: {}", path.display()))
}

pub fn save_usage(usage: &UsageData) -> Result<()> {
    save_usage_to(&cache::usage_path(), usage)
}

pub fn save_usage_to(path: &Path, usage: &UsageData) -> Result<()> {
    let json = serde_json::to_string_pretty(usage).context("Failed to serialize usage")?;
    cache::write_atomic(path, json.as_bytes())
}

/// Record a selection: bump the count and stamp the time, write-through
/// to disk so concurrent instances see it on their next load.
pub fn record_usage(usage: &mut UsageData, repo: &Repository) -> Result<()> {
    let entry = usage.entry(repo.key()).or_insert(UsageEntry {
        count: 0,
        last_used_at: Utc::now(),
    });
    entry.count += 1;
    entry.last_used_at = Utc::now();
    save_usage(usage)
}

/// Relevance boost from selection history.
///
/// Frequency contributes logarithmically (each doubling of the count is
/// worth the same increment) and recency decays with a one-week
/// half-life. Repositories never selected score zero.
#[must_use]
pub fn boost(usage: &UsageData, repo: &Repository, now: DateTime<Utc>) -> f64 {
    let Some(entry) = usage.get(&repo.key()) else {
        return 0.0;
    };

    let frequency = 1.5 * (1.0 + entry.count as f64).log2();

    let elapsed = now.signed_duration_since(entry.last_used_at);
    let days = (elapsed.num_seconds().max(0) as f64) / 86_400.0;
    let recency = 2.0 * 0.5_f64.powf(days / 7.0);

    frequency + recency
}

/// Order repositories by usage boost, most relevant first. Stable, so
/// unselected repositories keep their incoming relative order.
pub fn sort_by_usage(repos: &mut [Repository], usage: &UsageData) {
    let now = Utc::now();
    repos.sort_by(|a, b| boost(usage, b, now).total_cmp(&boost(usage, a, now)));
}
