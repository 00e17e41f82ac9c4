use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::models::Repository;

/// Sync-state timestamps for the on-disk cache. Absent fields mean the
/// corresponding refresh has never run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheMetadata {
    #[serde(rename = "lastRemoteSync", skip_serializing_if = "Option::is_none")]
    pub last_remote_sync: Option<DateTime<Utc>>,
    #[serde(rename = "lastLocalScan", skip_serializing_if = "Option::is_none")]
    pub last_local_scan: Option<DateTime<Utc>>,
}

/// Cache directory, honoring `FUZZYREPO_CACHE_DIR` for tests.
#[must_use]
pub fn cache_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("FUZZYREPO_CACHE_DIR") {
        return PathBuf::from(dir);
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fuzzyrepo")
}

#[must_use]
pub fn repos_path() -> PathBuf {
    cache_dir().join("repos.json")
}

#[must_use]
pub fn metadata_path() -> PathBuf {
    cache_dir().join("metadata.json")
}

#[must_use]
pub fn usage_path() -> PathBuf {
    cache_dir().join("usage.json")
}

/// Write `contents` to `path` atomically: full write to a sibling `.tmp`
/// file, then rename over the destination. A reader never observes a
/// partial file, and a crash mid-write leaves the previous version intact.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, contents)
        .with_context(|| format!("Failed to write temp file: {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))
}

/// Load the cached repository list. A missing file is the bootstrap case
/// and yields an empty list; an unparseable file is a real error and is
/// surfaced so the caller can decide the fallback.
pub fn load_repos() -> Result<Vec<Repository>> {
    load_repos_from(&repos_path())
}

pub fn load_repos_from(path: &Path) -> Result<Vec<Repository>> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("Failed to read cache: {}", path.display()))
        }
    };

    let mut repos: Vec<Repository> = serde_json::from_str(&data)
        .with_context(|| format!("Corrupt repository cache: {}", path.display()))?;
    for repo in &mut repos {
        repo.refresh_search_text();
    }
    Ok(repos)
}

pub fn save_repos(repos: &[Repository]) -> Result<()> {
    save_repos_to(&repos_path(), repos)
}

pub fn save_repos_to(path: &Path, repos: &[Repository]) -> Result<()> {
    let json = serde_json::to_string_pretty(repos).context("Failed to serialize repositories")?;
    write_atomic(path, json.as_bytes())
}

pub fn load_metadata() -> Result<CacheMetadata> {
    load_metadata_from(&metadata_path())
}

pub fn load_metadata_from(path: &Path) -> Result<CacheMetadata> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(CacheMetadata::default())
        }
        Err(err) => {
            return Err(err).with_context(|| format!("Failed to read metadata: {}", path.display()))
        }
    };

    serde_json::from_str(&data)
        .with_context(|| format!("Corrupt cache metadata: {}", path.display()))
}

pub fn save_metadata(meta: &CacheMetadata) -> Result<()> {
    save_metadata_to(&metadata_path(), meta)
}

pub fn save_metadata_to(path: &Path, meta: &CacheMetadata) -> Result<()> {
    let json = serde_json::to_string_pretty(meta).context("Failed to serialize metadata")?;
    write_atomic(path, json.as_bytes())
}

/// Modification time of the cache file; `None` if it does not exist yet.
/// The interactive session polls this to observe the detached sync.
#[must_use]
pub fn repos_mtime() -> Option<SystemTime> {
    std::fs::metadata(repos_path())
        .and_then(|meta| meta.modified())
        .ok()
}
