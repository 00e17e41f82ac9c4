use regex::Regex;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::models::{Affiliation, Repository};

/// Directories never descended into. Bounds scan cost on large trees.
const SKIP_DIRS: &[&str] = &["node_modules", "vendor", ".cache"];

/// Walk the configured roots and produce one record per git working tree.
///
/// Every error along the way - an unreadable `.git/config`, an unwalkable
/// subdirectory - is per-item and non-fatal: the entry is skipped and the
/// scan continues.
#[must_use]
pub fn index_local_repos(roots: &[PathBuf]) -> Vec<Repository> {
    let mut repos = Vec::new();

    for root in roots {
        let mut walker = WalkDir::new(root).follow_links(false).into_iter();
        loop {
            let entry = match walker.next() {
                None => break,
                Some(Ok(entry)) => entry,
                Some(Err(_)) => continue,
            };

            if !entry.file_type().is_dir() {
                continue;
            }

            let dir_name = entry.file_name().to_string_lossy().to_string();

            if SKIP_DIRS.contains(&dir_name.as_str()) {
                walker.skip_current_dir();
                continue;
            }

            if dir_name == ".git" {
                // Parent is a working tree; never walk the git internals.
                if let Some(repo_root) = entry.path().parent() {
                    if let Some(repo) = repo_from_working_tree(repo_root) {
                        repos.push(repo);
                    }
                }
                walker.skip_current_dir();
            }
        }
    }

    repos
}

/// Build a record for a discovered working tree. An unreadable
/// `.git/config` skips the repository; a readable config without a
/// parseable GitHub origin still yields a local-only record.
fn repo_from_working_tree(repo_root: &Path) -> Option<Repository> {
    let dir_name = repo_root.file_name()?.to_string_lossy().to_string();
    let config = std::fs::read_to_string(repo_root.join(".git").join("config")).ok()?;
    let origin_url = extract_origin_url(&config);

    let mut repo = match origin_url.as_deref().and_then(parse_github_remote) {
        Some((owner, name)) => {
            let mut repo = Repository::new(&owner, &name, Affiliation::Local);
            // Affiliation stays `local` here; the merge promotes it when
            // the remote fetch reports the same identity.
            repo.ssh_url = origin_url.unwrap_or_default();
            repo
        }
        None => Repository::new("local", &dir_name, Affiliation::Local),
    };

    repo.local_path = repo_root.to_string_lossy().to_string();
    repo.exists_local = true;
    repo.refresh_search_text();
    Some(repo)
}

/// Extract the `url` key of the `[remote "origin"]` section, stopping at
/// the next section header.
fn extract_origin_url(content: &str) -> Option<String> {
    let mut in_origin = false;
    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            in_origin = line == "[remote \"origin\"]";
            continue;
        }
        if in_origin {
            if let Some(value) = line.strip_prefix("url") {
                let value = value.trim_start();
                if let Some(url) = value.strip_prefix('=') {
                    return Some(url.trim().to_string());
                }
            }
        }
    }
    None
}

/// Parse a GitHub identity out of an SSH or HTTPS remote URL.
fn parse_github_remote(url: &str) -> Option<(String, String)> {
    let ssh = Regex::new(r"^git@github\.com:([^/]+)/(.+?)(?:\.git)?$").ok()?;
    let https = Regex::new(r"^https://github\.com/([^/]+)/(.+?)(?:\.git)?/?$").ok()?;

    let caps = ssh.captures(url).or_else(|| https.captures(url))?;
    Some((caps[1].to_string(), caps[2].to_string()))
}
