use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::process::Command;

use crate::config::Config;
use crate::models::{Affiliation, Repository};

pub const DEFAULT_PER_PAGE: usize = 100;

/// One page of a repository listing. `next_page` is `None` on the last
/// page of the affiliation class.
pub struct RepoPage {
    pub repos: Vec<Repository>,
    pub next_page: Option<u32>,
}

/// Source of remote repository listings. The production implementation
/// shells out to the GitHub CLI; tests substitute an in-memory fake.
pub trait RepoLister {
    fn list_page(&self, affiliation: Affiliation, page: u32, per_page: usize) -> Result<RepoPage>;
}

/// Fetch all configured affiliation classes, page by page.
///
/// Classes are fetched in fixed priority order (owner, then collaborator,
/// then organization member) regardless of how the config string orders
/// them, so that a repository reachable through several classes always
/// lands under the strongest one: the first occurrence of an identity key
/// wins and later duplicates are dropped. Organization-member results are
/// filtered through the org allowlist. Any page failure aborts the whole
/// fetch; a partial listing must never reach the cache, or the eviction
/// pass would drop repositories that still exist.
pub fn fetch_remote_repos(lister: &dyn RepoLister, config: &Config) -> Result<Vec<Repository>> {
    let mut classes = config.affiliations()?;
    classes.sort_by_key(|a| a.priority());

    let allowlist = config.org_allowlist();

    let mut seen: HashSet<String> = HashSet::new();
    let mut repos = Vec::new();

    for affiliation in classes {
        let mut page = 1;
        loop {
            let listing = lister
                .list_page(affiliation, page, DEFAULT_PER_PAGE)
                .with_context(|| {
                    format!(
                        "Failed to list {} repositories (page {page})",
                        affiliation.as_str()
                    )
                })?;

            for repo in listing.repos {
                if affiliation == Affiliation::OrganizationMember
                    && !allowlist.is_empty()
                    && !allowlist.contains(&repo.owner.to_lowercase())
                {
                    continue;
                }
                if seen.insert(repo.key()) {
                    repos.push(repo);
                }
            }

            match listing.next_page {
                Some(next) => page = next,
                None => break,
            }
        }
    }

    Ok(repos)
}

#[derive(Deserialize)]
struct ApiRepo {
    name: String,
    owner: ApiOwner,
    #[serde(default)]
    ssh_url: String,
}

#[derive(Deserialize)]
struct ApiOwner {
    login: String,
}

/// Lists repositories through `gh api`, which handles authentication and
/// token refresh. Requires the GitHub CLI on PATH and an authenticated
/// session (`gh auth login`).
pub struct GhCliLister;

impl RepoLister for GhCliLister {
    fn list_page(&self, affiliation: Affiliation, page: u32, per_page: usize) -> Result<RepoPage> {
        let endpoint = format!(
            "user/repos?affiliation={}&per_page={per_page}&page={page}",
            affiliation.as_str()
        );

        let output = Command::new("gh")
            .args(["api", &endpoint])
            .output()
            .context("Failed to execute 'gh api' - is GitHub CLI installed?")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("auth") || stderr.contains("401") {
                anyhow::bail!("GitHub CLI is not authenticated. Run: gh auth login");
            }
            anyhow::bail!("GitHub API request failed: {}", stderr.trim());
        }

        let api_repos: Vec<ApiRepo> = serde_json::from_slice(&output.stdout)
            .context("Failed to parse GitHub API response")?;

        let full = api_repos.len() == per_page;
        let repos = api_repos
            .into_iter()
            .map(|r| {
                let mut repo = Repository::new(&r.owner.login, &r.name, affiliation);
                repo.ssh_url = r.ssh_url;
                repo
            })
            .collect();

        Ok(RepoPage {
            repos,
            next_page: if full { Some(page + 1) } else { None },
        })
    }
}
