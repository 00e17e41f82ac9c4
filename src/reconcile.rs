use std::collections::{HashMap, HashSet};

use crate::models::Repository;

/// Merge locally scanned repositories into a base set (a fresh remote
/// fetch, or the existing cache for local-only passes).
///
/// The merge is asymmetric by design: base records are seeded verbatim and
/// a matching local record only contributes `local_path` and
/// `exists_local`. Remote-sourced fields (`owner`, `affiliation`,
/// `ssh_url`) are authoritative, so a repository visible on GitHub is
/// never demoted to a `local` affiliation just because it is also cloned.
/// Local records with no base counterpart are inserted as-is.
///
/// Result order is unspecified; callers needing determinism sort.
#[must_use]
pub fn merge(local: &[Repository], base: &[Repository]) -> Vec<Repository> {
    let mut entries: HashMap<String, Repository> = HashMap::new();

    for repo in base {
        entries.insert(repo.key(), repo.clone());
    }

    for repo in local {
        match entries.get_mut(&repo.key()) {
            Some(existing) => enrich_with_local(existing, repo),
            None => {
                entries.insert(repo.key(), repo.clone());
            }
        }
    }

    entries.into_values().collect()
}

fn enrich_with_local(existing: &mut Repository, local: &Repository) {
    existing.local_path = local.local_path.clone();
    existing.exists_local = true;
    existing.refresh_search_text();
}

/// Streaming variant of the merge for the interactive refresh path.
///
/// Seeded with the existing cache and the local scan, then fed remote
/// batches as pages arrive; each batch yields a full snapshot for display.
/// `finish` prunes entries the remote stream never confirmed - renamed,
/// deleted, or access-revoked repositories - while never evicting
/// anything present on disk.
pub struct ProgressiveMerge {
    entries: HashMap<String, Repository>,
    local_keys: HashSet<String>,
    remote_seen: HashSet<String>,
}

impl ProgressiveMerge {
    #[must_use]
    pub fn new(existing_cache: &[Repository], local: &[Repository]) -> Self {
        let mut merger = Self {
            entries: HashMap::new(),
            local_keys: local.iter().map(Repository::key).collect(),
            remote_seen: HashSet::new(),
        };

        for repo in existing_cache {
            merger.entries.insert(repo.key(), repo.clone());
        }
        for repo in local {
            match merger.entries.get_mut(&repo.key()) {
                Some(existing) => enrich_with_local(existing, repo),
                None => {
                    merger.entries.insert(repo.key(), repo.clone());
                }
            }
        }

        merger
    }

    /// Merge one remote batch and return the current full snapshot.
    pub fn apply_batch(&mut self, batch: Vec<Repository>) -> Vec<Repository> {
        for mut repo in batch {
            let key = repo.key();
            if let Some(existing) = self.entries.get(&key) {
                if existing.exists_local {
                    repo.local_path = existing.local_path.clone();
                    repo.exists_local = true;
                }
            }
            repo.refresh_search_text();
            self.remote_seen.insert(key.clone());
            self.entries.insert(key, repo);
        }
        self.snapshot()
    }

    /// Evict entries neither confirmed remotely nor present locally.
    #[must_use]
    pub fn finish(mut self) -> Vec<Repository> {
        self.entries
            .retain(|key, _| self.remote_seen.contains(key) || self.local_keys.contains(key));
        self.entries.into_values().collect()
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<Repository> {
        self.entries.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Affiliation;

    fn remote(owner: &str, name: &str, affiliation: Affiliation) -> Repository {
        let mut repo = Repository::new(owner, name, affiliation);
        repo.ssh_url = format!("git@github.com:{owner}/{name}.git");
        repo
    }

    fn local(owner: &str, name: &str, path: &str) -> Repository {
        let mut repo = Repository::new(owner, name, Affiliation::Local);
        repo.local_path = path.to_string();
        repo.exists_local = true;
        repo
    }

    fn sorted(mut repos: Vec<Repository>) -> Vec<Repository> {
        repos.sort_by_key(Repository::key);
        repos
    }

    #[test]
    fn local_enriches_but_never_overwrites_remote_fields() {
        let remote_set = vec![remote("acme", "widget", Affiliation::Owner)];
        let local_set = vec![local("acme", "widget", "/x")];

        let merged = merge(&local_set, &remote_set);
        assert_eq!(merged.len(), 1);
        let repo = &merged[0];
        assert_eq!(repo.owner, "acme");
        assert_eq!(repo.affiliation, Affiliation::Owner);
        assert_eq!(repo.ssh_url, "git@github.com:acme/widget.git");
        assert!(repo.exists_local);
        assert_eq!(repo.local_path, "/x");
    }

    #[test]
    fn local_only_repo_is_inserted_unchanged() {
        let remote_set = vec![remote("acme", "widget", Affiliation::Owner)];
        let local_set = vec![local("local", "scratch", "/home/u/scratch")];

        let merged = merge(&local_set, &remote_set);
        assert_eq!(merged.len(), 2);
        let scratch = merged.iter().find(|r| r.name == "scratch").unwrap();
        assert_eq!(scratch.affiliation, Affiliation::Local);
        assert!(scratch.exists_local);
    }

    #[test]
    fn identity_match_is_case_insensitive() {
        let remote_set = vec![remote("Acme", "Widget", Affiliation::Owner)];
        let local_set = vec![local("acme", "widget", "/x")];

        let merged = merge(&local_set, &remote_set);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].owner, "Acme");
        assert!(merged[0].exists_local);
    }

    #[test]
    fn merge_is_idempotent() {
        let remote_set = vec![
            remote("acme", "widget", Affiliation::Owner),
            remote("acme", "other", Affiliation::Collaborator),
        ];
        let local_set = vec![
            local("acme", "widget", "/x"),
            local("local", "scratch", "/s"),
        ];

        let once = merge(&local_set, &remote_set);
        let twice = merge(&local_set, &once);
        assert_eq!(sorted(once), sorted(twice));
    }

    #[test]
    fn end_to_end_scenario() {
        // Local root with one clone of acme/widget; remote fetch reports
        // acme/widget and acme/other under the owner affiliation.
        let local_set = vec![local("acme", "widget", "/home/u/code/widget")];
        let remote_set = vec![
            remote("acme", "widget", Affiliation::Owner),
            remote("acme", "other", Affiliation::Owner),
        ];

        let merged = sorted(merge(&local_set, &remote_set));
        assert_eq!(merged.len(), 2);

        let other = &merged[0];
        assert_eq!(other.full_name, "acme/other");
        assert!(!other.exists_local);
        assert_eq!(other.affiliation, Affiliation::Owner);

        let widget = &merged[1];
        assert_eq!(widget.full_name, "acme/widget");
        assert!(widget.exists_local);
        assert_eq!(widget.local_path, "/home/u/code/widget");
        assert_eq!(widget.affiliation, Affiliation::Owner);
    }

    #[test]
    fn progressive_eviction_drops_unconfirmed_remote_entries() {
        let cache = vec![
            remote("acme", "gone", Affiliation::Owner),
            remote("acme", "kept", Affiliation::Owner),
        ];
        let local_set = vec![local("local", "scratch", "/s")];

        let mut merger = ProgressiveMerge::new(&cache, &local_set);
        merger.apply_batch(vec![remote("acme", "kept", Affiliation::Owner)]);

        let final_set = sorted(merger.finish());
        let keys: Vec<String> = final_set.iter().map(Repository::key).collect();
        assert_eq!(keys, vec!["acme/kept", "local/scratch"]);
    }

    #[test]
    fn progressive_never_evicts_locally_present_repos() {
        let cache = vec![remote("acme", "archived", Affiliation::Owner)];
        // Still cloned on disk even though the remote no longer lists it.
        let local_set = vec![local("acme", "archived", "/home/u/archived")];

        let mut merger = ProgressiveMerge::new(&cache, &local_set);
        merger.apply_batch(vec![remote("acme", "unrelated", Affiliation::Owner)]);

        let final_set = merger.finish();
        assert!(final_set.iter().any(|r| r.name == "archived"));
    }

    #[test]
    fn progressive_batches_preserve_local_enrichment() {
        let cache = Vec::new();
        let local_set = vec![local("acme", "widget", "/x")];

        let mut merger = ProgressiveMerge::new(&cache, &local_set);
        let snapshot = merger.apply_batch(vec![remote("acme", "widget", Affiliation::Owner)]);

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].affiliation, Affiliation::Owner);
        assert!(snapshot[0].exists_local);
        assert_eq!(snapshot[0].local_path, "/x");
    }

    #[test]
    fn progressive_interim_snapshots_keep_stale_cache_until_finish() {
        let cache = vec![remote("acme", "maybe-gone", Affiliation::Owner)];
        let mut merger = ProgressiveMerge::new(&cache, &[]);

        // Mid-stream the entry is still visible; only finish() evicts.
        let snapshot = merger.apply_batch(vec![remote("acme", "new", Affiliation::Owner)]);
        assert_eq!(snapshot.len(), 2);

        let final_set = merger.finish();
        assert_eq!(final_set.len(), 1);
        assert_eq!(final_set[0].name, "new");
    }
}
