//! End-to-end flows across scan, merge, persistence, and search.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fuzzyrepo::config::Config;
use fuzzyrepo::models::{filter_repos, Affiliation, Repository};
use fuzzyrepo::usage::UsageData;
use fuzzyrepo::{cache, reconcile, scan, search};

/// Serializes tests that touch the `FUZZYREPO_*` environment overrides.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn make_local_repo(root: &Path, name: &str, origin: &str) -> PathBuf {
    let repo = root.join(name);
    let git_dir = repo.join(".git");
    fs::create_dir_all(&git_dir).unwrap();
    fs::write(
        git_dir.join("config"),
        format!("[remote \"origin\"]\n\turl = {origin}\n"),
    )
    .unwrap();
    repo
}

fn remote(owner: &str, name: &str, affiliation: Affiliation) -> Repository {
    let mut repo = Repository::new(owner, name, affiliation);
    repo.ssh_url = format!("git@github.com:{owner}/{name}.git");
    repo
}

#[test]
fn scan_merge_persist_reload_search() {
    let dir = tempfile::tempdir().unwrap();
    let code_root = dir.path().join("code");
    let widget_path = make_local_repo(&code_root, "widget", "git@github.com:acme/widget.git");
    make_local_repo(&code_root, "scratch", "git@gitlab.internal:me/scratch.git");

    // Scan picks up both working trees.
    let local = scan::index_local_repos(&[code_root]);
    assert_eq!(local.len(), 2);

    // Remote listing knows acme/widget and acme/other; merge enriches the
    // clone and inserts the rest.
    let remote_set = vec![
        remote("acme", "widget", Affiliation::Owner),
        remote("acme", "other", Affiliation::Owner),
    ];
    let merged = reconcile::merge(&local, &remote_set);
    assert_eq!(merged.len(), 3);

    let widget = merged.iter().find(|r| r.name == "widget").unwrap();
    assert_eq!(widget.affiliation, Affiliation::Owner);
    assert!(widget.exists_local);
    assert_eq!(widget.local_path, widget_path.to_string_lossy());

    // Persist and reload; derived search text comes back usable.
    let cache_path = dir.path().join("repos.json");
    cache::save_repos_to(&cache_path, &merged).unwrap();
    let reloaded = cache::load_repos_from(&cache_path).unwrap();
    assert_eq!(reloaded.len(), 3);
    assert!(reloaded.iter().all(|r| !r.search_text.is_empty()));

    // The reloaded set is searchable.
    let results = search::rank(&reloaded, "widget", &UsageData::new());
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].full_name, "acme/widget");
}

#[test]
fn display_filters_compose_with_search() {
    let repos = vec![
        remote("acme", "widget", Affiliation::Owner),
        remote("org", "widget-infra", Affiliation::OrganizationMember),
        Repository::new("local", "widget-notes", Affiliation::Local),
    ];

    let config = Config {
        show_org_member: false,
        ..Config::default()
    };
    let visible = filter_repos(&repos, &config);
    let results = search::rank(&visible, "widget", &UsageData::new());

    let names: Vec<&str> = results.iter().map(|r| r.full_name.as_str()).collect();
    assert!(names.contains(&"acme/widget"));
    assert!(names.contains(&"local/widget-notes"));
    assert!(!names.contains(&"org/widget-infra"));
}

#[test]
fn repeated_local_scans_never_drop_remote_entries() {
    let dir = tempfile::tempdir().unwrap();
    let code_root = dir.path().join("code");
    make_local_repo(&code_root, "widget", "git@github.com:acme/widget.git");

    let remote_set = vec![
        remote("acme", "widget", Affiliation::Owner),
        remote("acme", "uncloned", Affiliation::Collaborator),
    ];

    // Initial full sync, then two local-only passes against the result.
    let mut current = reconcile::merge(&scan::index_local_repos(&[code_root.clone()]), &remote_set);
    for _ in 0..2 {
        current = reconcile::merge(&scan::index_local_repos(&[code_root.clone()]), &current);
    }

    assert_eq!(current.len(), 2);
    let uncloned = current.iter().find(|r| r.name == "uncloned").unwrap();
    assert_eq!(uncloned.affiliation, Affiliation::Collaborator);
    assert!(!uncloned.exists_local);
}

#[test]
fn cache_dir_env_override_routes_all_cache_files() {
    let _guard = ENV_LOCK.lock().unwrap();
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("FUZZYREPO_CACHE_DIR", dir.path());

    let repos = vec![remote("acme", "widget", Affiliation::Owner)];
    cache::save_repos(&repos).unwrap();
    assert!(dir.path().join("repos.json").exists());
    assert!(cache::repos_mtime().is_some());

    let loaded = cache::load_repos().unwrap();
    assert_eq!(loaded.len(), 1);

    std::env::remove_var("FUZZYREPO_CACHE_DIR");
}

#[test]
fn config_env_override_and_round_trip() {
    let _guard = ENV_LOCK.lock().unwrap();
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("FUZZYREPO_CONFIG_DIR", dir.path());

    assert!(fuzzyrepo::config::is_first_run());

    let config = Config {
        repo_roots: vec![dir.path().to_path_buf()],
        ..Config::default()
    };
    config.save().unwrap();

    assert!(!fuzzyrepo::config::is_first_run());
    let loaded = Config::load().unwrap();
    assert_eq!(loaded.repo_roots, config.repo_roots);

    std::env::remove_var("FUZZYREPO_CONFIG_DIR");
}

#[test]
fn failed_cache_write_does_not_advance_metadata() {
    let _guard = ENV_LOCK.lock().unwrap();
    let dir = tempfile::tempdir().unwrap();

    // A regular file where the cache directory should be makes every
    // cache write fail.
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "").unwrap();
    std::env::set_var("FUZZYREPO_CACHE_DIR", blocker.join("cache"));

    let config = Config::default();
    assert!(fuzzyrepo::sync::run_local_scan(&config, &[]).is_err());

    std::env::set_var("FUZZYREPO_CACHE_DIR", dir.path());
    let meta = cache::load_metadata().unwrap();
    assert!(meta.last_local_scan.is_none());

    std::env::remove_var("FUZZYREPO_CACHE_DIR");
}

#[test]
fn remote_rename_is_picked_up_by_full_merge_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let code_root = dir.path().join("code");
    make_local_repo(&code_root, "widget", "git@github.com:acme/widget.git");

    let local = scan::index_local_repos(&[code_root]);
    let before = vec![remote("acme", "widget", Affiliation::Owner)];
    let cached = reconcile::merge(&local, &before);

    // The repository was renamed upstream. A streaming refresh confirms
    // only the new name; the old identity survives solely because the
    // clone still exists on disk.
    let mut merger = reconcile::ProgressiveMerge::new(&cached, &local);
    merger.apply_batch(vec![remote("acme", "widget-ng", Affiliation::Owner)]);
    let after = merger.finish();

    let mut names: Vec<&str> = after.iter().map(|r| r.full_name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["acme/widget", "acme/widget-ng"]);
}
