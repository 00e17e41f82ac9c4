use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::cache::{self, CacheMetadata};
use crate::config::Config;
use crate::github::{fetch_remote_repos, GhCliLister};
use crate::models::Repository;
use crate::reconcile;
use crate::scan;

/// How often the remote listing is considered stale.
pub const REMOTE_SYNC_INTERVAL_DAYS: i64 = 7;
/// How often the local filesystem scan is considered stale.
pub const LOCAL_SCAN_INTERVAL_HOURS: i64 = 24;

#[must_use]
pub fn lock_path() -> PathBuf {
    cache::cache_dir().join("sync.lock")
}

/// True when another process holds a live sync lock. A lock naming a
/// dead process, or one that cannot be parsed, is stale and is removed
/// here so an earlier crash never blocks syncing forever.
#[must_use]
pub fn is_sync_running() -> bool {
    let path = lock_path();
    let Ok(contents) = std::fs::read_to_string(&path) else {
        return false;
    };

    let alive = contents
        .trim()
        .parse::<i32>()
        .is_ok_and(|pid| pid > 0 && pid_is_alive(pid));
    if !alive {
        let _ = std::fs::remove_file(&path);
    }
    alive
}

/// Probe a PID with signal 0. EPERM means the process exists but belongs
/// to someone else, which still counts as alive.
#[cfg(unix)]
fn pid_is_alive(pid: i32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn pid_is_alive(_pid: i32) -> bool {
    // No cheap liveness probe; err on the side of respecting the lock.
    true
}

/// Take the sync lock by writing our PID. Returns false if a live sync
/// already holds it.
pub fn acquire_sync_lock() -> Result<bool> {
    if is_sync_running() {
        return Ok(false);
    }
    cache::write_atomic(&lock_path(), std::process::id().to_string().as_bytes())
        .context("Failed to write sync lock")?;
    Ok(true)
}

pub fn release_sync_lock() {
    let _ = std::fs::remove_file(lock_path());
}

/// A remote sync is due when the cache is empty or the last one is older
/// than the interval.
#[must_use]
pub fn is_remote_sync_due(meta: &CacheMetadata, cache_empty: bool) -> bool {
    if cache_empty {
        return true;
    }
    match meta.last_remote_sync {
        None => true,
        Some(last) => Utc::now() - last > Duration::days(REMOTE_SYNC_INTERVAL_DAYS),
    }
}

#[must_use]
pub fn is_local_scan_due(meta: &CacheMetadata) -> bool {
    match meta.last_local_scan {
        None => true,
        Some(last) => Utc::now() - last > Duration::hours(LOCAL_SCAN_INTERVAL_HOURS),
    }
}

/// Re-exec ourselves in sync mode, fully detached: no inherited stdio,
/// own process group, not waited on. The interactive session observes the
/// result through the cache file's mtime.
pub fn spawn_detached_sync() -> Result<()> {
    let exe = std::env::current_exe().context("Failed to resolve current executable")?;

    let mut cmd = Command::new(exe);
    cmd.arg("--sync-remote")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    cmd.spawn().context("Failed to spawn background sync")?;
    Ok(())
}

/// Full remote refresh: fetch the configured affiliation classes, rescan
/// the local roots, merge, and persist. Returns the repository count, or
/// an error without touching the cache if any step fails. Timestamps are
/// advanced only after the cache write lands, so a failed run stays due.
pub fn run_remote_sync(config: &Config) -> Result<usize> {
    if !acquire_sync_lock()? {
        anyhow::bail!("Another sync is already running");
    }
    let result = remote_sync_locked(config);
    release_sync_lock();
    result
}

fn remote_sync_locked(config: &Config) -> Result<usize> {
    let remote = fetch_remote_repos(&GhCliLister, config)?;
    let local = scan::index_local_repos(&config.repo_roots);
    let merged = reconcile::merge(&local, &remote);

    cache::save_repos(&merged)?;

    let now = Utc::now();
    let mut meta = cache::load_metadata().unwrap_or_default();
    meta.last_remote_sync = Some(now);
    meta.last_local_scan = Some(now);
    cache::save_metadata(&meta)?;

    Ok(merged.len())
}

/// Local-only refresh against the existing cache. Remote entries are
/// untouched apart from local enrichment; only the scan timestamp moves.
pub fn run_local_scan(config: &Config, existing: &[Repository]) -> Result<Vec<Repository>> {
    let local = scan::index_local_repos(&config.repo_roots);
    let merged = reconcile::merge(&local, existing);

    cache::save_repos(&merged)?;

    let mut meta = cache::load_metadata().unwrap_or_default();
    meta.last_local_scan = Some(Utc::now());
    cache::save_metadata(&meta)?;

    Ok(merged)
}
