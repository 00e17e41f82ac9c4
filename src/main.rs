use anyhow::Result;
use clap::Parser;

use fuzzyrepo::interactive::{self, Session, SessionOptions};
use fuzzyrepo::{cache, config, sync, ui, usage};

#[derive(Parser)]
#[command(
    name = "fuzzyrepo",
    version,
    about = "Fuzzy-find GitHub and local repositories, then act on them"
)]
struct Cli {
    /// Internal: run one remote sync and exit. Spawned detached by the
    /// interactive session; not part of the user-facing surface.
    #[arg(long = "sync-remote", hide = true)]
    sync_remote: bool,
}

fn main() {
    let cli = Cli::parse();

    let result = if cli.sync_remote {
        run_sync_mode()
    } else {
        run_interactive_mode()
    };

    if let Err(err) = result {
        ui::print_error(&format!("Error: {err:#}"));
        std::process::exit(1);
    }
}

fn run_sync_mode() -> Result<()> {
    let config = config::Config::load()?;
    let count = sync::run_remote_sync(&config)?;
    println!("Synced {count} repositories");
    Ok(())
}

fn run_interactive_mode() -> Result<()> {
    let first_run = config::is_first_run();
    let config = config::Config::load()?;

    // A corrupt cache degrades to an empty one; a sync rebuilds it.
    let repos = match cache::load_repos() {
        Ok(repos) => repos,
        Err(err) => {
            ui::print_warning(&format!("{err:#}; starting with an empty list"));
            Vec::new()
        }
    };
    let meta = cache::load_metadata().unwrap_or_default();
    let usage_data = match usage::load_usage() {
        Ok(data) => data,
        Err(err) => {
            ui::print_warning(&format!("{err:#}; ignoring usage history"));
            usage::UsageData::new()
        }
    };

    // Local scan is cheap enough to run inline before the first prompt.
    let repos = if sync::is_local_scan_due(&meta) && !config.repo_roots.is_empty() {
        sync::run_local_scan(&config, &repos).unwrap_or(repos)
    } else {
        repos
    };

    // The remote fetch is not cheap; hand it to a detached process and
    // let the cache watcher pick up the result. First run waits for the
    // config edit instead.
    if !first_run
        && sync::is_remote_sync_due(&meta, repos.is_empty())
        && !sync::is_sync_running()
    {
        if let Err(err) = sync::spawn_detached_sync() {
            ui::print_warning(&format!("Could not start background sync: {err:#}"));
        }
    }

    let mut usage_data = usage_data;
    let mut session = Session::new(repos, usage_data.clone(), config);
    let options = SessionOptions {
        first_run,
        ..SessionOptions::default()
    };

    let Some(outcome) = interactive::run(&mut session, &options)? else {
        return Ok(());
    };

    interactive::perform(&outcome, session.config())?;

    if let Err(err) = usage::record_usage(&mut usage_data, &outcome.repo) {
        ui::print_warning(&format!("Could not record usage: {err:#}"));
    }
    Ok(())
}
