use anyhow::{Context, Result};
use std::io::{BufRead, Write};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::thread;
use std::time::Duration;

use crate::config::{self, Config};
use crate::models::{self, Repository};
use crate::search;
use crate::sync;
use crate::ui::{self, Colors};
use crate::usage::UsageData;
use crate::{actions, cache};

/// How many results are rendered per prompt.
const DISPLAY_LIMIT: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Browsing,
    CommandPalette,
    EditingConfig,
}

/// What to do with the selected repository. Returned to the caller so
/// usage recording and process handoff happen outside the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Open,
    CopyPath,
    Browse,
    PullRequests,
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub repo: Repository,
    pub action: Action,
}

pub struct SessionOptions {
    /// Cadence of the cache-file mtime poll.
    pub poll_interval: Duration,
    /// First launch: edit the config before anything else, then kick off
    /// the initial background sync.
    pub first_run: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            first_run: false,
        }
    }
}

/// Pure session state. Every transition is a plain method so the
/// query/filter/refresh interplay is testable without a terminal.
pub struct Session {
    cache: Vec<Repository>,
    visible: Vec<Repository>,
    results: Vec<Repository>,
    query: String,
    usage: UsageData,
    config: Config,
    mode: Mode,
    message: Option<String>,
}

impl Session {
    #[must_use]
    pub fn new(cache: Vec<Repository>, usage: UsageData, config: Config) -> Self {
        let mut session = Self {
            cache,
            visible: Vec::new(),
            results: Vec::new(),
            query: String::new(),
            usage,
            config,
            mode: Mode::Browsing,
            message: None,
        };
        session.refilter();
        session
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    #[must_use]
    pub fn results(&self) -> &[Repository] {
        &self.results
    }

    pub fn take_message(&mut self) -> Option<String> {
        self.message.take()
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    /// Update the query and re-rank the visible set.
    pub fn set_query(&mut self, query: &str) {
        self.query = query.to_string();
        self.apply_search();
    }

    fn apply_search(&mut self) {
        self.results = search::rank(&self.visible, &self.query, &self.usage);
    }

    /// Swap in a refreshed cache. The query survives; results re-rank
    /// against the new set.
    pub fn replace_cache(&mut self, repos: Vec<Repository>) {
        self.cache = repos;
        self.refilter();
    }

    /// Swap in an edited config: display filters change immediately.
    pub fn apply_config(&mut self, config: Config) {
        self.config = config;
        self.refilter();
    }

    fn refilter(&mut self) {
        self.visible = models::filter_repos(&self.cache, &self.config);
        self.apply_search();
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn select(&self, index: usize) -> Option<&Repository> {
        self.results.get(index)
    }
}

/// Messages from the worker and watcher threads to the main loop.
enum Event {
    /// The cache file changed on disk (a detached sync landed).
    CacheReloaded(Vec<Repository>),
    /// An in-session refresh finished.
    RefreshDone(Result<Vec<Repository>>),
}

/// Run the interactive loop until the user picks a repository and action,
/// or quits. Returns `None` on quit. The session is left in its final
/// state so the caller can read the possibly-edited config.
pub fn run(session: &mut Session, options: &SessionOptions) -> Result<Option<Outcome>> {
    let (event_tx, event_rx) = mpsc::channel::<Event>();

    // Refresh requests are bounded at one: a second request while one is
    // in flight is dropped rather than queued.
    let (refresh_tx, refresh_rx) = mpsc::sync_channel::<Config>(1);
    spawn_refresh_worker(refresh_rx, event_tx.clone());
    spawn_cache_watcher(options.poll_interval, event_tx);

    if options.first_run {
        first_run_setup(session)?;
    }

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        drain_events(session, &event_rx);
        render(session);

        let Some(line) = lines.next() else {
            return Ok(None);
        };
        let line = line.context("Failed to read input")?;
        let input = line.trim();

        let step = match session.mode() {
            Mode::Browsing => handle_browsing(session, input)?,
            Mode::CommandPalette => handle_palette(session, input, &refresh_tx),
            Mode::EditingConfig => Step::Continue,
        };
        if session.mode() == Mode::EditingConfig {
            edit_config(session)?;
        }

        match step {
            Step::Continue => {}
            Step::Quit => return Ok(None),
            Step::Done(outcome) => return Ok(Some(outcome)),
        }
    }
}

enum Step {
    Continue,
    Quit,
    Done(Outcome),
}

fn first_run_setup(session: &mut Session) -> Result<()> {
    ui::print_info("Welcome! Opening the config file so you can set your repo roots.");
    edit_config(session)?;
    if let Err(err) = sync::spawn_detached_sync() {
        session.set_message(format!("Could not start background sync: {err:#}"));
    } else {
        session.set_message("Fetching your repositories in the background...");
    }
    Ok(())
}

/// Browsing-mode input: a query re-ranks, a number selects, `/` opens the
/// command palette, `q` quits.
fn handle_browsing(session: &mut Session, input: &str) -> Result<Step> {
    if input == "/" {
        session.set_mode(Mode::CommandPalette);
        return Ok(Step::Continue);
    }
    if input == "q" {
        return Ok(Step::Quit);
    }

    if let Ok(index) = input.parse::<usize>() {
        if index >= 1 && index <= session.results().len() {
            let repo = session.results()[index - 1].clone();
            return prompt_action(session, repo);
        }
        session.set_message(format!("No result numbered {index}"));
        return Ok(Step::Continue);
    }

    session.set_query(input);
    Ok(Step::Continue)
}

/// Ask which action to take on the selected repository.
fn prompt_action(session: &mut Session, repo: Repository) -> Result<Step> {
    println!();
    ui::print_info(&format!("Selected {}", repo.full_name));
    let location = if repo.exists_local {
        format!("cloned at {}", repo.local_path)
    } else {
        "not cloned yet".to_string()
    };
    ui::print_dim(&format!("  {location}"));
    println!("  [o] open in editor  [p] copy path  [b] open on GitHub  [r] pull requests  [other] cancel");
    print!("> ");
    std::io::stdout().flush().ok();

    let mut choice = String::new();
    std::io::stdin()
        .read_line(&mut choice)
        .context("Failed to read input")?;

    let action = match choice.trim() {
        "o" => Action::Open,
        "p" => Action::CopyPath,
        "b" => Action::Browse,
        "r" => Action::PullRequests,
        _ => {
            session.set_message("Cancelled");
            return Ok(Step::Continue);
        }
    };
    Ok(Step::Done(Outcome { repo, action }))
}

fn handle_palette(session: &mut Session, input: &str, refresh_tx: &SyncSender<Config>) -> Step {
    session.set_mode(Mode::Browsing);
    match input {
        "refresh" | "r" => request_refresh(session, refresh_tx),
        "config" | "c" => session.set_mode(Mode::EditingConfig),
        "quit" | "q" => return Step::Quit,
        "" => {}
        other => session.set_message(format!("Unknown command: {other}")),
    }
    Step::Continue
}

/// Hand a refresh to the worker. A request already in flight wins; this
/// one is dropped silently apart from the status line.
fn request_refresh(session: &mut Session, refresh_tx: &SyncSender<Config>) {
    match refresh_tx.try_send(session.config().clone()) {
        Ok(()) => session.set_message("Refreshing from GitHub..."),
        Err(TrySendError::Full(_)) => session.set_message("A refresh is already running"),
        Err(TrySendError::Disconnected(_)) => {
            session.set_message("Refresh worker is gone; restart to sync");
        }
    }
}

/// Open `$EDITOR` on the config file, then reload and apply it. A config
/// that fails to parse or validate leaves the previous one active.
fn edit_config(session: &mut Session) -> Result<()> {
    let path = config::config_path();
    if !path.exists() {
        session.config().save()?;
    }

    let editor = actions::editor_command()?;
    let status = std::process::Command::new(&editor)
        .arg(&path)
        .status()
        .with_context(|| format!("Failed to launch editor: {editor}"))?;

    session.set_mode(Mode::Browsing);
    if !status.success() {
        session.set_message("Editor exited abnormally; config unchanged");
        return Ok(());
    }

    match Config::load_from(&path) {
        Ok(config) => {
            session.apply_config(config);
            session.set_message("Config reloaded");
        }
        Err(err) => session.set_message(format!("Config not applied: {err:#}")),
    }
    Ok(())
}

fn drain_events(session: &mut Session, event_rx: &Receiver<Event>) {
    while let Ok(event) = event_rx.try_recv() {
        match event {
            Event::CacheReloaded(repos) => {
                session.replace_cache(repos);
                session.set_message("Repository list updated");
            }
            Event::RefreshDone(Ok(repos)) => {
                let count = repos.len();
                session.replace_cache(repos);
                session.set_message(format!("Synced {count} repositories"));
            }
            Event::RefreshDone(Err(err)) => {
                session.set_message(format!("Refresh failed: {err:#}"));
            }
        }
    }
}

fn render(session: &mut Session) {
    println!();
    if let Some(message) = session.take_message() {
        ui::print_warning(&message);
    }

    match session.mode() {
        Mode::CommandPalette => {
            ui::print_info("Commands: refresh, config, quit");
            print!(": ");
        }
        _ => {
            let total = session.results().len();
            for (i, repo) in session.results().iter().take(DISPLAY_LIMIT).enumerate() {
                let marker = if repo.exists_local {
                    format!("{}*{}", Colors::GREEN, Colors::RESET)
                } else {
                    " ".to_string()
                };
                println!(
                    "{:>3} {marker} {} {}{}{}",
                    i + 1,
                    repo.full_name,
                    Colors::DIM,
                    repo.affiliation,
                    Colors::RESET
                );
            }
            if total > DISPLAY_LIMIT {
                ui::print_dim(&format!("  ... and {} more", total - DISPLAY_LIMIT));
            }
            if total == 0 {
                ui::print_dim("  no matches");
            }
            print!("search ({}q to quit, / for commands)> ", prompt_prefix(session));
        }
    }
    std::io::stdout().flush().ok();
}

fn prompt_prefix(session: &Session) -> String {
    if session.query().is_empty() {
        String::new()
    } else {
        format!("[{}] ", session.query())
    }
}

fn spawn_refresh_worker(refresh_rx: Receiver<Config>, event_tx: mpsc::Sender<Event>) {
    thread::spawn(move || {
        while let Ok(config) = refresh_rx.recv() {
            let result = sync::run_remote_sync(&config).and_then(|_| cache::load_repos());
            if event_tx.send(Event::RefreshDone(result)).is_err() {
                break;
            }
        }
    });
}

/// Watch the cache file for writes by detached syncs or other instances.
fn spawn_cache_watcher(poll_interval: Duration, event_tx: mpsc::Sender<Event>) {
    thread::spawn(move || {
        let mut last_seen = cache::repos_mtime();
        loop {
            thread::sleep(poll_interval);
            let current = cache::repos_mtime();
            if current != last_seen {
                last_seen = current;
                if let Ok(repos) = cache::load_repos() {
                    if event_tx.send(Event::CacheReloaded(repos)).is_err() {
                        return;
                    }
                }
            }
        }
    });
}

/// Execute the chosen action. Usage is recorded by the caller only when
/// this succeeds.
pub fn perform(outcome: &Outcome, config: &Config) -> Result<()> {
    match outcome.action {
        Action::Open => {
            let path = actions::ensure_local(&outcome.repo, config)?;
            actions::open_in_editor(&path)
        }
        Action::CopyPath => {
            let path = actions::ensure_local(&outcome.repo, config)?;
            actions::copy_to_clipboard(&path)?;
            ui::print_success(&format!("Copied {path}"));
            Ok(())
        }
        Action::Browse => actions::open_in_browser(&outcome.repo),
        Action::PullRequests => actions::open_pull_requests(&outcome.repo),
    }
}
