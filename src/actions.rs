use anyhow::{Context, Result};
use base64::Engine;
use std::io::Write;
use std::path::Path;
use std::process::Command;

use crate::config::Config;
use crate::models::Repository;
use crate::ui;

/// The editor command from `$EDITOR`, taken as a single program name.
/// Anything that looks like shell syntax is rejected rather than
/// interpreted.
pub fn editor_command() -> Result<String> {
    let editor = std::env::var("EDITOR").context("EDITOR is not set")?;
    let editor = editor.trim();

    if editor.is_empty()
        || editor.starts_with('-')
        || editor.contains(|c: char| " \t;|&<>$`\"'\\".contains(c))
    {
        anyhow::bail!("EDITOR contains shell syntax; set it to a plain program name");
    }
    Ok(editor.to_string())
}

/// Open an editor in the repository's working tree, blocking until it
/// exits.
pub fn open_in_editor(path: &str) -> Result<()> {
    let editor = editor_command()?;
    let status = Command::new(&editor)
        .arg(".")
        .current_dir(path)
        .status()
        .with_context(|| format!("Failed to launch editor: {editor}"))?;

    if !status.success() {
        anyhow::bail!("Editor exited with {status}");
    }
    Ok(())
}

/// Copy text to the system clipboard via OSC 52, which works through SSH
/// and terminal multiplexers with no clipboard utility installed.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let encoded = base64::engine::general_purpose::STANDARD.encode(text);
    let mut stdout = std::io::stdout();
    write!(stdout, "\x1b]52;c;{encoded}\x07").context("Failed to write clipboard sequence")?;
    stdout.flush().context("Failed to flush clipboard sequence")
}

#[must_use]
pub fn web_url(repo: &Repository) -> String {
    format!("https://github.com/{}/{}", repo.owner, repo.name)
}

pub fn open_in_browser(repo: &Repository) -> Result<()> {
    open_url(&web_url(repo))
}

pub fn open_pull_requests(repo: &Repository) -> Result<()> {
    open_url(&format!("{}/pulls", web_url(repo)))
}

fn open_url(url: &str) -> Result<()> {
    let status = if cfg!(target_os = "macos") {
        Command::new("open").arg(url).status()
    } else if cfg!(windows) {
        Command::new("cmd").args(["/C", "start", url]).status()
    } else {
        Command::new("xdg-open").arg(url).status()
    }
    .with_context(|| format!("Failed to open browser for {url}"))?;

    if !status.success() {
        anyhow::bail!("Browser launcher exited with {status}");
    }
    Ok(())
}

/// Clone the repository to its configured destination and return the
/// local path. Refuses to clone repositories with no GitHub identity or
/// when the destination already exists.
pub fn clone_repo(repo: &Repository, config: &Config) -> Result<String> {
    if repo.owner == "local" {
        anyhow::bail!("{} has no GitHub remote to clone from", repo.full_name);
    }

    let dest = config.clone_path(&repo.full_name, &repo.name);
    if dest.exists() {
        anyhow::bail!("Destination already exists: {}", dest.display());
    }
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let url = if repo.ssh_url.is_empty() {
        format!("git@github.com:{}.git", repo.full_name)
    } else {
        repo.ssh_url.clone()
    };

    ui::print_info(&format!("Cloning {} into {}...", repo.full_name, dest.display()));
    let status = Command::new("git")
        .args(["clone", &url])
        .arg(&dest)
        .status()
        .context("Failed to run git clone - is git installed?")?;

    if !status.success() {
        anyhow::bail!("git clone failed for {}", repo.full_name);
    }
    Ok(dest.to_string_lossy().to_string())
}

/// Make sure the repository exists on disk, cloning on demand. Returns
/// the local path.
pub fn ensure_local(repo: &Repository, config: &Config) -> Result<String> {
    if repo.exists_local && Path::new(&repo.local_path).exists() {
        return Ok(repo.local_path.clone());
    }
    clone_repo(repo, config)
}
