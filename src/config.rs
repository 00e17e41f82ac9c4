use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cache;
use crate::models::Affiliation;

pub const DEFAULT_AFFILIATION: &str = "owner,collaborator,organization_member";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// Comma-separated affiliation classes to fetch.
    pub affiliation: String,
    /// Comma-separated organization allowlist; empty means all orgs.
    pub orgs: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            affiliation: DEFAULT_AFFILIATION.to_string(),
            orgs: String::new(),
        }
    }
}

/// A clone-destination rule: repositories whose `full_name` matches
/// `pattern` are cloned under `path`. First matching rule wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneRule {
    pub pattern: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Absolute directories scanned for local git repositories.
    pub repo_roots: Vec<PathBuf>,
    /// Default clone destination when no clone rule matches.
    pub clone_root: Option<PathBuf>,
    pub use_clone_rules: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub clone_rules: Vec<CloneRule>,
    pub github: GitHubConfig,

    // Display toggles - control which cached repos are shown.
    pub show_owner: bool,
    pub show_collaborator: bool,
    pub show_org_member: bool,
    pub show_local: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repo_roots: Vec::new(),
            clone_root: None,
            use_clone_rules: false,
            clone_rules: Vec::new(),
            github: GitHubConfig::default(),
            show_owner: true,
            show_collaborator: true,
            show_org_member: true,
            show_local: true,
        }
    }
}

impl Config {
    /// Load the config file, falling back to defaults when it is absent.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.expand_paths();
        config.validate()?;
        Ok(config)
    }

    /// Expand `~` in user-entered paths before validation.
    fn expand_paths(&mut self) {
        for root in &mut self.repo_roots {
            *root = expand_tilde(&root.to_string_lossy());
        }
        if let Some(root) = &self.clone_root {
            self.clone_root = Some(expand_tilde(&root.to_string_lossy()));
        }
        for rule in &mut self.clone_rules {
            rule.path = expand_tilde(&rule.path.to_string_lossy());
        }
    }

    /// Save the config atomically (temp file then rename).
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;
        cache::write_atomic(path, content.as_bytes())
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.github.affiliation.trim().is_empty() {
            anyhow::bail!("github.affiliation cannot be empty");
        }
        self.affiliations()?;

        for root in &self.repo_roots {
            if !root.is_absolute() {
                anyhow::bail!(
                    "repo_roots must contain absolute paths (got {})",
                    root.display()
                );
            }
        }

        if let Some(root) = &self.clone_root {
            if !root.is_absolute() {
                anyhow::bail!("clone_root must be an absolute path (got {})", root.display());
            }
        }

        for (i, rule) in self.clone_rules.iter().enumerate() {
            if rule.pattern.is_empty() {
                anyhow::bail!("clone_rules[{i}]: pattern cannot be empty");
            }
            Regex::new(&rule.pattern)
                .with_context(|| format!("clone_rules[{i}]: invalid regex pattern {:?}", rule.pattern))?;
            if rule.path.as_os_str().is_empty() {
                anyhow::bail!("clone_rules[{i}]: path cannot be empty");
            }
            if !rule.path.is_absolute() {
                anyhow::bail!(
                    "clone_rules[{i}]: path must be absolute (got {})",
                    rule.path.display()
                );
            }
        }

        Ok(())
    }

    /// Affiliation classes to fetch, in the order the config lists them.
    /// The fetcher reorders these into priority order before use.
    pub fn affiliations(&self) -> Result<Vec<Affiliation>> {
        let mut classes = Vec::new();
        for part in self.github.affiliation.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let aff = Affiliation::parse(part)
                .with_context(|| format!("unknown affiliation class {part:?}"))?;
            if aff == Affiliation::Local {
                anyhow::bail!("affiliation 'local' cannot be fetched from GitHub");
            }
            if !classes.contains(&aff) {
                classes.push(aff);
            }
        }
        if classes.is_empty() {
            anyhow::bail!("github.affiliation lists no valid classes");
        }
        Ok(classes)
    }

    /// Lowercased organization allowlist; empty means no restriction.
    #[must_use]
    pub fn org_allowlist(&self) -> Vec<String> {
        self.github
            .orgs
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }

    #[must_use]
    pub fn clone_root(&self) -> PathBuf {
        if let Some(root) = &self.clone_root {
            return root.clone();
        }
        if let Some(first) = self.repo_roots.first() {
            return first.clone();
        }
        dirs::home_dir().unwrap_or_default().join("repos")
    }

    /// Full destination path for cloning a repository. Clone rules are
    /// checked in order when enabled, first match wins; unmatched repos
    /// fall back to the clone root.
    #[must_use]
    pub fn clone_path(&self, full_name: &str, repo_name: &str) -> PathBuf {
        if self.use_clone_rules {
            for rule in &self.clone_rules {
                let Ok(re) = Regex::new(&rule.pattern) else {
                    continue;
                };
                if re.is_match(full_name) {
                    return rule.path.join(repo_name);
                }
            }
        }
        self.clone_root().join(repo_name)
    }
}

/// True when no config file exists yet.
#[must_use]
pub fn is_first_run() -> bool {
    !config_path().exists()
}

/// Config directory, honoring `FUZZYREPO_CONFIG_DIR` for tests.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("FUZZYREPO_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fuzzyrepo")
}

#[must_use]
pub fn config_path() -> PathBuf {
    config_dir().join("config.yaml")
}

/// Expand a leading `~` or `~/` to the user's home directory.
#[must_use]
pub fn expand_tilde(path: &str) -> PathBuf {
    let trimmed = path.trim();
    if trimmed == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(trimmed));
    }
    if let Some(rest) = trimmed.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(trimmed)
}
