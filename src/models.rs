use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::Config;

/// GitHub's classification of the user's relationship to a repository.
/// `Local` is reserved for repositories with no resolved GitHub identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Affiliation {
    Owner,
    Collaborator,
    OrganizationMember,
    Local,
}

impl Affiliation {
    /// Fixed fetch/dedup priority: lower sorts first and wins on conflict.
    #[must_use]
    pub const fn priority(self) -> u8 {
        match self {
            Self::Owner => 0,
            Self::Collaborator => 1,
            Self::OrganizationMember => 2,
            Self::Local => 3,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Collaborator => "collaborator",
            Self::OrganizationMember => "organization_member",
            Self::Local => "local",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "owner" => Some(Self::Owner),
            "collaborator" => Some(Self::Collaborator),
            "organization_member" => Some(Self::OrganizationMember),
            "local" => Some(Self::Local),
            _ => None,
        }
    }
}

impl fmt::Display for Affiliation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A repository known from GitHub, the local filesystem, or both.
///
/// `full_name` (case-insensitive) is the identity key across all sources.
/// `search_text` is derived from the identity fields and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub owner: String,
    pub name: String,
    #[serde(rename = "fullName")]
    pub full_name: String,
    #[serde(rename = "sshURL", default)]
    pub ssh_url: String,
    #[serde(rename = "localPath", default)]
    pub local_path: String,
    #[serde(rename = "existsLocal", default)]
    pub exists_local: bool,
    pub affiliation: Affiliation,
    #[serde(skip)]
    pub search_text: String,
}

impl Repository {
    #[must_use]
    pub fn new(owner: &str, name: &str, affiliation: Affiliation) -> Self {
        let mut repo = Self {
            owner: owner.to_string(),
            name: name.to_string(),
            full_name: format!("{owner}/{name}"),
            ssh_url: String::new(),
            local_path: String::new(),
            exists_local: false,
            affiliation,
            search_text: String::new(),
        };
        repo.refresh_search_text();
        repo
    }

    /// Case-insensitive identity key.
    #[must_use]
    pub fn key(&self) -> String {
        self.full_name.to_lowercase()
    }

    /// Recompute the derived search text. Must be called whenever
    /// `owner`, `name`, or `full_name` change, and after deserialization.
    pub fn refresh_search_text(&mut self) {
        self.search_text = format!("{}{}{}", self.owner, self.name, self.full_name).to_lowercase();
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name)
    }
}

/// Apply the config's per-affiliation display toggles to the cached set.
///
/// Pure function of its inputs so the session can reapply it after any
/// config edit without knowing about filtering internals.
#[must_use]
pub fn filter_repos(repos: &[Repository], config: &Config) -> Vec<Repository> {
    repos
        .iter()
        .filter(|repo| match repo.affiliation {
            Affiliation::Owner => config.show_owner,
            Affiliation::Collaborator => config.show_collaborator,
            Affiliation::OrganizationMember => config.show_org_member,
            Affiliation::Local => config.show_local,
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_text_derived_from_identity_fields() {
        let repo = Repository::new("Acme", "Widget", Affiliation::Owner);
        assert_eq!(repo.full_name, "Acme/Widget");
        assert_eq!(repo.search_text, "acmewidgetacme/widget");
    }

    #[test]
    fn key_is_case_insensitive() {
        let a = Repository::new("Acme", "Widget", Affiliation::Owner);
        let b = Repository::new("acme", "widget", Affiliation::Collaborator);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn affiliation_priority_ordering() {
        assert!(Affiliation::Owner.priority() < Affiliation::Collaborator.priority());
        assert!(Affiliation::Collaborator.priority() < Affiliation::OrganizationMember.priority());
    }

    #[test]
    fn affiliation_parse_round_trip() {
        for aff in [
            Affiliation::Owner,
            Affiliation::Collaborator,
            Affiliation::OrganizationMember,
            Affiliation::Local,
        ] {
            assert_eq!(Affiliation::parse(aff.as_str()), Some(aff));
        }
        assert_eq!(Affiliation::parse("maintainer"), None);
    }

    #[test]
    fn serialization_excludes_search_text() {
        let repo = Repository::new("acme", "widget", Affiliation::Owner);
        let json = serde_json::to_string(&repo).unwrap();
        assert!(json.contains("\"fullName\":\"acme/widget\""));
        assert!(!json.contains("search_text"));
        assert!(!json.contains("searchText"));
    }

    #[test]
    fn filter_respects_toggles() {
        let repos = vec![
            Repository::new("u", "owned", Affiliation::Owner),
            Repository::new("u", "collab", Affiliation::Collaborator),
            Repository::new("org", "member", Affiliation::OrganizationMember),
            Repository::new("local", "scratch", Affiliation::Local),
        ];
        let config = Config {
            show_collaborator: false,
            show_local: false,
            ..Config::default()
        };

        let visible = filter_repos(&repos, &config);
        let names: Vec<&str> = visible.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["owned", "member"]);
    }
}
