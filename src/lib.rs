//! Fuzzy launcher for GitHub and local repositories.
//!
//! A cached, merged view of the user's GitHub repositories and local
//! clones, searched interactively and kept fresh by background syncs.

pub mod actions;
pub mod cache;
pub mod config;
pub mod github;
pub mod interactive;
pub mod models;
pub mod reconcile;
pub mod scan;
pub mod search;
pub mod sync;
pub mod ui;
pub mod usage;

pub use models::{filter_repos, Affiliation, Repository};
