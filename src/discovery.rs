//! Repository discovery abstraction layer
//!
//! The orchestration core only sees [`RepositoryRef`] snapshots and the
//! [`RepositoryHost`] trait, so it can be driven by GitHub in production and by
//! in-memory hosts in tests.

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::{BackupError, FatalError};

/// Immutable snapshot of a hosted repository
///
/// Identity is `full_name` (`owner/name`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryRef {
    /// Repository name (e.g., "lecture-python.myst")
    pub name: String,

    /// Owner-qualified name (e.g., "quantecon/lecture-python.myst")
    pub full_name: String,

    /// HTTPS clone URL
    pub source_url: String,

    /// Default branch name
    pub default_branch: String,
}

impl RepositoryRef {
    /// Reference with GitHub's conventional clone URL and a `main` default
    /// branch; hosts overwrite whichever fields their API reports
    pub fn new(owner: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            full_name: format!("{}/{}", owner, name),
            source_url: format!("https://github.com/{}/{}.git", owner, name),
            default_branch: "main".to_string(),
        }
    }
}

/// Source-control hosting collaborator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RepositoryHost: Send + Sync {
    /// List every repository of an organization
    async fn list_repositories(&self, organization: &str) -> Result<Vec<RepositoryRef>, FatalError>;

    /// Materialize the repository contents under `dest`, returning the path
    /// of the fetched copy
    async fn fetch_contents(&self, repo: &RepositoryRef, dest: &Path)
        -> Result<PathBuf, BackupError>;

    /// Provider name for display/logging
    fn provider_name(&self) -> &'static str;
}
