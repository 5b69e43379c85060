//! Per-repository backup execution
//!
//! [`BackupExecutor::execute`] always returns a [`BackupOutcome`]. Clone,
//! packaging and upload errors are converted into `Failure` outcomes here and
//! never reach the orchestrator.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::archive::package_to_file;
use crate::config::{KeyLayout, ProbeErrorPolicy};
use crate::discovery::{RepositoryHost, RepositoryRef};
use crate::error::BackupError;
use crate::probe::{Existence, ExistenceProber};
use crate::storage::{ObjectMetadata, ObjectStore, StorageKey, ARTIFACT_SUFFIX};

/// Reason recorded for repositories skipped by the skip-existing policy
pub const ALREADY_BACKED_UP: &str = "already backed up";

/// Result of processing one candidate repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BackupOutcome {
    Success {
        repo: RepositoryRef,
        stored_key: StorageKey,
        size_bytes: u64,
    },
    Failure {
        repo: RepositoryRef,
        reason: String,
    },
    Skipped {
        repo: RepositoryRef,
        reason: String,
    },
}

impl BackupOutcome {
    pub fn repo(&self) -> &RepositoryRef {
        match self {
            BackupOutcome::Success { repo, .. }
            | BackupOutcome::Failure { repo, .. }
            | BackupOutcome::Skipped { repo, .. } => repo,
        }
    }
}

/// Maps repositories of one organization to storage keys
#[derive(Debug, Clone)]
pub struct KeyScheme {
    pub prefix: String,
    pub organization: String,
    pub layout: KeyLayout,
    pub run_date: NaiveDate,
}

impl KeyScheme {
    /// Scheme for a run starting now; the date is fixed for the whole run
    pub fn new(prefix: impl Into<String>, organization: impl Into<String>, layout: KeyLayout) -> Self {
        Self {
            prefix: prefix.into(),
            organization: organization.into(),
            layout,
            run_date: Utc::now().date_naive(),
        }
    }

    pub fn key_for(&self, repo: &RepositoryRef) -> StorageKey {
        StorageKey::for_repository(
            &self.prefix,
            &self.organization,
            &repo.name,
            self.layout,
            self.run_date,
        )
    }

    /// Prefix holding every dated backup of `repo` under the daily layout
    pub fn history_prefix(&self, repo: &RepositoryRef) -> String {
        StorageKey::history_prefix(&self.prefix, &self.organization, &repo.name)
    }
}

/// Tunables for [`BackupExecutor`]
#[derive(Debug, Clone, Default)]
pub struct ExecutorOptions {
    pub on_probe_error: ProbeErrorPolicy,
    pub work_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

/// Produces and stores the backup artifact for one repository
#[derive(Clone)]
pub struct BackupExecutor {
    host: Arc<dyn RepositoryHost>,
    store: Arc<dyn ObjectStore>,
    prober: ExistenceProber,
    keys: KeyScheme,
    options: ExecutorOptions,
}

impl BackupExecutor {
    pub fn new(
        host: Arc<dyn RepositoryHost>,
        store: Arc<dyn ObjectStore>,
        keys: KeyScheme,
        options: ExecutorOptions,
    ) -> Self {
        let prober = ExistenceProber::new(store.clone());
        Self {
            host,
            store,
            prober,
            keys,
            options,
        }
    }

    /// Back up one repository, honoring the skip-existing flag
    pub async fn execute(&self, repo: &RepositoryRef, skip_existing: bool) -> BackupOutcome {
        info!("Processing repository: {}", repo.full_name);

        let result = match self.options.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.run(repo, skip_existing)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("Backup timed out for repository: {}", repo.full_name);
                    Err(BackupError::Timeout(limit))
                }
            },
            None => self.run(repo, skip_existing).await,
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Failed to backup {}: {}", repo.full_name, e);
                BackupOutcome::Failure {
                    repo: repo.clone(),
                    reason: e.reason(),
                }
            }
        }
    }

    async fn run(
        &self,
        repo: &RepositoryRef,
        skip_existing: bool,
    ) -> Result<BackupOutcome, BackupError> {
        let key = self.keys.key_for(repo);

        if skip_existing {
            match self.prober.exists(&key).await {
                Ok(Existence::Present(_)) => {
                    info!("Backup already exists, skipping: {}", key);
                    return Ok(BackupOutcome::Skipped {
                        repo: repo.clone(),
                        reason: ALREADY_BACKED_UP.to_string(),
                    });
                }
                Ok(Existence::NotFound) => {}
                Err(e) => match self.options.on_probe_error {
                    ProbeErrorPolicy::Proceed => {
                        warn!("{} for {}; backing up anyway", e, key);
                    }
                    ProbeErrorPolicy::Fail => return Err(e),
                },
            }
        }

        let size_bytes = self.backup_to(repo, &key).await?;

        info!("Backed up {} to {} ({} bytes)", repo.full_name, key, size_bytes);
        Ok(BackupOutcome::Success {
            repo: repo.clone(),
            stored_key: key,
            size_bytes,
        })
    }

    /// Clone, package into the workspace and upload; returns the artifact size
    async fn backup_to(&self, repo: &RepositoryRef, key: &StorageKey) -> Result<u64, BackupError> {
        let workspace = self.workspace()?;

        let fetched = self.host.fetch_contents(repo, workspace.path()).await?;

        let artifact = workspace.path().join(format!("{}{}", repo.name, ARTIFACT_SUFFIX));
        let root_name = format!("{}.git", repo.name);
        let destination = artifact.clone();
        let size_bytes =
            tokio::task::spawn_blocking(move || package_to_file(&fetched, &root_name, &destination))
                .await
                .map_err(|e| BackupError::Packaging(format!("packaging task failed: {}", e)))??;

        let metadata = ObjectMetadata {
            repository: repo.full_name.clone(),
            backup_date: Utc::now(),
            default_branch: repo.default_branch.clone(),
            size_bytes,
        };

        self.store
            .put_object(key, &artifact, &metadata)
            .await
            .map_err(|e| BackupError::Upload(e.to_string()))?;

        Ok(size_bytes)
    }

    fn workspace(&self) -> Result<tempfile::TempDir, BackupError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("repo-backup-");
        let result = match &self.options.work_dir {
            Some(dir) => builder.tempdir_in(Path::new(dir)),
            None => builder.tempdir(),
        };
        result.map_err(|e| BackupError::Clone(format!("failed to create working directory: {}", e)))
    }
}
