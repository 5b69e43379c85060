//! Read-only backup coverage report
//!
//! Under the `latest` layout each matched repository has one key, which is
//! probed. Under the `daily` layout every dated backup of a repository is
//! listed, so a backup from an earlier day still counts. Nothing is uploaded
//! or cloned.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::backup::KeyScheme;
use crate::config::{Config, KeyLayout};
use crate::discovery::{RepositoryHost, RepositoryRef};
use crate::error::{BackupError, ConfigError, FatalError};
use crate::matcher::PatternSet;
use crate::probe::{Existence, ExistenceProber};
use crate::storage::{ObjectStore, StorageKey, ARTIFACT_SUFFIX};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Backup coverage for one organization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoverageReport {
    pub organization: String,
    /// Repositories matched by the pattern set
    pub total_repos: usize,
    /// Matched repositories with at least one stored backup
    pub repos_with_backups: usize,
    pub total_backup_size_bytes: u64,
    pub repositories: Vec<RepositoryCoverage>,
    /// Repositories whose probe failed; not counted as backed up
    pub probe_errors: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryCoverage {
    pub full_name: String,
    /// Key of the most recent backup
    pub key: StorageKey,
    /// Bytes stored across every backup of the repository
    pub size_bytes: u64,
    pub backup_count: usize,
    /// Modification time of the most recent backup
    pub last_modified: Option<DateTime<Utc>>,
}

impl CoverageReport {
    pub fn total_backup_size_gb(&self) -> f64 {
        self.total_backup_size_bytes as f64 / BYTES_PER_GB
    }

    pub fn repos_without_backups(&self) -> usize {
        self.total_repos - self.repos_with_backups
    }
}

pub struct ReportGenerator {
    host: Arc<dyn RepositoryHost>,
    store: Arc<dyn ObjectStore>,
    prober: ExistenceProber,
    patterns: PatternSet,
    prefix: String,
    layout: KeyLayout,
    max_parallel: usize,
}

impl ReportGenerator {
    pub fn new(
        config: &Config,
        host: Arc<dyn RepositoryHost>,
        store: Arc<dyn ObjectStore>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            host,
            prober: ExistenceProber::new(store.clone()),
            store,
            patterns: PatternSet::compile(&config.backup.patterns)?,
            prefix: config.backup.s3.normalized_prefix(),
            layout: config.backup.key_layout,
            max_parallel: config.backup.max_parallel.max(1),
        })
    }

    /// Build a fresh report; listing failures are fatal, probe failures are recorded
    pub async fn generate(&self, organization: &str) -> Result<CoverageReport, FatalError> {
        let repositories = self.host.list_repositories(organization).await?;
        let candidates = self.patterns.filter(&repositories);
        let keys = &KeyScheme::new(self.prefix.clone(), organization, self.layout);

        let lookups: Vec<(RepositoryRef, Result<Option<RepositoryCoverage>, BackupError>)> =
            stream::iter(candidates)
                .map(|repo| async move {
                    let coverage = self.coverage_for(&repo, keys).await;
                    (repo, coverage)
                })
                .buffered(self.max_parallel)
                .collect()
                .await;

        let mut report = CoverageReport {
            organization: organization.to_string(),
            total_repos: lookups.len(),
            ..Default::default()
        };

        for (repo, coverage) in lookups {
            match coverage {
                Ok(Some(coverage)) => {
                    report.repos_with_backups += 1;
                    report.total_backup_size_bytes += coverage.size_bytes;
                    report.repositories.push(coverage);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Could not check backups of {}: {}", repo.full_name, e);
                    report.probe_errors.push((repo.full_name, e.to_string()));
                }
            }
        }

        info!(
            "Coverage for {}: {}/{} repositories backed up ({:.2} GB)",
            organization,
            report.repos_with_backups,
            report.total_repos,
            report.total_backup_size_gb()
        );
        Ok(report)
    }

    /// Stored backups of one repository, `None` when there are none
    async fn coverage_for(
        &self,
        repo: &RepositoryRef,
        keys: &KeyScheme,
    ) -> Result<Option<RepositoryCoverage>, BackupError> {
        match keys.layout {
            KeyLayout::Latest => {
                let key = keys.key_for(repo);
                Ok(match self.prober.exists(&key).await? {
                    Existence::Present(info) => Some(RepositoryCoverage {
                        full_name: repo.full_name.clone(),
                        key,
                        size_bytes: info.size_bytes,
                        backup_count: 1,
                        last_modified: info.last_modified,
                    }),
                    Existence::NotFound => None,
                })
            }
            KeyLayout::Daily => {
                let prefix = keys.history_prefix(repo);
                let backups: Vec<_> = self
                    .store
                    .list_objects(&prefix)
                    .await
                    .map_err(|e| BackupError::Probe(e.to_string()))?
                    .into_iter()
                    .filter(|object| object.key.as_str().ends_with(ARTIFACT_SUFFIX))
                    .collect();

                // Dated keys sort chronologically
                let Some(latest) = backups.iter().max_by(|a, b| a.key.as_str().cmp(b.key.as_str()))
                else {
                    return Ok(None);
                };

                Ok(Some(RepositoryCoverage {
                    full_name: repo.full_name.clone(),
                    key: latest.key.clone(),
                    size_bytes: backups.iter().map(|object| object.size_bytes).sum(),
                    backup_count: backups.len(),
                    last_modified: latest.last_modified,
                }))
            }
        }
    }
}
