//! Backup run orchestration
//!
//! [`BackupOrchestrator::run`] lists the organization, filters it through the
//! pattern set and backs up every candidate with at most `max_parallel`
//! repositories in flight. Per-repository failures stay inside their
//! [`BackupOutcome`]; only listing failures abort the run. The resulting
//! [`BackupResult`] keeps candidate order in every bucket.

use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::backup::{BackupExecutor, BackupOutcome, ExecutorOptions, KeyScheme};
use crate::config::{Config, KeyLayout};
use crate::discovery::{RepositoryHost, RepositoryRef};
use crate::error::{ConfigError, FatalError};
use crate::matcher::PatternSet;
use crate::storage::ObjectStore;

/// Aggregate of one backup run, buckets in candidate order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackupResult {
    pub total_repos: usize,
    pub successful: Vec<RepositoryRef>,
    pub failed: Vec<(RepositoryRef, String)>,
    pub skipped: Vec<(RepositoryRef, String)>,
}

impl BackupResult {
    /// Bucket outcomes by variant, keeping their order
    pub fn from_outcomes(outcomes: Vec<BackupOutcome>) -> Self {
        let mut result = BackupResult {
            total_repos: outcomes.len(),
            ..Default::default()
        };

        for outcome in outcomes {
            match outcome {
                BackupOutcome::Success { repo, .. } => result.successful.push(repo),
                BackupOutcome::Failure { repo, reason } => result.failed.push((repo, reason)),
                BackupOutcome::Skipped { repo, reason } => result.skipped.push((repo, reason)),
            }
        }

        result
    }

    /// A run succeeds only when nothing failed
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Drives list -> filter -> execute -> aggregate for one organization
pub struct BackupOrchestrator {
    host: Arc<dyn RepositoryHost>,
    store: Arc<dyn ObjectStore>,
    patterns: PatternSet,
    prefix: String,
    layout: KeyLayout,
    max_parallel: usize,
    options: ExecutorOptions,
}

impl BackupOrchestrator {
    /// Build from configuration; invalid patterns fail here, before any repository is touched
    pub fn new(
        config: &Config,
        host: Arc<dyn RepositoryHost>,
        store: Arc<dyn ObjectStore>,
    ) -> Result<Self, ConfigError> {
        let patterns = PatternSet::compile(&config.backup.patterns)?;

        Ok(Self {
            host,
            store,
            patterns,
            prefix: config.backup.s3.normalized_prefix(),
            layout: config.backup.key_layout,
            max_parallel: config.backup.max_parallel.max(1),
            options: ExecutorOptions {
                on_probe_error: config.backup.on_probe_error,
                work_dir: config.backup.work_dir.as_ref().map(PathBuf::from),
                timeout: config.repository_timeout(),
            },
        })
    }

    /// Organization repositories selected by the pattern set, in listing order
    pub async fn candidates(&self, organization: &str) -> Result<Vec<RepositoryRef>, FatalError> {
        let repositories = self.host.list_repositories(organization).await?;
        let candidates = self.patterns.filter(&repositories);

        info!(
            "Found {} repositories, {} match the configured patterns",
            repositories.len(),
            candidates.len()
        );
        Ok(candidates)
    }

    /// Run a complete backup pass for `organization`
    pub async fn run(
        &self,
        organization: &str,
        skip_existing: bool,
    ) -> Result<BackupResult, FatalError> {
        let start_time = Instant::now();
        info!(
            "Starting backup of {} via {} (skip existing: {})",
            organization,
            self.host.provider_name(),
            skip_existing
        );

        let candidates = self.candidates(organization).await?;
        if candidates.is_empty() {
            warn!("No repositories matched the configured patterns");
        }

        let executor = BackupExecutor::new(
            self.host.clone(),
            self.store.clone(),
            KeyScheme::new(self.prefix.clone(), organization, self.layout),
            self.options.clone(),
        );

        let outcomes = self
            .execute_all(&executor, &candidates, skip_existing)
            .await;
        let result = BackupResult::from_outcomes(outcomes);

        info!(
            "Backup completed in {:.2}s: {} successful, {} failed, {} skipped",
            start_time.elapsed().as_secs_f64(),
            result.successful.len(),
            result.failed.len(),
            result.skipped.len()
        );
        Ok(result)
    }

    /// Execute every candidate under the parallelism bound; outcomes come back in candidate order
    async fn execute_all(
        &self,
        executor: &BackupExecutor,
        candidates: &[RepositoryRef],
        skip_existing: bool,
    ) -> Vec<BackupOutcome> {
        debug!(
            "Backing up {} repositories with max_parallel={}",
            candidates.len(),
            self.max_parallel
        );

        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut pending = FuturesUnordered::new();

        for (index, repo) in candidates.iter().enumerate() {
            let semaphore = semaphore.clone();
            pending.push(async move {
                let outcome = match semaphore.acquire().await {
                    Ok(_permit) => executor.execute(repo, skip_existing).await,
                    Err(e) => BackupOutcome::Failure {
                        repo: repo.clone(),
                        reason: format!("worker pool closed: {}", e),
                    },
                };
                (index, outcome)
            });
        }

        // Single collector: each outcome lands in its candidate's slot
        let mut slots: Vec<Option<BackupOutcome>> = vec![None; candidates.len()];
        while let Some((index, outcome)) = pending.next().await {
            debug!("Finished {}: {:?}", outcome.repo().full_name, outcome);
            slots[index] = Some(outcome);
        }

        slots.into_iter().flatten().collect()
    }
}
