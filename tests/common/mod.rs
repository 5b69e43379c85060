//! Common test utilities and helpers for repo-maintenance tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use repo_maintenance::{
    BackupError, Config, ExistenceInfo, FatalError, ObjectMetadata, ObjectStore, ObjectSummary,
    RepositoryHost, RepositoryRef, StorageError, StorageKey,
};

pub const ORG: &str = "quantecon";

/// Configuration pointing at a test bucket with the given patterns
pub fn test_config(patterns: &[&str]) -> Config {
    let mut config = Config::default();
    config.backup.enabled = true;
    config.backup.organization = Some(ORG.to_string());
    config.backup.patterns = patterns.iter().map(|p| p.to_string()).collect();
    config.backup.s3.bucket = Some("test-bucket".to_string());
    config
}

pub fn repo(name: &str) -> RepositoryRef {
    RepositoryRef::new(ORG, name)
}

pub fn names(repos: &[RepositoryRef]) -> Vec<&str> {
    repos.iter().map(|r| r.name.as_str()).collect()
}

/// In-memory hosting service that "clones" by writing a tiny bare repository
#[derive(Default)]
pub struct InMemoryHost {
    repositories: Vec<RepositoryRef>,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    missing_organization: bool,
    active: AtomicUsize,
    peak: AtomicUsize,
    fetched: Mutex<Vec<String>>,
}

impl InMemoryHost {
    pub fn with_repositories(names: &[&str]) -> Self {
        Self {
            repositories: names.iter().map(|name| repo(name)).collect(),
            ..Default::default()
        }
    }

    pub fn missing_organization() -> Self {
        Self {
            missing_organization: true,
            ..Default::default()
        }
    }

    /// Make cloning `name` fail
    pub fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    /// Make cloning `name` take `delay`
    pub fn delayed(mut self, name: &str, delay: Duration) -> Self {
        self.delays.insert(name.to_string(), delay);
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    /// Highest number of concurrent fetches observed
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RepositoryHost for InMemoryHost {
    async fn list_repositories(&self, organization: &str) -> Result<Vec<RepositoryRef>, FatalError> {
        if self.missing_organization {
            return Err(FatalError::OrganizationNotFound(organization.to_string()));
        }
        Ok(self.repositories.clone())
    }

    async fn fetch_contents(&self, repo: &RepositoryRef, dest: &Path) -> Result<PathBuf, BackupError> {
        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        let delay = self
            .delays
            .get(&repo.name)
            .copied()
            .unwrap_or(Duration::from_millis(5));
        tokio::time::sleep(delay).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.fetched.lock().unwrap().push(repo.name.clone());

        if self.failing.contains(&repo.name) {
            return Err(BackupError::Clone(format!(
                "repository '{}' not found",
                repo.full_name
            )));
        }

        let path = dest.join(format!("{}.git", repo.name));
        let write = |relative: &str, content: &str| -> std::io::Result<()> {
            let file = path.join(relative);
            if let Some(parent) = file.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(file, content)
        };
        write("HEAD", "ref: refs/heads/main\n")
            .and_then(|_| write("config", "[core]\n\tbare = true\n"))
            .and_then(|_| write("refs/heads/main", &format!("{}\n", repo.name)))
            .map_err(|e| BackupError::Clone(e.to_string()))?;

        Ok(path)
    }

    fn provider_name(&self) -> &'static str {
        "in-memory"
    }
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub metadata: Option<ObjectMetadata>,
}

/// In-memory object store with optional probe failures
#[derive(Default)]
pub struct InMemoryStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    failing_heads: HashSet<String>,
    puts: AtomicUsize,
    heads: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-existing object of `size` bytes at `key`
    pub fn seeded(self, key: &str, size: usize) -> Self {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                body: vec![0; size],
                metadata: None,
            },
        );
        self
    }

    /// Make probing `key` fail
    pub fn failing_head(mut self, key: &str) -> Self {
        self.failing_heads.insert(key.to_string());
        self
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn head_count(&self) -> usize {
        self.heads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn put_object(
        &self,
        key: &StorageKey,
        artifact: &Path,
        metadata: &ObjectMetadata,
    ) -> Result<(), StorageError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let body = std::fs::read(artifact).map_err(|e| StorageError::Transport(e.to_string()))?;
        self.objects.lock().unwrap().insert(
            key.as_str().to_string(),
            StoredObject {
                body,
                metadata: Some(metadata.clone()),
            },
        );
        Ok(())
    }

    async fn head_object(&self, key: &StorageKey) -> Result<Option<ExistenceInfo>, StorageError> {
        self.heads.fetch_add(1, Ordering::SeqCst);
        if self.failing_heads.contains(key.as_str()) {
            return Err(StorageError::Status {
                status: 503,
                body: "SlowDown".to_string(),
            });
        }

        Ok(self.objects.lock().unwrap().get(key.as_str()).map(|object| ExistenceInfo {
            size_bytes: object.body.len() as u64,
            last_modified: None,
        }))
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectSummary>, StorageError> {
        let objects = self.objects.lock().unwrap();
        let mut listed: Vec<ObjectSummary> = objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| ObjectSummary {
                key: StorageKey::from(key.as_str()),
                size_bytes: object.body.len() as u64,
                last_modified: None,
            })
            .collect();
        listed.sort_by(|a, b| a.key.as_str().cmp(b.key.as_str()));
        Ok(listed)
    }
}
