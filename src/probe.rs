//! Existence checks for backup artifacts
//!
//! Absence and failure are different answers: a probe that cannot reach the
//! store returns an error, never [`Existence::NotFound`].

use std::sync::Arc;
use tracing::debug;

use crate::error::BackupError;
use crate::storage::{ExistenceInfo, ObjectStore, StorageKey};

/// Outcome of a successful probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Existence {
    Present(ExistenceInfo),
    NotFound,
}

/// Thin wrapper over the store's metadata endpoint
#[derive(Clone)]
pub struct ExistenceProber {
    store: Arc<dyn ObjectStore>,
}

impl ExistenceProber {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Probe `key`; transport and auth failures surface as `BackupError::Probe`
    pub async fn exists(&self, key: &StorageKey) -> Result<Existence, BackupError> {
        match self.store.head_object(key).await {
            Ok(Some(info)) => {
                debug!("Backup exists: {} ({} bytes)", key, info.size_bytes);
                Ok(Existence::Present(info))
            }
            Ok(None) => {
                debug!("No backup at {}", key);
                Ok(Existence::NotFound)
            }
            Err(e) => Err(BackupError::Probe(e.to_string())),
        }
    }
}
