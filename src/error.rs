//! Error taxonomy for backup runs
//!
//! Three families with different propagation rules:
//!
//! - [`ConfigError`]: invalid configuration, raised before any repository is touched
//! - [`FatalError`]: organization/listing failures that abort a whole run
//! - [`BackupError`]: per-repository failures, caught at the executor boundary
//!   and turned into a `Failure` outcome
//!
//! [`StorageError`] is what the object-store adapter reports; the executor maps
//! it onto `BackupError::Upload` or `BackupError::Probe` depending on the call.

use std::time::Duration;
use thiserror::Error;

/// Configuration problems detected at load or construction time.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A repository pattern is not a valid regular expression.
    #[error("invalid repository pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A required setting is absent.
    #[error("missing required setting: {0}")]
    MissingSetting(&'static str),

    /// A setting is present but unusable.
    #[error("invalid setting '{name}': {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    /// Object-store credentials could not be resolved.
    #[error("storage credentials unavailable: {0}")]
    Credentials(String),
}

/// Run-level failures; no `BackupResult` is produced when one of these occurs.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("organization not found: {0}")]
    OrganizationNotFound(String),

    #[error("authentication failed for organization {organization}: {reason}")]
    Auth {
        organization: String,
        reason: String,
    },

    #[error("failed to list repositories for organization {organization}: {reason}")]
    Listing {
        organization: String,
        reason: String,
    },
}

/// Per-repository failures.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("clone failed: {0}")]
    Clone(String),

    #[error("packaging failed: {0}")]
    Packaging(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("existence probe failed: {0}")]
    Probe(String),

    #[error("timeout after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl BackupError {
    /// Human-readable reason recorded in a `Failure` outcome.
    ///
    /// Timeouts are recorded as plain `"timeout"`; every other kind keeps its
    /// original cause after the kind prefix.
    pub fn reason(&self) -> String {
        match self {
            BackupError::Timeout(_) => "timeout".to_string(),
            other => other.to_string(),
        }
    }
}

/// Errors reported by an object-store adapter.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Connection, TLS or request construction failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The store answered with an unexpected status.
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// The stored object does not match what was uploaded.
    #[error("verification failed: {0}")]
    Verification(String),
}
