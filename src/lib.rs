//! repo-maintenance - Organization repository backups
//!
//! Discovers the repositories of a GitHub organization, selects a subset by
//! name pattern, and makes sure each selected repository has a backup archive
//! in S3-compatible object storage.
//!
//! ## Core Features
//!
//! - **Pattern Selection**: Regular-expression repository filters
//! - **Skip Existing**: Probe storage and skip repositories already backed up
//! - **Failure Isolation**: One repository failing never stops the run
//! - **Coverage Reports**: Read-only summary of what storage holds
//!
//! ## Modules
//!
//! - [`config`]: Configuration management and parsing
//! - [`matcher`]: Repository name pattern matching
//! - [`probe`]: Backup existence checks
//! - [`backup`]: Per-repository backup execution
//! - [`orchestrator`]: Run driver and result aggregation
//! - [`report`]: Backup coverage reports
//! - [`github`]: GitHub API integration and authentication
//! - [`storage`]: Object storage keys and the S3 adapter

pub mod archive;
pub mod backup;
pub mod config;
pub mod discovery;
pub mod error;
pub mod git;
pub mod github;
pub mod matcher;
pub mod orchestrator;
pub mod probe;
pub mod report;
pub mod storage;

pub use backup::{BackupExecutor, BackupOutcome, ExecutorOptions, KeyScheme};
pub use config::{Config, KeyLayout, ProbeErrorPolicy};
pub use discovery::{RepositoryHost, RepositoryRef};
pub use error::{BackupError, ConfigError, FatalError, StorageError};
pub use github::GitHubClient;
pub use matcher::PatternSet;
pub use orchestrator::{BackupOrchestrator, BackupResult};
pub use probe::{Existence, ExistenceProber};
pub use report::{CoverageReport, ReportGenerator};
pub use storage::{
    ExistenceInfo, ObjectMetadata, ObjectStore, ObjectSummary, S3Credentials, S3Store, StorageKey,
};
