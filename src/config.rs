use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    /// Backup task settings
    #[serde(default)]
    pub backup: BackupConfig,

    /// GitHub authentication settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backup task configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BackupConfig {
    /// Master switch for the backup task
    #[serde(default)]
    pub enabled: bool,

    /// Organization whose repositories are backed up
    pub organization: Option<String>,

    /// Repository name patterns (regular expressions)
    #[serde(default)]
    pub patterns: Vec<String>,

    /// Maximum repositories processed concurrently
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Per-repository deadline in seconds (0 disables)
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Storage key layout
    #[serde(default)]
    pub key_layout: KeyLayout,

    /// What to do when the existence probe fails during a skip check
    #[serde(default)]
    pub on_probe_error: ProbeErrorPolicy,

    /// Parent directory for temporary clones (system temp dir if unset)
    pub work_dir: Option<String>,

    /// Object storage location
    #[serde(default)]
    pub s3: S3Config,
}

/// S3-compatible storage location
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct S3Config {
    /// Bucket name (required)
    pub bucket: Option<String>,

    /// Bucket region
    #[serde(default = "default_region")]
    pub region: String,

    /// Key prefix for every backup object
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Custom endpoint for S3-compatible stores
    pub endpoint: Option<String>,

    /// Multipart part size in MiB; larger artifacts are uploaded in parts
    #[serde(default = "default_part_size_mb")]
    pub part_size_mb: u64,
}

/// GitHub configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitHubConfig {
    /// Authentication method
    #[serde(default = "default_auth_method")]
    pub auth_method: String, // "auto", "gh_cli", "token"

    /// Explicit token; takes precedence over auth_method
    pub token: Option<String>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"

    /// Log format
    #[serde(default = "default_log_format")]
    pub format: String, // "compact", "json"
}

/// Layout of backup object keys under the prefix
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeyLayout {
    /// `<org>/<name>.tar.gz`, overwritten by every backup
    #[default]
    Latest,
    /// `<org>/<name>/<name>-<YYYYMMDD>.tar.gz`, one object per UTC day
    Daily,
}

/// Skip-check behavior when the existence probe errors
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProbeErrorPolicy {
    /// Treat as not confirmed existing and back up anyway
    #[default]
    Proceed,
    /// Record the repository as failed
    Fail,
}

// Default value functions
fn default_max_parallel() -> usize {
    4
}
fn default_timeout() -> u64 {
    1800
}
fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_prefix() -> String {
    "backups/".to_string()
}
fn default_part_size_mb() -> u64 {
    16
}
fn default_auth_method() -> String {
    "auto".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "compact".to_string()
}

// Default implementations
impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            organization: None,
            patterns: Vec::new(),
            max_parallel: default_max_parallel(),
            timeout: default_timeout(),
            key_layout: KeyLayout::default(),
            on_probe_error: ProbeErrorPolicy::default(),
            work_dir: None,
            s3: S3Config::default(),
        }
    }
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: None,
            region: default_region(),
            prefix: default_prefix(),
            endpoint: None,
            part_size_mb: default_part_size_mb(),
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            auth_method: default_auth_method(),
            token: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl S3Config {
    /// Prefix with exactly one trailing slash
    pub fn normalized_prefix(&self) -> String {
        format!("{}/", self.prefix.trim_end_matches('/'))
    }

    /// Endpoint URL without trailing slash
    pub fn endpoint_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://s3.{}.amazonaws.com", self.region),
        }
    }
}

impl Config {
    /// Load configuration from the default location; a missing file is an error
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            anyhow::bail!(
                "Configuration file not found: {:?} (pass --config or create it)",
                config_path
            );
        }

        Self::load(&config_path)
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.expand_paths()?;

        Ok(config)
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("repo-maintenance").join("config.yml"))
    }

    /// Expand environment variables in the token and work directory
    pub fn expand_paths(&mut self) -> Result<()> {
        if let Some(token) = &self.github.token {
            self.github.token = Some(
                shellexpand::full(token)
                    .context("Failed to expand github.token")?
                    .into_owned(),
            );
        }

        if let Some(work_dir) = &self.backup.work_dir {
            self.backup.work_dir = Some(
                shellexpand::full(work_dir)
                    .context("Failed to expand backup.work_dir path")?
                    .into_owned(),
            );
        }

        Ok(())
    }

    /// Check the settings every backup or report run depends on
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.backup.s3.bucket {
            None => return Err(ConfigError::MissingSetting("backup.s3.bucket")),
            Some(bucket) if bucket.trim().is_empty() => {
                return Err(ConfigError::MissingSetting("backup.s3.bucket"))
            }
            Some(_) => {}
        }

        if self.backup.max_parallel == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "backup.max_parallel",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.backup.s3.part_size_mb < 5 {
            return Err(ConfigError::InvalidSetting {
                name: "backup.s3.part_size_mb",
                reason: "S3 multipart parts must be at least 5 MiB".to_string(),
            });
        }

        if self.backup.s3.prefix.trim_matches('/').is_empty() {
            return Err(ConfigError::InvalidSetting {
                name: "backup.s3.prefix",
                reason: "must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Organization from the command line, falling back to the config file
    pub fn resolve_organization(&self, cli_override: Option<&str>) -> Result<String, ConfigError> {
        cli_override
            .map(str::to_string)
            .or_else(|| self.backup.organization.clone())
            .filter(|org| !org.trim().is_empty())
            .ok_or(ConfigError::MissingSetting("backup.organization"))
    }

    /// Per-repository deadline, if enabled
    pub fn repository_timeout(&self) -> Option<std::time::Duration> {
        match self.backup.timeout {
            0 => None,
            secs => Some(std::time::Duration::from_secs(secs)),
        }
    }
}
