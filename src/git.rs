use base64::prelude::*;
use std::path::Path;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, info};

use crate::error::BackupError;

/// Git CLI wrapper used to take complete mirror copies of remote repositories
#[derive(Clone)]
pub struct GitClient {
    token: Option<String>,
}

impl GitClient {
    /// Create a new Git client; `token` authenticates HTTPS remotes
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }

    /// Mirror-clone `url` into `dest` (which must not exist yet)
    pub async fn clone_mirror(&self, url: &str, dest: &Path) -> Result<(), BackupError> {
        info!("Cloning repository: {} -> {}", url, dest.display());

        let mut command = AsyncCommand::new("git");
        command
            .args(["clone", "--mirror", "--quiet", url])
            .arg(dest)
            .env("GIT_TERMINAL_PROMPT", "0");

        // Credentials travel through GIT_CONFIG_* so they never show up in
        // the process arguments or in error messages.
        for (key, value) in self.auth_env() {
            command.env(key, value);
        }

        let output = command
            .output()
            .await
            .map_err(|e| BackupError::Clone(format!("failed to execute git clone: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackupError::Clone(format!(
                "git clone failed: {}",
                stderr.trim()
            )));
        }

        self.verify_repository_integrity(dest).await?;

        debug!("Mirror clone complete: {}", dest.display());
        Ok(())
    }

    /// Environment entries that inject an Authorization header for HTTPS remotes
    fn auth_env(&self) -> Vec<(String, String)> {
        match &self.token {
            Some(token) => {
                let credentials = BASE64_STANDARD.encode(format!("x-access-token:{}", token));
                vec![
                    ("GIT_CONFIG_COUNT".to_string(), "1".to_string()),
                    ("GIT_CONFIG_KEY_0".to_string(), "http.extraHeader".to_string()),
                    (
                        "GIT_CONFIG_VALUE_0".to_string(),
                        format!("Authorization: Basic {}", credentials),
                    ),
                ]
            }
            None => Vec::new(),
        }
    }

    async fn verify_repository_integrity(&self, path: &Path) -> Result<(), BackupError> {
        let output = AsyncCommand::new("git")
            .args(["fsck", "--quick"])
            .current_dir(path)
            .output()
            .await
            .map_err(|e| BackupError::Clone(format!("failed to verify repository integrity: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackupError::Clone(format!(
                "repository integrity check failed: {}",
                stderr.trim()
            )));
        }

        Ok(())
    }
}
