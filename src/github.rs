use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use octocrab::models::Repository;
use octocrab::Octocrab;
use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

use crate::config::GitHubConfig;
use crate::discovery::{RepositoryHost, RepositoryRef};
use crate::error::{BackupError, FatalError};
use crate::git::GitClient;

/// GitHub client wrapper with authentication management
pub struct GitHubClient {
    client: Octocrab,
    git: GitClient,
}

/// GitHub authentication strategies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStrategy {
    /// Token set in the configuration file
    ConfigToken,
    /// Use GitHub CLI authentication
    GitHubCLI,
    /// Use environment variable token
    EnvironmentToken,
}

impl GitHubClient {
    /// Create a new GitHub client with automatic authentication
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let (auth_strategy, token) = Self::detect_authentication(config)?;

        info!("Using authentication strategy: {:?}", auth_strategy);

        let client = Octocrab::builder()
            .personal_token(token.clone())
            .build()
            .context("Failed to create GitHub client")?;

        Ok(Self {
            client,
            git: GitClient::new(Some(token)),
        })
    }

    /// Create a client against a custom API base URI (GitHub Enterprise, tests)
    pub fn with_base_uri(token: Option<String>, base_uri: &str) -> Result<Self> {
        let mut builder = Octocrab::builder()
            .base_uri(base_uri)
            .context("Invalid GitHub API base URI")?;
        if let Some(token) = &token {
            builder = builder.personal_token(token.clone());
        }
        let client = builder.build().context("Failed to create GitHub client")?;

        Ok(Self {
            client,
            git: GitClient::new(token),
        })
    }

    /// Detect and obtain GitHub authentication
    fn detect_authentication(config: &GitHubConfig) -> Result<(AuthStrategy, String)> {
        if let Some(token) = config.token.as_ref().filter(|t| !t.trim().is_empty()) {
            return Ok((AuthStrategy::ConfigToken, token.trim().to_string()));
        }

        match config.auth_method.as_str() {
            "auto" => {
                // Try environment token first (CI), then GitHub CLI
                if let Ok(token) = Self::try_environment_token() {
                    Ok((AuthStrategy::EnvironmentToken, token))
                } else if let Ok(token) = Self::try_github_cli() {
                    Ok((AuthStrategy::GitHubCLI, token))
                } else {
                    Err(anyhow!(
                        "No GitHub authentication found. Please either:\n\
                         1. Set GITHUB_TOKEN environment variable\n\
                         2. Install and authenticate GitHub CLI: gh auth login\n\
                         3. Set github.token in the configuration file"
                    ))
                }
            }
            "gh_cli" => {
                let token = Self::try_github_cli()
                    .context("GitHub CLI authentication failed. Run: gh auth login")?;
                Ok((AuthStrategy::GitHubCLI, token))
            }
            "token" => {
                let token = Self::try_environment_token()
                    .context("GITHUB_TOKEN environment variable not found or invalid")?;
                Ok((AuthStrategy::EnvironmentToken, token))
            }
            other => Err(anyhow!("Unknown auth method: {}", other)),
        }
    }

    /// Try to get token from GitHub CLI
    fn try_github_cli() -> Result<String> {
        debug!("Attempting GitHub CLI authentication");

        let token_output = Command::new("gh")
            .args(["auth", "token"])
            .output()
            .context("Failed to run GitHub CLI (is gh installed?)")?;

        if !token_output.status.success() {
            return Err(anyhow!(
                "Failed to retrieve token from GitHub CLI: {}",
                String::from_utf8_lossy(&token_output.stderr)
            ));
        }

        let token = String::from_utf8(token_output.stdout)
            .context("GitHub CLI token is not valid UTF-8")?
            .trim()
            .to_string();

        if token.is_empty() {
            return Err(anyhow!("GitHub CLI returned empty token"));
        }

        debug!("Successfully obtained token from GitHub CLI");
        Ok(token)
    }

    /// Try to get token from environment variable
    fn try_environment_token() -> Result<String> {
        debug!("Attempting environment variable authentication");

        let token = env::var("GITHUB_TOKEN").context("GITHUB_TOKEN environment variable not set")?;

        if token.is_empty() {
            return Err(anyhow!("GITHUB_TOKEN is empty"));
        }

        if !token.starts_with("ghp_")
            && !token.starts_with("gho_")
            && !token.starts_with("ghs_")
            && !token.starts_with("github_pat_")
        {
            warn!("GITHUB_TOKEN doesn't look like a valid GitHub token (should start with ghp_, gho_, ghs_ or github_pat_)");
        }

        debug!("Successfully found GITHUB_TOKEN environment variable");
        Ok(token)
    }

    /// List repositories for a specific organization
    pub async fn list_organization_repositories(
        &self,
        org: &str,
    ) -> Result<Vec<RepositoryRef>, FatalError> {
        debug!("Fetching repositories for organization: {}", org);

        let mut repositories = Vec::new();
        let mut page = 1u8;

        loop {
            let page_repos = self
                .client
                .orgs(org)
                .list_repos()
                .per_page(100)
                .page(page)
                .send()
                .await
                .map_err(|e| classify_listing_error(org, e))?;

            let items = page_repos.items;
            if items.is_empty() {
                break;
            }

            repositories.extend(items.iter().map(|repo| to_repository_ref(org, repo)));

            // GitHub API pagination limit for u8
            if page >= 255 {
                warn!("Reached maximum pagination limit (255 pages) for org: {}", org);
                break;
            }
            page += 1;
        }

        info!(
            "Found {} repositories for organization: {}",
            repositories.len(),
            org
        );
        Ok(repositories)
    }
}

#[async_trait]
impl RepositoryHost for GitHubClient {
    async fn list_repositories(&self, organization: &str) -> Result<Vec<RepositoryRef>, FatalError> {
        self.list_organization_repositories(organization).await
    }

    async fn fetch_contents(
        &self,
        repo: &RepositoryRef,
        dest: &Path,
    ) -> Result<PathBuf, BackupError> {
        let target = dest.join(format!("{}.git", repo.name));
        self.git.clone_mirror(&repo.source_url, &target).await?;
        Ok(target)
    }

    fn provider_name(&self) -> &'static str {
        "GitHub"
    }
}

/// Convert an octocrab Repository to our RepositoryRef
fn to_repository_ref(org: &str, repo: &Repository) -> RepositoryRef {
    let mut reference = RepositoryRef::new(org, &repo.name);

    if let Some(full_name) = &repo.full_name {
        reference.full_name = full_name.clone();
    }
    if let Some(clone_url) = &repo.clone_url {
        reference.source_url = clone_url.to_string();
    }
    if let Some(branch) = &repo.default_branch {
        reference.default_branch = branch.clone();
    }

    reference
}

fn classify_listing_error(org: &str, err: octocrab::Error) -> FatalError {
    if let octocrab::Error::GitHub { source, .. } = &err {
        match source.status_code.as_u16() {
            404 => return FatalError::OrganizationNotFound(org.to_string()),
            401 | 403 => {
                return FatalError::Auth {
                    organization: org.to_string(),
                    reason: source.message.clone(),
                }
            }
            _ => {}
        }
    }

    FatalError::Listing {
        organization: org.to_string(),
        reason: err.to_string(),
    }
}
