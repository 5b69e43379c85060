use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use repo_maintenance::config::LoggingConfig;
use repo_maintenance::{
    BackupOrchestrator, BackupResult, Config, CoverageReport, GitHubClient, PatternSet,
    RepositoryHost, ReportGenerator, S3Credentials, S3Store,
};

#[derive(Parser)]
#[command(name = "repo-maintenance")]
#[command(about = "Back up organization repositories to S3-compatible storage")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up every repository matching the configured patterns
    Backup {
        /// Organization (overrides backup.organization)
        #[arg(short, long)]
        organization: Option<String>,

        /// Back up even when a backup already exists
        #[arg(long)]
        force: bool,
    },

    /// Report backup coverage without changing anything
    Report {
        /// Organization (overrides backup.organization)
        #[arg(short, long)]
        organization: Option<String>,
    },

    /// List repositories that would be backed up
    List {
        /// Organization (overrides backup.organization)
        #[arg(short, long)]
        organization: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    init_logging(cli.verbose, &config.logging)?;
    info!("Starting repo-maintenance v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Backup {
            organization,
            force,
        } => cmd_backup(organization.as_deref(), force, cli.json, &config).await,
        Commands::Report { organization } => {
            cmd_report(organization.as_deref(), cli.json, &config).await
        }
        Commands::List { organization } => {
            cmd_list(organization.as_deref(), cli.json, &config).await
        }
    }
}

/// Initialize logging; RUST_LOG wins over --verbose, which wins over the config level
fn init_logging(verbose: bool, logging: &LoggingConfig) -> Result<()> {
    let default_level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .with_context(|| format!("Invalid log level: {}", default_level))?;

    // stdout is reserved for command output
    let (json_layer, compact_layer) = if logging.format == "json" {
        (Some(fmt::layer().json().with_writer(std::io::stderr)), None)
    } else {
        (None, Some(fmt::layer().compact().with_writer(std::io::stderr)))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(compact_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(())
}

/// Load configuration from specified path or default location
fn load_config(config_path: Option<&std::path::Path>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load(path),
        None => Config::load_default(),
    }
}

fn storage_from_config(config: &Config) -> Result<Arc<S3Store>> {
    let credentials = S3Credentials::from_env()?;
    let store = S3Store::new(&config.backup.s3, credentials)?;
    Ok(Arc::new(store))
}

fn host_from_config(config: &Config) -> Result<Arc<GitHubClient>> {
    let client = GitHubClient::new(&config.github).context("Failed to set up GitHub access")?;
    Ok(Arc::new(client))
}

/// Run a backup pass
async fn cmd_backup(
    organization: Option<&str>,
    force: bool,
    json: bool,
    config: &Config,
) -> Result<ExitCode> {
    if !config.backup.enabled {
        warn!("Backup is disabled in configuration (backup.enabled = false); nothing to do");
        return Ok(ExitCode::SUCCESS);
    }

    let organization = config.resolve_organization(organization)?;
    config.validate()?;

    let host = host_from_config(config)?;
    let store = storage_from_config(config)?;
    let orchestrator = BackupOrchestrator::new(config, host, store)?;

    let result = orchestrator
        .run(&organization, !force)
        .await
        .with_context(|| format!("Backup of {} aborted", organization))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_backup_result(&organization, &result);
    }

    if result.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        error!("{} repositories failed to back up", result.failed.len());
        Ok(ExitCode::FAILURE)
    }
}

/// Print coverage for the matched repositories
async fn cmd_report(organization: Option<&str>, json: bool, config: &Config) -> Result<ExitCode> {
    let organization = config.resolve_organization(organization)?;
    config.validate()?;

    let host = host_from_config(config)?;
    let store = storage_from_config(config)?;
    let generator = ReportGenerator::new(config, host, store)?;

    let report = generator
        .generate(&organization)
        .await
        .with_context(|| format!("Report for {} aborted", organization))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_coverage_report(&report);
    }

    Ok(ExitCode::SUCCESS)
}

/// List the repositories the configured patterns select
async fn cmd_list(organization: Option<&str>, json: bool, config: &Config) -> Result<ExitCode> {
    let organization = config.resolve_organization(organization)?;
    let patterns = PatternSet::compile(&config.backup.patterns)?;

    let host = host_from_config(config)?;
    let repositories = host.list_repositories(&organization).await?;
    let candidates = patterns.filter(&repositories);

    if json {
        println!("{}", serde_json::to_string_pretty(&candidates)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "Patterns ({}): {}",
        patterns.len(),
        patterns.sources().collect::<Vec<_>>().join(", ")
    );
    println!(
        "Repositories ({} of {} in {}):",
        candidates.len(),
        repositories.len(),
        organization
    );
    for repo in &candidates {
        println!("  📁 {}", repo.full_name);
    }
    if patterns.is_empty() {
        println!("\n💡 Tip: no backup.patterns configured, so nothing is selected");
    }

    Ok(ExitCode::SUCCESS)
}

fn print_backup_result(organization: &str, result: &BackupResult) {
    println!("\n📦 Backup of {} complete", organization);
    println!("   📊 Total repositories: {}", result.total_repos);
    println!("   ✅ Successful: {}", result.successful.len());
    println!("   ❌ Failed: {}", result.failed.len());
    println!("   ⏭️  Skipped: {}", result.skipped.len());

    if !result.failed.is_empty() {
        println!("\n🔍 Failed repositories:");
        for (repo, reason) in &result.failed {
            println!("   ❌ {}: {}", repo.full_name, reason);
        }
    }
}

fn print_coverage_report(report: &CoverageReport) {
    println!("\n📊 Backup report for {}", report.organization);
    println!("   Total repositories: {}", report.total_repos);
    println!("   Repositories with backups: {}", report.repos_with_backups);
    println!(
        "   Repositories without backups: {}",
        report.repos_without_backups()
    );
    println!("   Total backup size: {:.2} GB", report.total_backup_size_gb());

    if !report.probe_errors.is_empty() {
        println!("\n⚠️  Could not check:");
        for (full_name, reason) in &report.probe_errors {
            println!("   {}: {}", full_name, reason);
        }
    }
}
