use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use asset_sync::{RepoType, RepositoryRef, SyncOutcome};
use asset_sync_remote::client::{DEFAULT_ADDITIONAL_CA, DEFAULT_TIMEOUT};
use asset_sync_remote::{
    DEFAULT_WORKERS, FileImporter, HttpClient, HttpClientConfig, ImporterConfig, Syncer,
    open_source,
};
use asset_sync_store::SqliteAssetStore;
use clap::Args;
use tracing::error;

use crate::config::{AppConfig, DEFAULT_NAMESPACE};

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Repository name; every configured repository is synced when omitted
    #[arg(requires = "url")]
    pub name: Option<String>,
    /// Repository URL
    pub url: Option<String>,
    /// Namespace the repository belongs to
    #[arg(long, default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,
    /// Repository type (helm or oci)
    #[arg(long = "type", default_value = "helm", value_parser = parse_repo_type)]
    pub repo_type: RepoType,
    /// Package names held by an OCI registry
    #[arg(long, value_delimiter = ',')]
    pub oci_repositories: Vec<String>,
    /// Authorization header sent with every request to the repository
    #[arg(long, env = "ASSET_SYNCER_AUTH_HEADER", hide_env_values = true)]
    pub auth_header: Option<String>,
    /// Number of concurrent import workers
    #[arg(long)]
    pub workers: Option<usize>,
    /// Archive directory whose files are imported alongside README and values
    #[arg(long)]
    pub custom_directory: Option<String>,
    /// Comment appended to the User-Agent header
    #[arg(long)]
    pub user_agent_comment: Option<String>,
}

fn parse_repo_type(s: &str) -> Result<RepoType, String> {
    RepoType::parse(s).ok_or_else(|| format!("unknown repository type {s:?} (expected helm or oci)"))
}

/// A repository to sync plus the package names an OCI registry needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub repo: RepositoryRef,
    pub oci_repositories: Vec<String>,
}

/// The repository named on the command line, or every configured one.
pub fn select_targets(config: &AppConfig, args: &SyncArgs) -> Result<Vec<Target>> {
    if let Some(name) = &args.name {
        let url = args
            .url
            .as_deref()
            .context("a repository URL is required together with its name")?;
        let mut repo = RepositoryRef::new(&args.namespace, name, url, args.repo_type);
        if let Some(header) = &args.auth_header {
            repo = repo.with_auth_header(header);
        }
        return Ok(vec![Target {
            repo,
            oci_repositories: args.oci_repositories.clone(),
        }]);
    }

    Ok(config
        .repositories
        .iter()
        .map(|entry| Target {
            repo: entry.to_repository_ref(),
            oci_repositories: entry.oci_repositories.clone(),
        })
        .collect())
}

pub fn importer_config(config: &AppConfig, args: &SyncArgs) -> ImporterConfig {
    ImporterConfig {
        workers: args.workers.or(config.workers).unwrap_or(DEFAULT_WORKERS),
        custom_directory: args
            .custom_directory
            .clone()
            .or_else(|| config.custom_directory.clone()),
    }
}

pub fn client_config(config: &AppConfig, args: &SyncArgs) -> HttpClientConfig {
    HttpClientConfig {
        timeout: DEFAULT_TIMEOUT,
        user_agent_comment: args
            .user_agent_comment
            .clone()
            .or_else(|| config.user_agent_comment.clone()),
        additional_ca: Some(
            config
                .additional_ca
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ADDITIONAL_CA)),
        ),
    }
}

/// Sync each target in turn. Fails when any repository fails.
pub async fn run(store: Arc<SqliteAssetStore>, config: &AppConfig, args: SyncArgs) -> Result<()> {
    let targets = select_targets(config, &args)?;
    if targets.is_empty() {
        anyhow::bail!(
            "no repositories to sync: pass NAME and URL or add [[repositories]] to the config file"
        );
    }

    let client = HttpClient::new(&client_config(config, &args))
        .context("failed to build HTTP client")?;
    let importer = FileImporter::new(
        store.clone(),
        client.clone(),
        importer_config(config, &args),
    );
    let syncer = Syncer::new(store, importer);

    let total = targets.len();
    let mut failed = 0usize;

    for target in targets {
        let repo = target.repo.clone();
        println!("Syncing {repo} from {}...", repo.url);

        match sync_target(&syncer, client.clone(), target).await {
            Ok(outcome) => print_outcome(&repo, &outcome),
            Err(e) => {
                error!(repo = %repo, error = %format!("{e:#}"), "sync failed");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {total} repositories failed to sync");
    }
    Ok(())
}

async fn sync_target(syncer: &Syncer, client: HttpClient, target: Target) -> Result<SyncOutcome> {
    let source = open_source(client, target.repo, target.oci_repositories)
        .await
        .context("failed to open repository")?;
    let outcome = syncer.sync(source).await?;
    Ok(outcome)
}

fn print_outcome(repo: &RepositoryRef, outcome: &SyncOutcome) {
    match outcome {
        SyncOutcome::Unchanged { .. } => println!("{repo} is up to date."),
        SyncOutcome::Synced {
            packages, report, ..
        } => {
            println!(
                "Synced {packages} packages from {repo}: {} files imported ({} unchanged, {} failed), {} icons imported ({} failed).",
                report.files_imported,
                report.files_skipped,
                report.files_failed,
                report.icons_imported,
                report.icons_failed,
            );
        }
    }
}
