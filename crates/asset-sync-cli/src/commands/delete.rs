use anyhow::{Context, Result};
use asset_sync::{AssetStore, RepoType, RepositoryRef};
use tracing::info;

use crate::config::AppConfig;

/// The configured repository with this identity, or a bare reference to it.
pub fn repository_ref(config: &AppConfig, namespace: &str, name: &str) -> RepositoryRef {
    config
        .repositories
        .iter()
        .find(|entry| entry.namespace == namespace && entry.name == name)
        .map(|entry| entry.to_repository_ref())
        .unwrap_or_else(|| RepositoryRef::new(namespace, name, "", RepoType::default()))
}

pub async fn run(
    store: &dyn AssetStore,
    config: &AppConfig,
    namespace: &str,
    name: &str,
) -> Result<()> {
    let repo = repository_ref(config, namespace, name);

    store
        .delete_repository(&repo)
        .await
        .with_context(|| format!("failed to delete {repo}"))?;

    info!(repo = %repo, "repository deleted");
    println!("Deleted {repo}.");
    Ok(())
}
