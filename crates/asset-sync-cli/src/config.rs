use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use asset_sync::{RepoType, RepositoryRef};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_NAMESPACE: &str = "default";

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    pub database: Option<PathBuf>,
    pub workers: Option<usize>,
    pub custom_directory: Option<String>,
    pub user_agent_comment: Option<String>,
    pub additional_ca: Option<PathBuf>,
    #[serde(default)]
    pub repositories: Vec<RepositoryEntry>,
}

/// A repository synced when no repository is named on the command line.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RepositoryEntry {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub name: String,
    pub url: String,
    #[serde(default, rename = "type")]
    pub repo_type: RepoType,
    pub auth_header: Option<String>,
    /// Package names held by an OCI registry.
    #[serde(default)]
    pub oci_repositories: Vec<String>,
}

impl RepositoryEntry {
    pub fn to_repository_ref(&self) -> RepositoryRef {
        let repo = RepositoryRef::new(&self.namespace, &self.name, &self.url, self.repo_type);
        match &self.auth_header {
            Some(header) => repo.with_auth_header(header),
            None => repo,
        }
    }
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_owned()
}

/// Config file path: `~/.config/asset-syncer/config.toml`
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("asset-syncer").join("config.toml"))
}

/// Database used when neither the command line nor the config names one.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("asset-syncer").join("assets.db"))
}

pub fn parse_config(contents: &str) -> Result<AppConfig, toml::de::Error> {
    toml::from_str(contents)
}

/// Load the configuration. An explicitly named file must exist and parse;
/// the default file falls back to defaults when missing or malformed.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        return parse_config(&contents)
            .with_context(|| format!("failed to parse config at {}", path.display()));
    }

    if let Some(path) = config_path()
        && let Ok(contents) = std::fs::read_to_string(&path)
    {
        match parse_config(&contents) {
            Ok(config) => return Ok(config),
            Err(e) => warn!(
                path = %path.display(),
                error = %e,
                "failed to parse config, using defaults"
            ),
        }
    }

    Ok(AppConfig::default())
}
