mod commands;
mod config;
mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use asset_sync::AssetStore;
use asset_sync_store::SqliteAssetStore;
use clap::{Parser, Subcommand};
use tracing::{debug, warn};

use crate::commands::sync::SyncArgs;
use crate::config::{AppConfig, DEFAULT_NAMESPACE};

#[derive(Parser)]
#[command(name = "asset-syncer", version)]
#[command(about = "Sync package repository metadata, icons and files into a local store")]
struct Cli {
    /// Config file (defaults to ~/.config/asset-syncer/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// SQLite database to write into
    #[arg(long, global = true, env = "ASSET_SYNCER_DATABASE")]
    database: Option<PathBuf>,
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sync one repository, or every configured repository
    Sync(SyncArgs),
    /// Delete a repository and everything stored for it
    Delete {
        /// Repository name
        name: String,
        /// Namespace the repository belongs to
        #[arg(long, default_value = DEFAULT_NAMESPACE)]
        namespace: String,
    },
    /// Forget all checksums so the next sync re-processes every repository
    InvalidateCache,
}

fn database_path(flag: Option<&Path>, config: &AppConfig) -> Result<PathBuf> {
    let path = match flag.or(config.database.as_deref()) {
        Some(path) => path.to_path_buf(),
        None => config::default_database_path().context("could not determine data directory")?,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    Ok(path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::setup_logging(cli.verbose);

    let app_config = config::load_config(cli.config.as_deref())?;
    let db_path = database_path(cli.database.as_deref(), &app_config)?;
    debug!(path = %db_path.display(), "opening database");

    let store = Arc::new(
        SqliteAssetStore::open(&db_path)
            .with_context(|| format!("failed to open database at {}", db_path.display()))?,
    );
    store.init().await.context("failed to initialize database")?;

    let result = match cli.command {
        Command::Sync(args) => commands::sync::run(Arc::clone(&store), &app_config, args).await,
        Command::Delete { name, namespace } => {
            commands::delete::run(store.as_ref(), &app_config, &namespace, &name).await
        }
        Command::InvalidateCache => commands::invalidate_cache::run(store.as_ref()).await,
    };

    if let Err(e) = store.close().await {
        warn!(error = %e, "failed to close database");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn delete_defaults_namespace() {
        let cli = Cli::try_parse_from(["asset-syncer", "delete", "stable"]).unwrap();
        match cli.command {
            Command::Delete { name, namespace } => {
                assert_eq!(name, "stable");
                assert_eq!(namespace, "default");
            }
            _ => panic!("expected delete"),
        }
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::try_parse_from([
            "asset-syncer",
            "invalidate-cache",
            "--database",
            "/tmp/assets.db",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.database.as_deref(), Some(Path::new("/tmp/assets.db")));
        assert!(matches!(cli.command, Command::InvalidateCache));
    }

    #[test]
    fn database_flag_wins_over_config() {
        let dir = tempfile::tempdir().unwrap();
        let from_flag = dir.path().join("flag/assets.db");
        let config = AppConfig {
            database: Some(dir.path().join("config.db")),
            ..Default::default()
        };

        assert_eq!(
            database_path(Some(from_flag.as_path()), &config).unwrap(),
            from_flag
        );
        assert!(dir.path().join("flag").is_dir());
        assert_eq!(
            database_path(None, &config).unwrap(),
            dir.path().join("config.db")
        );
    }
}
