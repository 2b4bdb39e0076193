//! Concurrent import of icons and per-version files.
//!
//! Work runs in two phases over a fixed pool of workers: every worker drains
//! the icon queue before it starts on the files queue. Each task touches one
//! persistence key, so tasks never coordinate with each other. A failing
//! task is logged and dropped; it never stops its siblings.

use std::collections::BTreeMap;
use std::sync::Arc;

use asset_sync::{
    AssetStore, ImportReport, Package, PackageFiles, PackageVersion, RepoSource, SourceError,
    StoreError, VersionDecision, check_version, files_id,
};
use reqwest::header::CONTENT_TYPE;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::client::HttpClient;
use crate::icon::{IconError, normalize_icon};

/// Workers used when none are configured.
pub const DEFAULT_WORKERS: usize = 10;

#[derive(Debug, Clone)]
pub struct ImporterConfig {
    /// Number of concurrent workers; also the capacity of each task queue.
    pub workers: usize,
    /// Directory inside each package archive whose files are imported as custom files.
    pub custom_directory: Option<String>,
}

impl Default for ImporterConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            custom_directory: None,
        }
    }
}

/// Failure of a single import task.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Icon(#[from] IconError),

    #[error("icon conversion did not finish: {0}")]
    Interrupted(String),
}

/// Import the icon of one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconJob {
    pub package_id: String,
    pub name: String,
    pub icon: Option<String>,
}

impl From<&Package> for IconJob {
    fn from(package: &Package) -> Self {
        Self {
            package_id: package.id.clone(),
            name: package.name.clone(),
            icon: package.icon.clone(),
        }
    }
}

/// Import the files of one package version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileJob {
    pub package_id: String,
    /// Escaped package name, as the repository source expects it.
    pub name: String,
    pub version: PackageVersion,
}

/// Order the files tasks of `packages`: the latest version of every package
/// comes first, followed by all older versions in package order.
pub fn schedule_file_jobs(packages: &[Package]) -> Vec<FileJob> {
    let job = |package: &Package, version: &PackageVersion| FileJob {
        package_id: package.id.clone(),
        name: package.name.clone(),
        version: version.clone(),
    };

    let latest = packages
        .iter()
        .filter_map(|p| p.versions.first().map(|v| job(p, v)));
    let older = packages
        .iter()
        .flat_map(|p| p.versions.iter().skip(1).map(move |v| job(p, v)));

    latest.chain(older).collect()
}

/// Drives icon and files imports for a repository's packages.
pub struct FileImporter {
    store: Arc<dyn AssetStore>,
    client: HttpClient,
    config: ImporterConfig,
}

impl FileImporter {
    pub fn new(store: Arc<dyn AssetStore>, client: HttpClient, config: ImporterConfig) -> Self {
        Self {
            store,
            client,
            config,
        }
    }

    pub fn config(&self) -> &ImporterConfig {
        &self.config
    }

    /// Import icons, then files, for `packages`. Returns once every task
    /// has been consumed and every worker has finished.
    pub async fn import(&self, packages: &[Package], source: Arc<dyn RepoSource>) -> ImportReport {
        let workers = self.config.workers.max(1);
        let (icon_tx, icon_rx) = flume::bounded::<IconJob>(workers);
        let (files_tx, files_rx) = flume::bounded::<FileJob>(workers);

        let context = Arc::new(TaskContext {
            store: Arc::clone(&self.store),
            client: self.client.clone(),
            source,
            custom_directory: self.config.custom_directory.clone(),
        });

        debug!(workers, "starting import workers");
        let mut pool = JoinSet::new();
        for _ in 0..workers {
            pool.spawn(run_worker(
                Arc::clone(&context),
                icon_rx.clone(),
                files_rx.clone(),
            ));
        }
        drop(icon_rx);
        drop(files_rx);

        for package in packages {
            if icon_tx.send_async(IconJob::from(package)).await.is_err() {
                break;
            }
        }
        // Closing the icon queue moves workers on to files once it is drained.
        drop(icon_tx);

        for job in schedule_file_jobs(packages) {
            if files_tx.send_async(job).await.is_err() {
                break;
            }
        }
        drop(files_tx);

        let mut report = ImportReport::default();
        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(partial) => report += partial,
                Err(e) => error!(error = %e, "import worker stopped unexpectedly"),
            }
        }
        report
    }
}

struct TaskContext {
    store: Arc<dyn AssetStore>,
    client: HttpClient,
    source: Arc<dyn RepoSource>,
    custom_directory: Option<String>,
}

enum IconOutcome {
    Imported,
    NoIcon,
}

enum FilesOutcome {
    Imported,
    AlreadyPresent,
}

async fn run_worker(
    context: Arc<TaskContext>,
    icons: flume::Receiver<IconJob>,
    files: flume::Receiver<FileJob>,
) -> ImportReport {
    let mut report = ImportReport::default();

    while let Ok(job) = icons.recv_async().await {
        debug!(name = %job.name, "importing icon");
        match context.import_icon(&job).await {
            Ok(IconOutcome::Imported) => report.icons_imported += 1,
            Ok(IconOutcome::NoIcon) => report.icons_skipped += 1,
            Err(e) => {
                error!(name = %job.name, error = %e, "failed to import icon");
                report.icons_failed += 1;
            }
        }
    }

    while let Ok(job) = files.recv_async().await {
        debug!(name = %job.name, version = %job.version.version, "importing readme and values");
        match context.import_files(&job).await {
            Ok(FilesOutcome::Imported) => report.files_imported += 1,
            Ok(FilesOutcome::AlreadyPresent) => report.files_skipped += 1,
            Err(e) => {
                error!(
                    name = %job.name,
                    version = %job.version.version,
                    error = %e,
                    "failed to import files"
                );
                report.files_failed += 1;
            }
        }
    }

    report
}

impl TaskContext {
    async fn import_icon(&self, job: &IconJob) -> Result<IconOutcome, ImportError> {
        let Some(icon_url) = job.icon.as_deref() else {
            info!(name = %job.name, "icon not found");
            return Ok(IconOutcome::NoIcon);
        };

        let repo = self.source.repository();
        let response = self
            .client
            .get(icon_url, repo.auth_header.as_deref())
            .await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        let data = response
            .bytes()
            .await
            .map_err(|e| SourceError::Network(format!("failed to read icon {icon_url}: {e}")))?;

        let icon = tokio::task::spawn_blocking(move || normalize_icon(&data, &content_type))
            .await
            .map_err(|e| ImportError::Interrupted(e.to_string()))??;

        self.store
            .update_icon(repo, &icon.data, icon.content_type, &job.package_id)
            .await?;
        Ok(IconOutcome::Imported)
    }

    async fn import_files(&self, job: &FileJob) -> Result<FilesOutcome, ImportError> {
        let repo = self.source.repository();
        let name = &job.name;
        let version = &job.version.version;
        let id = files_id(&job.package_id, version);

        let decision = check_version(self.store.as_ref(), repo, &id, &job.version.digest).await?;
        if decision == VersionDecision::Present {
            debug!(name = %name, version = %version, "skipping existing files");
            return Ok(FilesOutcome::AlreadyPresent);
        }
        debug!(name = %name, version = %version, "fetching files");

        let files = self.source.fetch_version_files(name, &job.version).await?;
        let custom_files = match &self.custom_directory {
            Some(directory) => {
                self.source
                    .fetch_directory_files(name, &job.version, directory)
                    .await?
            }
            None => BTreeMap::new(),
        };

        if files.readme.is_none() {
            info!(name = %name, version = %version, "README.md not found");
        }
        if files.values.is_none() {
            info!(name = %name, version = %version, "values.yaml not found");
        }
        if files.schema.is_none() {
            info!(name = %name, version = %version, "values.schema.json not found");
        }

        let package_files = PackageFiles {
            id,
            digest: job.version.digest.clone(),
            readme: files.readme,
            values: files.values,
            schema: files.schema,
            custom_files,
        };

        self.store
            .insert_files(repo, &job.package_id, &package_files)
            .await?;
        Ok(FilesOutcome::Imported)
    }
}
