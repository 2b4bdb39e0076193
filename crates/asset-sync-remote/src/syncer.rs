use std::sync::Arc;

use asset_sync::{
    AssetStore, RepoDecision, RepoSource, RepositoryRef, SyncError, SyncOutcome, check_repository,
};
use chrono::Utc;
use tracing::{info, warn};

use crate::importer::FileImporter;

/// Runs the whole sync flow for one repository at a time.
pub struct Syncer {
    store: Arc<dyn AssetStore>,
    importer: FileImporter,
}

impl Syncer {
    pub fn new(store: Arc<dyn AssetStore>, importer: FileImporter) -> Self {
        Self { store, importer }
    }

    /// Checksum the repository, skip it when nothing changed since the last
    /// completed sync, otherwise replace its package metadata and import
    /// icons and files. The checksum is recorded only after the import.
    pub async fn sync(&self, source: Arc<dyn RepoSource>) -> Result<SyncOutcome, SyncError> {
        let repo = source.repository().clone();
        let checksum = source.checksum().await?;

        if check_repository(self.store.as_ref(), &repo, &checksum).await? == RepoDecision::Unchanged
        {
            info!(repo = %repo, checksum = %checksum, "skipping repository since there are no updates");
            return Ok(SyncOutcome::Unchanged { checksum });
        }

        let packages = source.list_packages().await?;
        info!(repo = %repo, packages = packages.len(), "syncing package metadata");
        self.store.sync_packages(&repo, &packages).await?;

        let report = self.importer.import(&packages, source).await;
        if report.failures() > 0 {
            warn!(
                repo = %repo,
                icons_failed = report.icons_failed,
                files_failed = report.files_failed,
                "some assets failed to import"
            );
        }

        self.store.update_last_check(&repo, &checksum, Utc::now()).await?;
        info!(
            repo = %repo,
            packages = packages.len(),
            files_imported = report.files_imported,
            files_skipped = report.files_skipped,
            icons_imported = report.icons_imported,
            "repository synced"
        );

        Ok(SyncOutcome::Synced {
            checksum,
            packages: packages.len(),
            report,
        })
    }

    /// Remove a repository and everything stored for it.
    pub async fn delete(&self, repo: &RepositoryRef) -> Result<(), SyncError> {
        self.store.delete_repository(repo).await?;
        info!(repo = %repo, "repository deleted");
        Ok(())
    }
}
