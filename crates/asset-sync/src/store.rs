use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::model::{Package, PackageFiles, RepositoryRef};

/// Errors raised by a persistence backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("migration error: {0}")]
    Migration(String),
}

/// Persistent catalog the syncer writes into.
///
/// Implementations must tolerate concurrent calls: the importer issues
/// them from every worker at once, each on a disjoint key.
#[async_trait::async_trait]
pub trait AssetStore: Send + Sync {
    /// Prepare the backing storage (schema, connections).
    async fn init(&self) -> Result<(), StoreError>;

    /// Release resources held by the store.
    async fn close(&self) -> Result<(), StoreError>;

    /// Forget all recorded state so the next run re-processes everything.
    async fn invalidate_cache(&self) -> Result<(), StoreError>;

    /// Remove a repository and everything recorded for it.
    async fn delete_repository(&self, repo: &RepositoryRef) -> Result<(), StoreError>;

    /// Replace the package listing of a repository.
    async fn sync_packages(
        &self,
        repo: &RepositoryRef,
        packages: &[Package],
    ) -> Result<(), StoreError>;

    /// Whether `checksum` matches the last one recorded for `repo`.
    async fn repo_already_processed(
        &self,
        repo: &RepositoryRef,
        checksum: &str,
    ) -> Result<bool, StoreError>;

    /// Record a completed sync of `repo` at `checksum`.
    async fn update_last_check(
        &self,
        repo: &RepositoryRef,
        checksum: &str,
        checked_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn update_icon(
        &self,
        repo: &RepositoryRef,
        data: &[u8],
        content_type: &str,
        package_id: &str,
    ) -> Result<(), StoreError>;

    /// Whether files with this ID and digest are already stored.
    async fn files_exist(
        &self,
        repo: &RepositoryRef,
        files_id: &str,
        digest: &str,
    ) -> Result<bool, StoreError>;

    /// Insert the files of one version, replacing a row with the same ID.
    async fn insert_files(
        &self,
        repo: &RepositoryRef,
        package_id: &str,
        files: &PackageFiles,
    ) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
impl<T: AssetStore + ?Sized> AssetStore for Arc<T> {
    async fn init(&self) -> Result<(), StoreError> {
        (**self).init().await
    }

    async fn close(&self) -> Result<(), StoreError> {
        (**self).close().await
    }

    async fn invalidate_cache(&self) -> Result<(), StoreError> {
        (**self).invalidate_cache().await
    }

    async fn delete_repository(&self, repo: &RepositoryRef) -> Result<(), StoreError> {
        (**self).delete_repository(repo).await
    }

    async fn sync_packages(
        &self,
        repo: &RepositoryRef,
        packages: &[Package],
    ) -> Result<(), StoreError> {
        (**self).sync_packages(repo, packages).await
    }

    async fn repo_already_processed(
        &self,
        repo: &RepositoryRef,
        checksum: &str,
    ) -> Result<bool, StoreError> {
        (**self).repo_already_processed(repo, checksum).await
    }

    async fn update_last_check(
        &self,
        repo: &RepositoryRef,
        checksum: &str,
        checked_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        (**self).update_last_check(repo, checksum, checked_at).await
    }

    async fn update_icon(
        &self,
        repo: &RepositoryRef,
        data: &[u8],
        content_type: &str,
        package_id: &str,
    ) -> Result<(), StoreError> {
        (**self)
            .update_icon(repo, data, content_type, package_id)
            .await
    }

    async fn files_exist(
        &self,
        repo: &RepositoryRef,
        files_id: &str,
        digest: &str,
    ) -> Result<bool, StoreError> {
        (**self).files_exist(repo, files_id, digest).await
    }

    async fn insert_files(
        &self,
        repo: &RepositoryRef,
        package_id: &str,
        files: &PackageFiles,
    ) -> Result<(), StoreError> {
        (**self).insert_files(repo, package_id, files).await
    }
}
