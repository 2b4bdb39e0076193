use std::collections::BTreeMap;
use std::sync::Arc;

use crate::model::{Package, PackageVersion, RepositoryRef, VersionFiles};

/// Errors that can occur when talking to a remote repository.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("extraction error: {0}")]
    Extraction(String),

    #[error("checksum of {repository} failed: {reason}")]
    Checksum { repository: String, reason: String },
}

/// A remote package repository.
///
/// The two implementations (index documents and OCI registries) speak very
/// different protocols; callers only see this capability set.
#[async_trait::async_trait]
pub trait RepoSource: Send + Sync {
    /// The repository this source was opened for.
    fn repository(&self) -> &RepositoryRef;

    /// Digest over the wire payload describing the repository's current state.
    async fn checksum(&self) -> Result<String, SourceError>;

    /// Non-deprecated packages, ordered by ID.
    async fn list_packages(&self) -> Result<Vec<Package>, SourceError>;

    /// README, values and schema of one version. `name` is the escaped package name.
    async fn fetch_version_files(
        &self,
        name: &str,
        version: &PackageVersion,
    ) -> Result<VersionFiles, SourceError>;

    /// Every file under `{package root}/{directory}` in one version's archive.
    async fn fetch_directory_files(
        &self,
        name: &str,
        version: &PackageVersion,
        directory: &str,
    ) -> Result<BTreeMap<String, String>, SourceError>;
}

#[async_trait::async_trait]
impl<T: RepoSource + ?Sized> RepoSource for Arc<T> {
    fn repository(&self) -> &RepositoryRef {
        (**self).repository()
    }

    async fn checksum(&self) -> Result<String, SourceError> {
        (**self).checksum().await
    }

    async fn list_packages(&self) -> Result<Vec<Package>, SourceError> {
        (**self).list_packages().await
    }

    async fn fetch_version_files(
        &self,
        name: &str,
        version: &PackageVersion,
    ) -> Result<VersionFiles, SourceError> {
        (**self).fetch_version_files(name, version).await
    }

    async fn fetch_directory_files(
        &self,
        name: &str,
        version: &PackageVersion,
        directory: &str,
    ) -> Result<BTreeMap<String, String>, SourceError> {
        (**self).fetch_directory_files(name, version, directory).await
    }
}
