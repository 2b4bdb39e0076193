pub mod archive;
pub mod client;
pub mod icon;
pub mod importer;
pub mod index_repo;
pub mod oci;
pub mod syncer;

use std::sync::Arc;

use asset_sync::{RepoSource, RepoType, RepositoryRef, SourceError};

pub use client::{HttpClient, HttpClientConfig};
pub use icon::{IconError, NormalizedIcon, normalize_icon};
pub use importer::{
    DEFAULT_WORKERS, FileImporter, FileJob, IconJob, ImportError, ImporterConfig,
};
pub use index_repo::IndexRepo;
pub use oci::OciRegistry;
pub use syncer::Syncer;

/// Open the source matching `repo`'s type. Index repositories download their
/// index here; `oci_repositories` names the packages an OCI registry holds.
pub async fn open_source(
    client: HttpClient,
    repo: RepositoryRef,
    oci_repositories: Vec<String>,
) -> Result<Arc<dyn RepoSource>, SourceError> {
    match repo.repo_type {
        RepoType::Helm => Ok(Arc::new(IndexRepo::fetch(client, repo).await?)),
        RepoType::Oci => Ok(Arc::new(OciRegistry::new(client, repo, oci_repositories)?)),
    }
}
