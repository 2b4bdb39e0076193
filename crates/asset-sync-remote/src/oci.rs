use std::collections::BTreeMap;

use asset_sync::{
    Package, PackageVersion, RepoSource, RepositoryRef, SourceError, VersionFiles, sha256_hex,
};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::client::{HttpClient, join_path, parse_repo_url};

/// Response of the OCI distribution tag listing endpoint,
/// `GET /v2/<name>/tags/list`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TagListing {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// An OCI registry holding a fixed, externally supplied set of packages.
///
/// Only the checksum is implemented: it covers the tag listings of the
/// configured packages, so pushing a new tag is detected but re-pushing an
/// existing tag is not. Listing and file retrieval return nothing until
/// manifest and blob fetching exist.
pub struct OciRegistry {
    repo: RepositoryRef,
    base_url: Url,
    repositories: Vec<String>,
    client: HttpClient,
}

impl OciRegistry {
    pub fn new(
        client: HttpClient,
        repo: RepositoryRef,
        repositories: Vec<String>,
    ) -> Result<Self, SourceError> {
        let base_url = parse_repo_url(&repo.url)?;
        Ok(Self {
            repo,
            base_url,
            repositories,
            client,
        })
    }

    /// `{scheme}://{host}/v2/{base path}/{package}/tags/list`
    pub fn tags_url(&self, package: &str) -> Url {
        let mut root = self.base_url.clone();
        root.set_path("/");
        join_path(
            &root,
            &["v2", self.base_url.path(), package, "tags", "list"],
        )
    }

    /// Fetch every configured package's tag listing, in configuration order,
    /// along with the raw payload it was parsed from. Stops at the first failure.
    pub async fn fetch_tag_listings(&self) -> Result<Vec<(TagListing, Vec<u8>)>, SourceError> {
        let mut listings = Vec::with_capacity(self.repositories.len());

        for package in &self.repositories {
            let url = self.tags_url(package);
            debug!(repo = %self.repo, url = %url, "fetching tag listing");

            let raw = self
                .client
                .get_bytes(url.as_str(), self.repo.auth_header.as_deref())
                .await?;
            let listing: TagListing = serde_json::from_slice(&raw).map_err(|e| {
                SourceError::Parse(format!("invalid tag listing for {package}: {e}"))
            })?;

            listings.push((listing, raw));
        }

        Ok(listings)
    }
}

#[async_trait::async_trait]
impl RepoSource for OciRegistry {
    fn repository(&self) -> &RepositoryRef {
        &self.repo
    }

    async fn checksum(&self) -> Result<String, SourceError> {
        let listings = self
            .fetch_tag_listings()
            .await
            .map_err(|e| SourceError::Checksum {
                repository: self.repo.to_string(),
                reason: e.to_string(),
            })?;

        let content: Vec<u8> = listings
            .into_iter()
            .flat_map(|(_, raw)| raw)
            .collect();
        Ok(sha256_hex(&content))
    }

    async fn list_packages(&self) -> Result<Vec<Package>, SourceError> {
        Ok(Vec::new())
    }

    async fn fetch_version_files(
        &self,
        _name: &str,
        _version: &PackageVersion,
    ) -> Result<VersionFiles, SourceError> {
        Ok(VersionFiles::default())
    }

    async fn fetch_directory_files(
        &self,
        _name: &str,
        _version: &PackageVersion,
        _directory: &str,
    ) -> Result<BTreeMap<String, String>, SourceError> {
        Ok(BTreeMap::new())
    }
}
