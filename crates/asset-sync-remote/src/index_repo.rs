use std::collections::BTreeMap;

use asset_sync::{
    Package, PackageVersion, RepoSource, RepositoryRef, SourceError, VersionFiles, sha256_hex,
    unescape_package_name,
};
use tracing::debug;
use url::Url;

use crate::archive;
use crate::client::{HttpClient, join_path, parse_repo_url};

const README: &str = "readme";
const VALUES: &str = "values";
const SCHEMA: &str = "schema";

/// A repository described by an `index.yaml` document.
///
/// The index is fetched once when the source is opened; checksum and listing
/// both work from that snapshot.
pub struct IndexRepo {
    repo: RepositoryRef,
    base_url: Url,
    content: Vec<u8>,
    client: HttpClient,
}

impl IndexRepo {
    /// Validate the repository URL and download its index.
    pub async fn fetch(client: HttpClient, repo: RepositoryRef) -> Result<Self, SourceError> {
        let base_url = parse_repo_url(&repo.url)?;
        let index_url = join_path(&base_url, &["index.yaml"]);

        debug!(repo = %repo, url = %index_url, "fetching repository index");
        let content = client
            .get_bytes(index_url.as_str(), repo.auth_header.as_deref())
            .await?;

        Ok(Self {
            repo: RepositoryRef {
                url: base_url.to_string(),
                ..repo
            },
            base_url,
            content,
            client,
        })
    }

    /// Build a source from an index that was already downloaded.
    pub fn from_index(
        client: HttpClient,
        repo: RepositoryRef,
        content: Vec<u8>,
    ) -> Result<Self, SourceError> {
        let base_url = parse_repo_url(&repo.url)?;
        Ok(Self {
            repo,
            base_url,
            content,
            client,
        })
    }

    /// Where the archive of `version` lives. Relative locations are resolved
    /// against the repository base path.
    pub fn tarball_url(&self, version: &PackageVersion) -> Result<String, SourceError> {
        let source = version.canonical_url().ok_or_else(|| {
            SourceError::Parse(format!("version {} has no archive URL", version.version))
        })?;

        match Url::parse(source) {
            Ok(absolute) => Ok(absolute.to_string()),
            Err(_) => Ok(join_path(&self.base_url, &[source]).to_string()),
        }
    }

    async fn fetch_tarball(&self, version: &PackageVersion) -> Result<Vec<u8>, SourceError> {
        let url = self.tarball_url(version)?;
        self.client
            .get_bytes(&url, self.repo.auth_header.as_deref())
            .await
    }
}

/// Top-level directory of a package inside its archive.
///
/// `foo%2Fbar` unescapes to `foo/bar`, whose archive root is `bar`.
pub fn chart_root(name: &str) -> Result<String, SourceError> {
    let decoded = unescape_package_name(name)
        .map_err(|e| SourceError::Parse(format!("cannot decode package name {name}: {e}")))?;

    Ok(decoded
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_owned())
}

#[async_trait::async_trait]
impl RepoSource for IndexRepo {
    fn repository(&self) -> &RepositoryRef {
        &self.repo
    }

    async fn checksum(&self) -> Result<String, SourceError> {
        Ok(sha256_hex(&self.content))
    }

    async fn list_packages(&self) -> Result<Vec<Package>, SourceError> {
        let index = asset_sync::index::parse(&self.content)?;
        let packages = asset_sync::index::packages_from_index(&index, &self.repo.name);

        if packages.is_empty() {
            return Err(SourceError::Parse("no packages in repository index".into()));
        }

        Ok(packages)
    }

    async fn fetch_version_files(
        &self,
        name: &str,
        version: &PackageVersion,
    ) -> Result<VersionFiles, SourceError> {
        let root = chart_root(name)?;
        let tarball = self.fetch_tarball(version).await?;

        let wanted = [
            (README, format!("{root}/README.md")),
            (VALUES, format!("{root}/values.yaml")),
            (SCHEMA, format!("{root}/values.schema.json")),
        ];
        let mut files = archive::extract_files(tarball.as_slice(), &wanted)?;

        Ok(VersionFiles {
            readme: files.remove(README),
            values: files.remove(VALUES),
            schema: files.remove(SCHEMA),
        })
    }

    async fn fetch_directory_files(
        &self,
        name: &str,
        version: &PackageVersion,
        directory: &str,
    ) -> Result<BTreeMap<String, String>, SourceError> {
        let root = chart_root(name)?;
        let tarball = self.fetch_tarball(version).await?;

        archive::extract_directory(tarball.as_slice(), &format!("{root}/{directory}"))
    }
}

#[cfg(test)]
mod tests {
    use asset_sync::RepoType;

    use crate::client::HttpClientConfig;

    use super::*;

    fn source(url: &str) -> IndexRepo {
        let client = HttpClient::new(&HttpClientConfig {
            additional_ca: None,
            ..Default::default()
        })
        .unwrap();
        let repo = RepositoryRef::new("default", "stable", url, RepoType::Helm);
        IndexRepo::from_index(client, repo, b"entries: {}".to_vec()).unwrap()
    }

    fn version(url: &str) -> PackageVersion {
        PackageVersion {
            version: "1.0.0".into(),
            app_version: None,
            created: None,
            digest: "d".into(),
            urls: vec![url.into()],
        }
    }

    #[test]
    fn chart_root_uses_last_unescaped_segment() {
        assert_eq!(chart_root("foo%2Fbar").unwrap(), "bar");
        assert_eq!(chart_root("wordpress").unwrap(), "wordpress");
        assert_eq!(chart_root("a%2Fb%2Fc").unwrap(), "c");
    }

    #[test]
    fn absolute_tarball_url_is_used_as_is() {
        let repo = source("https://charts.example.com/stable");
        let url = repo
            .tarball_url(&version("https://cdn.example.com/pkg-1.0.0.tgz"))
            .unwrap();
        assert_eq!(url, "https://cdn.example.com/pkg-1.0.0.tgz");
    }

    #[test]
    fn relative_tarball_url_is_joined_with_base_path() {
        let repo = source("https://charts.example.com/stable/");
        let url = repo.tarball_url(&version("pkg-1.0.0.tgz")).unwrap();
        assert_eq!(url, "https://charts.example.com/stable/pkg-1.0.0.tgz");

        let nested = repo.tarball_url(&version("charts/pkg-1.0.0.tgz")).unwrap();
        assert_eq!(nested, "https://charts.example.com/stable/charts/pkg-1.0.0.tgz");
    }

    #[test]
    fn version_without_urls_cannot_resolve() {
        let repo = source("https://charts.example.com");
        let mut v = version("x.tgz");
        v.urls.clear();
        assert!(matches!(repo.tarball_url(&v), Err(SourceError::Parse(_))));
    }

    #[test]
    fn malformed_repository_url_is_a_config_error() {
        let client = HttpClient::new(&HttpClientConfig {
            additional_ca: None,
            ..Default::default()
        })
        .unwrap();
        let repo = RepositoryRef::new("default", "bad", "not a url", RepoType::Helm);
        let result = IndexRepo::from_index(client, repo, Vec::new());
        assert!(matches!(result, Err(SourceError::Config(_))));
    }

    #[tokio::test]
    async fn empty_index_has_no_packages() {
        let repo = source("https://charts.example.com");
        let result = repo.list_packages().await;
        assert!(matches!(result, Err(SourceError::Parse(_))));
    }
}
