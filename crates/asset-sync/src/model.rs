use std::collections::BTreeMap;
use std::fmt;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Serialize};

/// Characters left untouched when a package name is escaped into a single
/// URL path segment. Everything else, including `/`, is percent-encoded.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b',')
    .remove(b';')
    .remove(b'=')
    .remove(b':')
    .remove(b'@');

/// Wire protocol spoken by a remote repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoType {
    /// Chart-museum style repository serving an `index.yaml` document.
    #[default]
    Helm,
    /// OCI distribution registry.
    Oci,
}

impl fmt::Display for RepoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Helm => write!(f, "helm"),
            Self::Oci => write!(f, "oci"),
        }
    }
}

impl RepoType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "helm" | "" => Some(Self::Helm),
            "oci" => Some(Self::Oci),
            _ => None,
        }
    }
}

/// A remote repository as configured for one sync run.
///
/// Identity is `(namespace, name)`; the remaining fields describe how to
/// reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub namespace: String,
    pub name: String,
    pub url: String,
    pub auth_header: Option<String>,
    pub repo_type: RepoType,
}

impl RepositoryRef {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
        repo_type: RepoType,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            url: url.into(),
            auth_header: None,
            repo_type,
        }
    }

    pub fn with_auth_header(mut self, auth_header: impl Into<String>) -> Self {
        let header = auth_header.into();
        self.auth_header = (!header.is_empty()).then_some(header);
        self
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Maintainer {
    pub name: String,
    pub email: Option<String>,
    pub url: Option<String>,
}

/// One published version of a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageVersion {
    pub version: String,
    pub app_version: Option<String>,
    pub created: Option<String>,
    /// Content digest; the authoritative change signal for this version.
    pub digest: String,
    /// Archive locations. The first one is canonical.
    pub urls: Vec<String>,
}

impl PackageVersion {
    pub fn canonical_url(&self) -> Option<&str> {
        self.urls.first().map(String::as_str)
    }
}

/// A package listed by a repository, with versions ordered newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// `{repository name}/{escaped package name}`.
    pub id: String,
    /// URL-escaped package name (`foo/bar` becomes `foo%2Fbar`).
    pub name: String,
    pub repository: String,
    pub icon: Option<String>,
    pub description: Option<String>,
    pub home: Option<String>,
    pub keywords: Vec<String>,
    pub sources: Vec<String>,
    pub maintainers: Vec<Maintainer>,
    pub category: Option<String>,
    pub deprecated: bool,
    pub versions: Vec<PackageVersion>,
}

impl Package {
    pub fn latest(&self) -> Option<&PackageVersion> {
        self.versions.first()
    }

    pub fn files_id(&self, version: &PackageVersion) -> String {
        files_id(&self.id, &version.version)
    }
}

/// The fixed files extracted from one version's archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionFiles {
    pub readme: Option<String>,
    pub values: Option<String>,
    pub schema: Option<String>,
}

/// Everything imported for one `(package, version)` pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageFiles {
    /// `{package id}-{version}`; the idempotency key together with `digest`.
    pub id: String,
    pub digest: String,
    pub readme: Option<String>,
    pub values: Option<String>,
    pub schema: Option<String>,
    /// Files from the configured custom directory, keyed by archive path.
    pub custom_files: BTreeMap<String, String>,
}

pub fn package_id(repo_name: &str, escaped_name: &str) -> String {
    format!("{repo_name}/{escaped_name}")
}

pub fn files_id(package_id: &str, version: &str) -> String {
    format!("{package_id}-{version}")
}

/// Escape a package name so it fits in a single URL path segment.
pub fn escape_package_name(name: &str) -> String {
    utf8_percent_encode(name, PATH_SEGMENT).to_string()
}

/// Reverse [`escape_package_name`]. Fails when the decoded bytes are not UTF-8.
pub fn unescape_package_name(name: &str) -> Result<String, std::str::Utf8Error> {
    percent_decode_str(name)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
}
