use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::model::{Package, PackageFiles, PackageVersion, RepositoryRef, VersionFiles};
use crate::source::{RepoSource, SourceError};
use crate::store::{AssetStore, StoreError};

type RepoKey = (String, String);

fn key(repo: &RepositoryRef) -> RepoKey {
    (repo.namespace.clone(), repo.name.clone())
}

#[derive(Debug, Default)]
struct StoreState {
    checksums: HashMap<RepoKey, (String, DateTime<Utc>)>,
    packages: HashMap<RepoKey, Vec<Package>>,
    icons: HashMap<String, (Vec<u8>, String)>,
    files: HashMap<String, PackageFiles>,
    insert_order: Vec<String>,
}

/// In-memory store for testing. Records the order in which files arrive.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files IDs in the order `insert_files` received them.
    pub fn insert_order(&self) -> Vec<String> {
        self.state.lock().unwrap().insert_order.clone()
    }

    pub fn files(&self, files_id: &str) -> Option<PackageFiles> {
        self.state.lock().unwrap().files.get(files_id).cloned()
    }

    pub fn icon(&self, package_id: &str) -> Option<(Vec<u8>, String)> {
        self.state.lock().unwrap().icons.get(package_id).cloned()
    }

    pub fn packages(&self, repo: &RepositoryRef) -> Vec<Package> {
        self.state
            .lock()
            .unwrap()
            .packages
            .get(&key(repo))
            .cloned()
            .unwrap_or_default()
    }

    pub fn last_checksum(&self, repo: &RepositoryRef) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .checksums
            .get(&key(repo))
            .map(|(checksum, _)| checksum.clone())
    }
}

#[async_trait::async_trait]
impl AssetStore for InMemoryStore {
    async fn init(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn invalidate_cache(&self) -> Result<(), StoreError> {
        *self.state.lock().unwrap() = StoreState::default();
        Ok(())
    }

    async fn delete_repository(&self, repo: &RepositoryRef) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.checksums.remove(&key(repo));
        if let Some(packages) = state.packages.remove(&key(repo)) {
            for package in packages {
                state.icons.remove(&package.id);
                state
                    .files
                    .retain(|id, _| !id.starts_with(&format!("{}-", package.id)));
            }
        }
        Ok(())
    }

    async fn sync_packages(
        &self,
        repo: &RepositoryRef,
        packages: &[Package],
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.packages.insert(key(repo), packages.to_vec());
        Ok(())
    }

    async fn repo_already_processed(
        &self,
        repo: &RepositoryRef,
        checksum: &str,
    ) -> Result<bool, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .checksums
            .get(&key(repo))
            .is_some_and(|(recorded, _)| recorded == checksum))
    }

    async fn update_last_check(
        &self,
        repo: &RepositoryRef,
        checksum: &str,
        checked_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state
            .checksums
            .insert(key(repo), (checksum.to_owned(), checked_at));
        Ok(())
    }

    async fn update_icon(
        &self,
        _repo: &RepositoryRef,
        data: &[u8],
        content_type: &str,
        package_id: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state
            .icons
            .insert(package_id.to_owned(), (data.to_vec(), content_type.to_owned()));
        Ok(())
    }

    async fn files_exist(
        &self,
        _repo: &RepositoryRef,
        files_id: &str,
        digest: &str,
    ) -> Result<bool, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .files
            .get(files_id)
            .is_some_and(|files| files.digest == digest))
    }

    async fn insert_files(
        &self,
        _repo: &RepositoryRef,
        _package_id: &str,
        files: &PackageFiles,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.insert_order.push(files.id.clone());
        state.files.insert(files.id.clone(), files.clone());
        Ok(())
    }
}

/// Repository source serving fixed packages and files, for testing.
pub struct StaticSource {
    repo: RepositoryRef,
    checksum: String,
    packages: Vec<Package>,
    files: HashMap<(String, String), VersionFiles>,
    directories: HashMap<(String, String), BTreeMap<String, String>>,
    failing: HashSet<String>,
}

impl StaticSource {
    pub fn new(repo: RepositoryRef, checksum: impl Into<String>) -> Self {
        Self {
            repo,
            checksum: checksum.into(),
            packages: Vec::new(),
            files: HashMap::new(),
            directories: HashMap::new(),
            failing: HashSet::new(),
        }
    }

    pub fn add_package(&mut self, package: Package) {
        self.packages.push(package);
        self.packages.sort_by(|a, b| a.id.cmp(&b.id));
    }

    pub fn add_files(&mut self, name: &str, version: &str, files: VersionFiles) {
        self.files
            .insert((name.to_owned(), version.to_owned()), files);
    }

    pub fn add_directory(&mut self, name: &str, version: &str, files: BTreeMap<String, String>) {
        self.directories
            .insert((name.to_owned(), version.to_owned()), files);
    }

    /// The packages `list_packages` will return.
    pub fn packages(&self) -> Vec<Package> {
        self.packages.clone()
    }

    /// Make every fetch for `name` fail with a network error.
    pub fn fail_package(&mut self, name: &str) {
        self.failing.insert(name.to_owned());
    }

    fn check_failing(&self, name: &str) -> Result<(), SourceError> {
        if self.failing.contains(name) {
            return Err(SourceError::Network(format!("{name}: connection refused")));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl RepoSource for StaticSource {
    fn repository(&self) -> &RepositoryRef {
        &self.repo
    }

    async fn checksum(&self) -> Result<String, SourceError> {
        Ok(self.checksum.clone())
    }

    async fn list_packages(&self) -> Result<Vec<Package>, SourceError> {
        Ok(self.packages.clone())
    }

    async fn fetch_version_files(
        &self,
        name: &str,
        version: &PackageVersion,
    ) -> Result<VersionFiles, SourceError> {
        self.check_failing(name)?;
        Ok(self
            .files
            .get(&(name.to_owned(), version.version.clone()))
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_directory_files(
        &self,
        name: &str,
        version: &PackageVersion,
        _directory: &str,
    ) -> Result<BTreeMap<String, String>, SourceError> {
        self.check_failing(name)?;
        Ok(self
            .directories
            .get(&(name.to_owned(), version.version.clone()))
            .cloned()
            .unwrap_or_default())
    }
}

/// A package with the given versions (newest first) and no icon.
pub fn package(repo_name: &str, name: &str, versions: &[(&str, &str)]) -> Package {
    Package {
        id: crate::model::package_id(repo_name, name),
        name: name.to_owned(),
        repository: repo_name.to_owned(),
        icon: None,
        description: None,
        home: None,
        keywords: Vec::new(),
        sources: Vec::new(),
        maintainers: Vec::new(),
        category: None,
        deprecated: false,
        versions: versions
            .iter()
            .map(|(version, digest)| PackageVersion {
                version: (*version).to_owned(),
                app_version: None,
                created: None,
                digest: (*digest).to_owned(),
                urls: vec![format!("{name}-{version}.tgz")],
            })
            .collect(),
    }
}
