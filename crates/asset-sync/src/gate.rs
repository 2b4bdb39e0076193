//! Change detection: decides whether recorded state still matches what the
//! remote repository reports, so unchanged work can be skipped.

use tracing::debug;

use crate::model::RepositoryRef;
use crate::store::{AssetStore, StoreError};

/// Outcome of comparing a repository checksum with the recorded one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoDecision {
    /// Same checksum as the last completed sync; nothing to do.
    Unchanged,
    /// Never synced, or the checksum moved.
    Changed,
}

/// Outcome of looking up one version's files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionDecision {
    /// Files with this ID and digest are already stored.
    Present,
    Missing,
}

pub async fn check_repository(
    store: &dyn AssetStore,
    repo: &RepositoryRef,
    checksum: &str,
) -> Result<RepoDecision, StoreError> {
    if store.repo_already_processed(repo, checksum).await? {
        debug!(repo = %repo, checksum, "repository checksum unchanged");
        Ok(RepoDecision::Unchanged)
    } else {
        Ok(RepoDecision::Changed)
    }
}

pub async fn check_version(
    store: &dyn AssetStore,
    repo: &RepositoryRef,
    files_id: &str,
    digest: &str,
) -> Result<VersionDecision, StoreError> {
    if store.files_exist(repo, files_id, digest).await? {
        Ok(VersionDecision::Present)
    } else {
        Ok(VersionDecision::Missing)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::model::{PackageFiles, RepoType};
    use crate::test_support::InMemoryStore;

    use super::*;

    fn repo() -> RepositoryRef {
        RepositoryRef::new("default", "repo", "https://charts.example.com", RepoType::Helm)
    }

    #[tokio::test]
    async fn unseen_repository_is_changed() {
        let store = InMemoryStore::new();
        let decision = check_repository(&store, &repo(), "abc").await.unwrap();
        assert_eq!(decision, RepoDecision::Changed);
    }

    #[tokio::test]
    async fn repository_with_same_checksum_is_unchanged() {
        let store = InMemoryStore::new();
        store
            .update_last_check(&repo(), "abc", Utc::now())
            .await
            .unwrap();

        let same = check_repository(&store, &repo(), "abc").await.unwrap();
        assert_eq!(same, RepoDecision::Unchanged);

        let moved = check_repository(&store, &repo(), "def").await.unwrap();
        assert_eq!(moved, RepoDecision::Changed);
    }

    #[tokio::test]
    async fn version_is_skipped_only_for_matching_digest() {
        let store = InMemoryStore::new();
        let files = PackageFiles {
            id: "repo/pkg-1.0.0".into(),
            digest: "abc".into(),
            ..Default::default()
        };
        store.insert_files(&repo(), "repo/pkg", &files).await.unwrap();

        let present = check_version(&store, &repo(), "repo/pkg-1.0.0", "abc")
            .await
            .unwrap();
        assert_eq!(present, VersionDecision::Present);

        let changed = check_version(&store, &repo(), "repo/pkg-1.0.0", "def")
            .await
            .unwrap();
        assert_eq!(changed, VersionDecision::Missing);
    }
}
