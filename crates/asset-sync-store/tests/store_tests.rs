use std::collections::BTreeMap;

use asset_sync::test_support::package;
use asset_sync::{
    AssetStore, PackageFiles, RepoDecision, RepoType, RepositoryRef, VersionDecision,
    check_repository, check_version,
};
use asset_sync_store::SqliteAssetStore;
use chrono::{TimeZone, Utc};

fn create_store() -> SqliteAssetStore {
    SqliteAssetStore::open_in_memory().unwrap()
}

fn repo(name: &str) -> RepositoryRef {
    RepositoryRef::new(
        "default",
        name,
        format!("https://charts.example.com/{name}"),
        RepoType::Helm,
    )
}

fn files(id: &str, digest: &str, readme: &str) -> PackageFiles {
    PackageFiles {
        id: id.to_owned(),
        digest: digest.to_owned(),
        readme: Some(readme.to_owned()),
        values: Some("replicas: 1".to_owned()),
        schema: None,
        custom_files: BTreeMap::from([("demo/CustomFiles/a.txt".to_owned(), "a".to_owned())]),
    }
}

#[tokio::test]
async fn open_store_is_ready_before_init() {
    let store = create_store();
    let stable = repo("stable");

    store.update_last_check(&stable, "abc", Utc::now()).await.unwrap();
    store.init().await.unwrap();

    assert_eq!(store.last_checksum(&stable).unwrap().as_deref(), Some("abc"));
}

#[tokio::test]
async fn unknown_repository_is_not_processed() {
    let store = create_store();
    assert!(!store.repo_already_processed(&repo("stable"), "abc").await.unwrap());
    assert!(store.last_checksum(&repo("stable")).unwrap().is_none());
}

#[tokio::test]
async fn last_check_records_checksum_and_time() {
    let store = create_store();
    let stable = repo("stable");
    let checked_at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

    store.update_last_check(&stable, "abc", checked_at).await.unwrap();

    assert!(store.repo_already_processed(&stable, "abc").await.unwrap());
    assert!(!store.repo_already_processed(&stable, "def").await.unwrap());
    assert_eq!(store.last_checksum(&stable).unwrap().as_deref(), Some("abc"));
    assert_eq!(store.last_checked_at(&stable).unwrap(), Some(checked_at));

    let gate = check_repository(&store, &stable, "def").await.unwrap();
    assert_eq!(gate, RepoDecision::Changed);
}

#[tokio::test]
async fn checksums_are_scoped_by_namespace() {
    let store = create_store();
    let stable = repo("stable");
    let mut other = repo("stable");
    other.namespace = "team-b".into();

    store.update_last_check(&stable, "abc", Utc::now()).await.unwrap();

    assert!(!store.repo_already_processed(&other, "abc").await.unwrap());
}

#[tokio::test]
async fn files_exist_requires_matching_digest() {
    let store = create_store();
    let stable = repo("stable");

    store
        .insert_files(&stable, "stable/demo", &files("stable/demo-1.0.0", "abc", "# v1"))
        .await
        .unwrap();

    assert!(store.files_exist(&stable, "stable/demo-1.0.0", "abc").await.unwrap());
    assert!(!store.files_exist(&stable, "stable/demo-1.0.0", "def").await.unwrap());
    assert!(!store.files_exist(&stable, "stable/demo-2.0.0", "abc").await.unwrap());
    assert_eq!(
        check_version(&store, &stable, "stable/demo-1.0.0", "def").await.unwrap(),
        VersionDecision::Missing
    );
}

#[tokio::test]
async fn insert_files_replaces_existing_row() {
    let store = create_store();
    let stable = repo("stable");

    store
        .insert_files(&stable, "stable/demo", &files("stable/demo-1.0.0", "abc", "# old"))
        .await
        .unwrap();
    store
        .insert_files(&stable, "stable/demo", &files("stable/demo-1.0.0", "def", "# new"))
        .await
        .unwrap();

    let stored = store.package_files(&stable, "stable/demo-1.0.0").unwrap().unwrap();
    assert_eq!(stored.digest, "def");
    assert_eq!(stored.readme.as_deref(), Some("# new"));
    assert_eq!(stored.values.as_deref(), Some("replicas: 1"));
    assert!(stored.schema.is_none());
    assert_eq!(stored.custom_files["demo/CustomFiles/a.txt"], "a");
}

#[tokio::test]
async fn sync_packages_stores_metadata_and_drops_vanished_packages() {
    let store = create_store();
    let stable = repo("stable");

    let mut demo = package("stable", "demo", &[("1.0.0", "d1")]);
    demo.description = Some("Demo chart".into());
    let gone = package("stable", "gone", &[("1.0.0", "g1")]);
    store
        .sync_packages(&stable, &[demo.clone(), gone.clone()])
        .await
        .unwrap();
    store
        .insert_files(&stable, &gone.id, &files("stable/gone-1.0.0", "g1", "gone"))
        .await
        .unwrap();
    store
        .update_icon(&stable, b"png-bytes", "image/png", &demo.id)
        .await
        .unwrap();

    assert_eq!(
        store.package_ids(&stable).unwrap(),
        vec!["stable/demo", "stable/gone"]
    );

    store.sync_packages(&stable, &[demo.clone()]).await.unwrap();

    assert_eq!(store.package_ids(&stable).unwrap(), vec!["stable/demo"]);
    assert!(store.package_files(&stable, "stable/gone-1.0.0").unwrap().is_none());
    assert_eq!(store.package(&stable, &demo.id).unwrap(), Some(demo.clone()));

    let (icon, content_type) = store.package_icon(&stable, &demo.id).unwrap().unwrap();
    assert_eq!(icon, b"png-bytes");
    assert_eq!(content_type, "image/png");
}

#[tokio::test]
async fn icon_for_unknown_package_is_ignored() {
    let store = create_store();
    let stable = repo("stable");

    store
        .update_icon(&stable, b"png", "image/png", "stable/missing")
        .await
        .unwrap();

    assert!(store.package_icon(&stable, "stable/missing").unwrap().is_none());
}

#[tokio::test]
async fn delete_repository_removes_only_that_repository() {
    let store = create_store();
    let stable = repo("stable");
    let incubator = repo("incubator");

    for r in [&stable, &incubator] {
        let pkg = package(&r.name, "demo", &[("1.0.0", "d1")]);
        store.sync_packages(r, &[pkg.clone()]).await.unwrap();
        store
            .insert_files(r, &pkg.id, &files(&format!("{}-1.0.0", pkg.id), "d1", "#"))
            .await
            .unwrap();
        store.update_last_check(r, "sum", Utc::now()).await.unwrap();
    }

    store.delete_repository(&stable).await.unwrap();

    assert!(store.package_ids(&stable).unwrap().is_empty());
    assert!(store.last_checksum(&stable).unwrap().is_none());
    assert!(!store.files_exist(&stable, "stable/demo-1.0.0", "d1").await.unwrap());

    assert_eq!(store.package_ids(&incubator).unwrap(), vec!["incubator/demo"]);
    assert!(store.repo_already_processed(&incubator, "sum").await.unwrap());
}

#[tokio::test]
async fn invalidate_cache_forgets_everything() {
    let store = create_store();
    let stable = repo("stable");
    let pkg = package("stable", "demo", &[("1.0.0", "d1")]);

    store.sync_packages(&stable, &[pkg.clone()]).await.unwrap();
    store
        .insert_files(&stable, &pkg.id, &files("stable/demo-1.0.0", "d1", "#"))
        .await
        .unwrap();
    store.update_last_check(&stable, "sum", Utc::now()).await.unwrap();

    store.invalidate_cache().await.unwrap();

    assert!(!store.repo_already_processed(&stable, "sum").await.unwrap());
    assert!(store.package_ids(&stable).unwrap().is_empty());
    assert!(!store.files_exist(&stable, "stable/demo-1.0.0", "d1").await.unwrap());
}

#[tokio::test]
async fn file_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("assets.db");
    let stable = repo("stable");

    {
        let store = SqliteAssetStore::open(&path).unwrap();
        store.init().await.unwrap();
        store.update_last_check(&stable, "abc", Utc::now()).await.unwrap();
        store.close().await.unwrap();
    }

    let reopened = SqliteAssetStore::open(&path).unwrap();
    assert!(reopened.repo_already_processed(&stable, "abc").await.unwrap());
}
