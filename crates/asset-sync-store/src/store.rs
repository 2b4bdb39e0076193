use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use asset_sync::{AssetStore, Package, PackageFiles, RepositoryRef, StoreError};
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use tracing::debug;

use crate::schema;

/// A SQLite-backed implementation of [`AssetStore`].
///
/// Rows are scoped by repository `(namespace, name)`. One connection is
/// shared behind a mutex; every call is a short synchronous statement.
pub struct SqliteAssetStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteAssetStore {
    /// Open a store backed by a file on disk.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = rusqlite::Connection::open(path).map_err(db_err)?;

        let mut store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = rusqlite::Connection::open_in_memory().map_err(db_err)?;

        let mut store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&mut self) -> Result<(), StoreError> {
        let conn = self.conn.get_mut().unwrap();
        schema::migrations()
            .to_latest(conn)
            .map_err(|e| StoreError::Migration(e.to_string()))
    }

    /// Stored files of one version, if any.
    pub fn package_files(
        &self,
        repo: &RepositoryRef,
        files_id: &str,
    ) -> Result<Option<PackageFiles>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let row = conn
            .query_row(
                "SELECT files_id, digest, readme, values_text, schema_text, custom_files_json
                 FROM package_files
                 WHERE repo_namespace = ?1 AND repo_name = ?2 AND files_id = ?3",
                rusqlite::params![repo.namespace, repo.name, files_id],
                |row| {
                    Ok((
                        PackageFiles {
                            id: row.get(0)?,
                            digest: row.get(1)?,
                            readme: row.get(2)?,
                            values: row.get(3)?,
                            schema: row.get(4)?,
                            custom_files: BTreeMap::new(),
                        },
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()
            .map_err(db_err)?;

        row.map(|(mut files, custom_json)| -> Result<PackageFiles, StoreError> {
            files.custom_files = serde_json::from_str(&custom_json).map_err(db_err)?;
            Ok(files)
        })
        .transpose()
    }

    /// Stored icon bytes and content type of a package.
    pub fn package_icon(
        &self,
        repo: &RepositoryRef,
        package_id: &str,
    ) -> Result<Option<(Vec<u8>, String)>, StoreError> {
        let conn = self.conn.lock().unwrap();

        conn.query_row(
            "SELECT icon, icon_content_type FROM packages
             WHERE repo_namespace = ?1 AND repo_name = ?2 AND id = ?3 AND icon IS NOT NULL",
            rusqlite::params![repo.namespace, repo.name, package_id],
            |row| Ok((row.get(0)?, row.get::<_, Option<String>>(1)?.unwrap_or_default())),
        )
        .optional()
        .map_err(db_err)
    }

    /// IDs of the packages stored for a repository, sorted.
    pub fn package_ids(&self, repo: &RepositoryRef) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(
                "SELECT id FROM packages
                 WHERE repo_namespace = ?1 AND repo_name = ?2
                 ORDER BY id",
            )
            .map_err(db_err)?;

        let ids = stmt
            .query_map(rusqlite::params![repo.namespace, repo.name], |row| row.get(0))
            .map_err(db_err)?
            .collect::<Result<Vec<String>, _>>()
            .map_err(db_err)?;
        Ok(ids)
    }

    /// Stored metadata of one package.
    pub fn package(
        &self,
        repo: &RepositoryRef,
        package_id: &str,
    ) -> Result<Option<Package>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let info: Option<String> = conn
            .query_row(
                "SELECT info_json FROM packages
                 WHERE repo_namespace = ?1 AND repo_name = ?2 AND id = ?3",
                rusqlite::params![repo.namespace, repo.name, package_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;

        info.map(|json| serde_json::from_str(&json).map_err(db_err))
            .transpose()
    }

    /// Checksum recorded by the last completed sync of `repo`.
    pub fn last_checksum(&self, repo: &RepositoryRef) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let checksum: Option<Option<String>> = conn
            .query_row(
                "SELECT checksum FROM repos WHERE namespace = ?1 AND name = ?2",
                rusqlite::params![repo.namespace, repo.name],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;

        Ok(checksum.flatten())
    }

    /// When the last completed sync of `repo` was recorded.
    pub fn last_checked_at(
        &self,
        repo: &RepositoryRef,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let timestamp: Option<Option<String>> = conn
            .query_row(
                "SELECT last_checked_at FROM repos WHERE namespace = ?1 AND name = ?2",
                rusqlite::params![repo.namespace, repo.name],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;

        timestamp
            .flatten()
            .map(|raw| {
                DateTime::parse_from_rfc3339(&raw)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(db_err)
            })
            .transpose()
    }
}

#[async_trait::async_trait]
impl AssetStore for SqliteAssetStore {
    async fn init(&self) -> Result<(), StoreError> {
        // Migrations already ran in `open`.
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("PRAGMA optimize;").map_err(db_err)
    }

    async fn invalidate_cache(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "BEGIN;
             DELETE FROM package_files;
             DELETE FROM packages;
             DELETE FROM repos;
             COMMIT;",
        )
        .map_err(db_err)?;
        debug!("cache invalidated");
        Ok(())
    }

    async fn delete_repository(&self, repo: &RepositoryRef) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;

        for statement in [
            "DELETE FROM package_files WHERE repo_namespace = ?1 AND repo_name = ?2",
            "DELETE FROM packages WHERE repo_namespace = ?1 AND repo_name = ?2",
            "DELETE FROM repos WHERE namespace = ?1 AND name = ?2",
        ] {
            tx.execute(statement, rusqlite::params![repo.namespace, repo.name])
                .map_err(db_err)?;
        }

        tx.commit().map_err(db_err)
    }

    async fn sync_packages(
        &self,
        repo: &RepositoryRef,
        packages: &[Package],
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;

        tx.execute(
            "INSERT INTO repos (namespace, name, url, repo_type)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (namespace, name) DO UPDATE
                SET url = excluded.url, repo_type = excluded.repo_type",
            rusqlite::params![
                repo.namespace,
                repo.name,
                repo.url,
                repo.repo_type.to_string()
            ],
        )
        .map_err(db_err)?;

        let listed: HashSet<&str> = packages.iter().map(|p| p.id.as_str()).collect();
        let stored: Vec<String> = {
            let mut stmt = tx
                .prepare("SELECT id FROM packages WHERE repo_namespace = ?1 AND repo_name = ?2")
                .map_err(db_err)?;
            let ids = stmt
                .query_map(rusqlite::params![repo.namespace, repo.name], |row| row.get(0))
                .map_err(db_err)?
                .collect::<Result<Vec<String>, _>>()
                .map_err(db_err)?;
            ids
        };

        for id in stored.iter().filter(|id| !listed.contains(id.as_str())) {
            debug!(repo = %repo, package = %id, "removing package no longer listed");
            tx.execute(
                "DELETE FROM package_files
                 WHERE repo_namespace = ?1 AND repo_name = ?2 AND package_id = ?3",
                rusqlite::params![repo.namespace, repo.name, id],
            )
            .map_err(db_err)?;
            tx.execute(
                "DELETE FROM packages WHERE repo_namespace = ?1 AND repo_name = ?2 AND id = ?3",
                rusqlite::params![repo.namespace, repo.name, id],
            )
            .map_err(db_err)?;
        }

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO packages (repo_namespace, repo_name, id, name, info_json)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT (repo_namespace, repo_name, id) DO UPDATE
                        SET name = excluded.name, info_json = excluded.info_json",
                )
                .map_err(db_err)?;

            for package in packages {
                let info_json = serde_json::to_string(package).map_err(db_err)?;
                stmt.execute(rusqlite::params![
                    repo.namespace,
                    repo.name,
                    package.id,
                    package.name,
                    info_json
                ])
                .map_err(db_err)?;
            }
        }

        tx.commit().map_err(db_err)
    }

    async fn repo_already_processed(
        &self,
        repo: &RepositoryRef,
        checksum: &str,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();

        conn.query_row(
            "SELECT EXISTS (
                SELECT 1 FROM repos WHERE namespace = ?1 AND name = ?2 AND checksum = ?3
             )",
            rusqlite::params![repo.namespace, repo.name, checksum],
            |row| row.get(0),
        )
        .map_err(db_err)
    }

    async fn update_last_check(
        &self,
        repo: &RepositoryRef,
        checksum: &str,
        checked_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT INTO repos (namespace, name, url, repo_type, checksum, last_checked_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (namespace, name) DO UPDATE
                SET checksum = excluded.checksum, last_checked_at = excluded.last_checked_at",
            rusqlite::params![
                repo.namespace,
                repo.name,
                repo.url,
                repo.repo_type.to_string(),
                checksum,
                checked_at.to_rfc3339()
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_icon(
        &self,
        repo: &RepositoryRef,
        data: &[u8],
        content_type: &str,
        package_id: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();

        let updated = conn
            .execute(
                "UPDATE packages SET icon = ?1, icon_content_type = ?2
                 WHERE repo_namespace = ?3 AND repo_name = ?4 AND id = ?5",
                rusqlite::params![data, content_type, repo.namespace, repo.name, package_id],
            )
            .map_err(db_err)?;

        if updated == 0 {
            debug!(repo = %repo, package = %package_id, "icon for unknown package ignored");
        }
        Ok(())
    }

    async fn files_exist(
        &self,
        repo: &RepositoryRef,
        files_id: &str,
        digest: &str,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();

        conn.query_row(
            "SELECT EXISTS (
                SELECT 1 FROM package_files
                WHERE repo_namespace = ?1 AND repo_name = ?2 AND files_id = ?3 AND digest = ?4
             )",
            rusqlite::params![repo.namespace, repo.name, files_id, digest],
            |row| row.get(0),
        )
        .map_err(db_err)
    }

    async fn insert_files(
        &self,
        repo: &RepositoryRef,
        package_id: &str,
        files: &PackageFiles,
    ) -> Result<(), StoreError> {
        let custom_files_json = serde_json::to_string(&files.custom_files).map_err(db_err)?;
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT INTO package_files
                (repo_namespace, repo_name, package_id, files_id, digest,
                 readme, values_text, schema_text, custom_files_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (repo_namespace, repo_name, files_id) DO UPDATE
                SET package_id = excluded.package_id,
                    digest = excluded.digest,
                    readme = excluded.readme,
                    values_text = excluded.values_text,
                    schema_text = excluded.schema_text,
                    custom_files_json = excluded.custom_files_json",
            rusqlite::params![
                repo.namespace,
                repo.name,
                package_id,
                files.id,
                files.digest,
                files.readme,
                files.values,
                files.schema,
                custom_files_json
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }
}

fn db_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Database(e.to_string())
}
