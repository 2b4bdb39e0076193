use rusqlite_migration::{M, Migrations};

pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(
        "CREATE TABLE repos (
            namespace        TEXT NOT NULL,
            name             TEXT NOT NULL,
            url              TEXT NOT NULL,
            repo_type        TEXT NOT NULL DEFAULT 'helm',
            checksum         TEXT,
            last_checked_at  TEXT,
            PRIMARY KEY (namespace, name)
        );

        CREATE TABLE packages (
            repo_namespace     TEXT NOT NULL,
            repo_name          TEXT NOT NULL,
            id                 TEXT NOT NULL,
            name               TEXT NOT NULL,
            info_json          TEXT NOT NULL,
            icon               BLOB,
            icon_content_type  TEXT,
            PRIMARY KEY (repo_namespace, repo_name, id)
        );

        CREATE TABLE package_files (
            repo_namespace     TEXT NOT NULL,
            repo_name          TEXT NOT NULL,
            package_id         TEXT NOT NULL,
            files_id           TEXT NOT NULL,
            digest             TEXT NOT NULL,
            readme             TEXT,
            values_text        TEXT,
            schema_text        TEXT,
            custom_files_json  TEXT NOT NULL DEFAULT '{}',
            PRIMARY KEY (repo_namespace, repo_name, files_id)
        );

        CREATE INDEX idx_package_files_package
            ON package_files(repo_namespace, repo_name, package_id);",
    )])
}
