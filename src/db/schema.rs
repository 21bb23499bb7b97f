// src/db/schema.rs

//! Database schema definitions and migrations for Canister
//!
//! This module defines the SQLite schema for the repository, package and
//! versioned package tables and provides a migration system to evolve the
//! schema over time.

use crate::error::{Error, Result};
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the schema version tracking table
fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;

    let version = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    Ok(version)
}

/// Set the schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Apply all pending migrations to bring the database up to date
pub fn migrate(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    debug!("Current schema version: {}", current_version);

    if current_version >= SCHEMA_VERSION {
        debug!("Schema is up to date");
        return Ok(());
    }

    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("Applying migration to version {}", version);
        apply_migration(conn, version)?;
        set_schema_version(conn, version)?;
    }

    info!(
        "Schema migration complete. Now at version {}",
        SCHEMA_VERSION
    );
    Ok(())
}

/// Apply a specific migration version
fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        _ => Err(Error::InitError(format!(
            "Unknown migration version: {}",
            version
        ))),
    }
}

/// Initial schema - Version 1
///
/// - repositories: one row per manifest slug with Release metadata
/// - packages: package id -> owning repository and price
/// - vpackages: one row per (package, version, repository)
fn migrate_v1(conn: &Connection) -> Result<()> {
    debug!("Creating schema version 1");

    conn.execute_batch(
        "
        CREATE TABLE repositories (
            slug TEXT PRIMARY KEY,
            aliases TEXT NOT NULL DEFAULT '[]',
            ranking INTEGER NOT NULL,
            package_count INTEGER NOT NULL DEFAULT 0,
            sections TEXT NOT NULL DEFAULT '[]',
            uri TEXT NOT NULL,
            dist TEXT,
            suite TEXT,
            name TEXT,
            version TEXT,
            description TEXT,
            date TEXT,
            payment_gateway TEXT,
            payment_endpoint TEXT,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX idx_repositories_ranking ON repositories(ranking);

        CREATE TABLE packages (
            id TEXT PRIMARY KEY,
            repository TEXT NOT NULL,
            price TEXT NOT NULL
        );

        CREATE INDEX idx_packages_repository ON packages(repository);

        CREATE TABLE vpackages (
            uuid TEXT PRIMARY KEY,
            package TEXT NOT NULL,
            repository TEXT NOT NULL,
            current_version INTEGER NOT NULL DEFAULT 0,
            version TEXT NOT NULL,
            architecture TEXT,
            filename TEXT,
            sha_256 TEXT,
            name TEXT,
            description TEXT,
            author TEXT,
            maintainer TEXT,
            depiction TEXT,
            native_depiction TEXT,
            header TEXT,
            tint_color TEXT,
            icon TEXT,
            section TEXT,
            tag TEXT,
            installed_size TEXT,
            size TEXT,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX idx_vpackages_package ON vpackages(package);
        CREATE INDEX idx_vpackages_repository ON vpackages(repository);
        -- At most one current row per package id
        CREATE UNIQUE INDEX idx_vpackages_current ON vpackages(package) WHERE current_version = 1;
        ",
    )?;

    info!("Schema version 1 created successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_test_db() -> (NamedTempFile, Connection) {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = Connection::open(temp_file.path()).unwrap();
        (temp_file, conn)
    }

    #[test]
    fn test_schema_version_tracking() {
        let (_temp, conn) = create_test_db();

        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, 0);

        set_schema_version(&conn, 1).unwrap();
        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_migrate_creates_all_tables() {
        let (_temp, conn) = create_test_db();

        migrate(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"repositories".to_string()));
        assert!(tables.contains(&"packages".to_string()));
        assert!(tables.contains(&"vpackages".to_string()));
        assert!(tables.contains(&"schema_version".to_string()));
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let (_temp, conn) = create_test_db();

        migrate(&conn).unwrap();
        let version1 = get_schema_version(&conn).unwrap();

        migrate(&conn).unwrap();
        let version2 = get_schema_version(&conn).unwrap();

        assert_eq!(version1, version2);
        assert_eq!(version1, SCHEMA_VERSION);
    }

    #[test]
    fn test_single_current_row_per_package() {
        let (_temp, conn) = create_test_db();
        migrate(&conn).unwrap();

        conn.execute(
            "INSERT INTO vpackages (uuid, package, repository, current_version, version)
             VALUES ('a$$1$$r', 'a', 'r', 1, '1')",
            [],
        )
        .unwrap();

        // A second current row for the same package must be rejected
        let result = conn.execute(
            "INSERT INTO vpackages (uuid, package, repository, current_version, version)
             VALUES ('a$$2$$r', 'a', 'r', 1, '2')",
            [],
        );
        assert!(result.is_err());
    }
}
