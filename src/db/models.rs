// src/db/models.rs

//! Data models for Canister database entities
//!
//! This module defines Rust structs that correspond to database tables
//! and provides the upserts and lookups the ingestion pipeline performs.

use crate::error::Result;
use crate::repository::parsers::PackageRecord;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::fmt;
use std::str::FromStr;

/// Ranking reported for a slug with no repository row
///
/// Worse than any real ranking, so an unknown owner never wins a comparison.
pub const UNKNOWN_RANKING: i32 = i32::MAX;

/// Decode a JSON list column, surfacing bad data as a conversion failure
fn json_list(row: &Row, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// A repository listed in the manifest, with its latest Release metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub slug: String,
    pub aliases: Vec<String>,
    pub ranking: i32,
    pub package_count: i64,
    pub sections: Vec<String>,
    pub uri: String,
    pub dist: Option<String>,
    pub suite: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub payment_gateway: Option<String>,
    pub payment_endpoint: Option<String>,
    pub updated_at: Option<String>,
}

impl Repository {
    /// Create a new Repository with no Release metadata
    pub fn new(slug: String, ranking: i32, uri: String) -> Self {
        Self {
            slug,
            aliases: Vec::new(),
            ranking,
            package_count: 0,
            sections: Vec::new(),
            uri,
            dist: None,
            suite: None,
            name: None,
            version: None,
            description: None,
            date: None,
            payment_gateway: None,
            payment_endpoint: None,
            updated_at: None,
        }
    }

    /// Insert or replace this repository, keyed by slug
    pub fn upsert(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT INTO repositories (slug, aliases, ranking, package_count, sections, uri, dist, suite,
                                       name, version, description, date, payment_gateway, payment_endpoint)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT (slug) DO UPDATE SET
                aliases = ?2, ranking = ?3, package_count = ?4, sections = ?5, uri = ?6, dist = ?7,
                suite = ?8, name = ?9, version = ?10, description = ?11, date = ?12,
                payment_gateway = ?13, payment_endpoint = ?14, updated_at = CURRENT_TIMESTAMP",
            params![
                &self.slug,
                serde_json::to_string(&self.aliases)?,
                &self.ranking,
                &self.package_count,
                serde_json::to_string(&self.sections)?,
                &self.uri,
                &self.dist,
                &self.suite,
                &self.name,
                &self.version,
                &self.description,
                &self.date,
                &self.payment_gateway,
                &self.payment_endpoint,
            ],
        )?;

        Ok(())
    }

    /// Find a repository by slug
    pub fn find_by_slug(conn: &Connection, slug: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT slug, aliases, ranking, package_count, sections, uri, dist, suite, name, version,
                    description, date, payment_gateway, payment_endpoint, updated_at
             FROM repositories WHERE slug = ?1",
        )?;

        let repo = stmt.query_row([slug], Self::from_row).optional()?;

        Ok(repo)
    }

    /// Ranking of `slug`, or [`UNKNOWN_RANKING`] when it has no row
    pub fn ranking(conn: &Connection, slug: &str) -> Result<i32> {
        let ranking = conn
            .query_row(
                "SELECT ranking FROM repositories WHERE slug = ?1",
                [slug],
                |row| row.get(0),
            )
            .optional()?;

        Ok(ranking.unwrap_or(UNKNOWN_RANKING))
    }

    /// Convert a database row to a Repository
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            slug: row.get(0)?,
            aliases: json_list(row, 1)?,
            ranking: row.get(2)?,
            package_count: row.get(3)?,
            sections: json_list(row, 4)?,
            uri: row.get(5)?,
            dist: row.get(6)?,
            suite: row.get(7)?,
            name: row.get(8)?,
            version: row.get(9)?,
            description: row.get(10)?,
            date: row.get(11)?,
            payment_gateway: row.get(12)?,
            payment_endpoint: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }
}

/// Price classification of a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Price {
    Free,
    /// Commercial, price unknown
    Paid,
    /// Commercial, price string reported by the payment endpoint
    Quoted(String),
}

impl Price {
    pub fn as_str(&self) -> &str {
        match self {
            Price::Free => "Free",
            Price::Paid => "Paid",
            Price::Quoted(price) => price,
        }
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Price {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "Free" => Price::Free,
            "Paid" => Price::Paid,
            other => Price::Quoted(other.to_string()),
        })
    }
}

/// A package id and the repository that owns it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub id: String,
    pub repository: String,
    pub price: Price,
}

impl Package {
    pub fn new(id: String, repository: String, price: Price) -> Self {
        Self {
            id,
            repository,
            price,
        }
    }

    /// Insert or replace the ownership record for this package id
    pub fn upsert(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT INTO packages (id, repository, price) VALUES (?1, ?2, ?3)
             ON CONFLICT (id) DO UPDATE SET repository = ?2, price = ?3",
            params![&self.id, &self.repository, self.price.as_str()],
        )?;
        Ok(())
    }

    /// Find a package by id
    pub fn find(conn: &Connection, id: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare("SELECT id, repository, price FROM packages WHERE id = ?1")?;
        let package = stmt.query_row([id], Self::from_row).optional()?;
        Ok(package)
    }

    /// Slug of the repository owning `id`, if any
    pub fn owner(conn: &Connection, id: &str) -> Result<Option<String>> {
        let owner = conn
            .query_row(
                "SELECT repository FROM packages WHERE id = ?1",
                [id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(owner)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let price: String = row.get(2)?;
        Ok(Self {
            id: row.get(0)?,
            repository: row.get(1)?,
            price: Price::from_str(&price).unwrap_or(Price::Paid),
        })
    }
}

/// One version of a package as published by one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VPackage {
    pub uuid: String,
    pub package: String,
    pub repository: String,
    pub current_version: bool,
    pub version: String,
    pub architecture: Option<String>,
    pub filename: Option<String>,
    pub sha_256: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub maintainer: Option<String>,
    pub depiction: Option<String>,
    pub native_depiction: Option<String>,
    pub header: Option<String>,
    pub tint_color: Option<String>,
    pub icon: Option<String>,
    pub section: Option<String>,
    pub tag: Option<String>,
    pub installed_size: Option<String>,
    pub size: Option<String>,
}

const VPACKAGE_COLUMNS: &str = "uuid, package, repository, current_version, version, architecture, filename,
    sha_256, name, description, author, maintainer, depiction, native_depiction, header, tint_color,
    icon, section, tag, installed_size, size";

impl VPackage {
    /// Build the versioned row for `record` as published by `slug`
    pub fn from_record(record: &PackageRecord, slug: &str, current_version: bool) -> Self {
        let field = |key: &str| record.get(key).map(str::to_string);

        Self {
            uuid: record.vpackage_uuid(slug),
            package: record.id().to_string(),
            repository: slug.to_string(),
            current_version,
            version: record.version().to_string(),
            architecture: field("Architecture"),
            filename: field("Filename"),
            sha_256: field("SHA256"),
            name: field("Name"),
            description: field("Description"),
            author: field("Author"),
            maintainer: field("Maintainer"),
            depiction: field("Depiction"),
            native_depiction: field("SileoDepiction"),
            header: field("Header"),
            tint_color: field("Tint"),
            icon: field("Icon"),
            section: field("Section"),
            tag: field("Tag"),
            installed_size: field("Installed-Size"),
            size: field("Size"),
        }
    }

    /// Insert or replace this versioned row, keyed by uuid
    pub fn upsert(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT INTO vpackages (uuid, package, repository, current_version, version, architecture,
                                    filename, sha_256, name, description, author, maintainer, depiction,
                                    native_depiction, header, tint_color, icon, section, tag,
                                    installed_size, size)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18,
                     ?19, ?20, ?21)
             ON CONFLICT (uuid) DO UPDATE SET
                package = ?2, repository = ?3, current_version = ?4, version = ?5, architecture = ?6,
                filename = ?7, sha_256 = ?8, name = ?9, description = ?10, author = ?11,
                maintainer = ?12, depiction = ?13, native_depiction = ?14, header = ?15,
                tint_color = ?16, icon = ?17, section = ?18, tag = ?19, installed_size = ?20,
                size = ?21, updated_at = CURRENT_TIMESTAMP",
            params![
                &self.uuid,
                &self.package,
                &self.repository,
                self.current_version as i32,
                &self.version,
                &self.architecture,
                &self.filename,
                &self.sha_256,
                &self.name,
                &self.description,
                &self.author,
                &self.maintainer,
                &self.depiction,
                &self.native_depiction,
                &self.header,
                &self.tint_color,
                &self.icon,
                &self.section,
                &self.tag,
                &self.installed_size,
                &self.size,
            ],
        )?;

        Ok(())
    }

    /// The row currently marked as the current version of `package`
    pub fn current(conn: &Connection, package: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM vpackages WHERE package = ?1 AND current_version = 1",
            VPACKAGE_COLUMNS
        ))?;

        let current = stmt.query_row([package], Self::from_row).optional()?;

        Ok(current)
    }

    /// Move the current-version flag of `package` onto `uuid`
    ///
    /// The flag is cleared for the package first, then set on the new row, so
    /// the partial unique index never sees two current rows.
    pub fn set_current(conn: &Connection, uuid: &str, package: &str) -> Result<()> {
        conn.execute(
            "UPDATE vpackages SET current_version = 0 WHERE package = ?1 AND current_version = 1",
            [package],
        )?;
        conn.execute(
            "UPDATE vpackages SET current_version = 1 WHERE uuid = ?1 AND package = ?2",
            [uuid, package],
        )?;
        Ok(())
    }

    /// All known versions of a package
    pub fn find_by_package(conn: &Connection, package: &str) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM vpackages WHERE package = ?1 ORDER BY uuid",
            VPACKAGE_COLUMNS
        ))?;

        let vpackages = stmt
            .query_map([package], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(vpackages)
    }

    /// Convert a database row to a VPackage
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            uuid: row.get(0)?,
            package: row.get(1)?,
            repository: row.get(2)?,
            current_version: row.get::<_, i32>(3)? != 0,
            version: row.get(4)?,
            architecture: row.get(5)?,
            filename: row.get(6)?,
            sha_256: row.get(7)?,
            name: row.get(8)?,
            description: row.get(9)?,
            author: row.get(10)?,
            maintainer: row.get(11)?,
            depiction: row.get(12)?,
            native_depiction: row.get(13)?,
            header: row.get(14)?,
            tint_color: row.get(15)?,
            icon: row.get(16)?,
            section: row.get(17)?,
            tag: row.get(18)?,
            installed_size: row.get(19)?,
            size: row.get(20)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;

    fn create_test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::migrate(&conn).unwrap();
        conn
    }

    fn record(package: &str, version: &str) -> PackageRecord {
        PackageRecord::parse(&format!(
            "Package: {}\nVersion: {}\nSection: Tweaks\nSileoDepiction: https://example.com/d.json\n",
            package, version
        ))
        .unwrap()
    }

    #[test]
    fn test_repository_upsert_and_find() {
        let conn = create_test_db();

        let mut repo = Repository::new("chariz".to_string(), 1, "https://repo.chariz.com".to_string());
        repo.aliases = vec!["chariz-old".to_string()];
        repo.sections = vec!["Themes".to_string(), "Tweaks".to_string()];
        repo.upsert(&conn).unwrap();

        repo.package_count = 42;
        repo.name = Some("Chariz".to_string());
        repo.upsert(&conn).unwrap();

        let found = Repository::find_by_slug(&conn, "chariz").unwrap().unwrap();
        assert_eq!(found.package_count, 42);
        assert_eq!(found.name.as_deref(), Some("Chariz"));
        assert_eq!(found.aliases, vec!["chariz-old".to_string()]);
        assert_eq!(found.sections.len(), 2);
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM repositories", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_repository_ranking_sentinel() {
        let conn = create_test_db();
        Repository::new("bigboss".to_string(), 3, "http://apt.thebigboss.org".to_string())
            .upsert(&conn)
            .unwrap();

        assert_eq!(Repository::ranking(&conn, "bigboss").unwrap(), 3);
        assert_eq!(Repository::ranking(&conn, "missing").unwrap(), UNKNOWN_RANKING);
    }

    #[test]
    fn test_package_upsert_changes_owner() {
        let conn = create_test_db();

        Package::new("com.example.tweak".to_string(), "a".to_string(), Price::Free)
            .upsert(&conn)
            .unwrap();
        Package::new(
            "com.example.tweak".to_string(),
            "b".to_string(),
            Price::Quoted("$1.99".to_string()),
        )
        .upsert(&conn)
        .unwrap();

        assert_eq!(
            Package::owner(&conn, "com.example.tweak").unwrap().as_deref(),
            Some("b")
        );
        let found = Package::find(&conn, "com.example.tweak").unwrap().unwrap();
        assert_eq!(found.price, Price::Quoted("$1.99".to_string()));
        assert_eq!(Package::owner(&conn, "missing").unwrap(), None);
    }

    #[test]
    fn test_vpackage_current_flag() {
        let conn = create_test_db();

        let old = VPackage::from_record(&record("pkg", "1.0"), "repo", true);
        let new = VPackage::from_record(&record("pkg", "2.0"), "repo", false);
        old.upsert(&conn).unwrap();
        new.upsert(&conn).unwrap();

        assert_eq!(VPackage::current(&conn, "pkg").unwrap().unwrap().version, "1.0");

        VPackage::set_current(&conn, &new.uuid, "pkg").unwrap();

        let current = VPackage::current(&conn, "pkg").unwrap().unwrap();
        assert_eq!(current.uuid, "pkg$$2.0$$repo");
        assert_eq!(current.native_depiction.as_deref(), Some("https://example.com/d.json"));
        let versions = VPackage::find_by_package(&conn, "pkg").unwrap();
        assert_eq!(versions.len(), 2);
        assert!(versions.iter().any(|v| v.uuid == old.uuid && !v.current_version));
    }

    #[test]
    fn test_price_round_trip() {
        assert_eq!("Free".parse::<Price>().unwrap(), Price::Free);
        assert_eq!("Paid".parse::<Price>().unwrap(), Price::Paid);
        assert_eq!("$0.99".parse::<Price>().unwrap(), Price::Quoted("$0.99".to_string()));
        assert_eq!(Price::Quoted("$0.99".to_string()).to_string(), "$0.99");
    }
}
