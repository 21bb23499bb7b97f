// src/repository/manifest.rs

//! Repository manifest
//!
//! The manifest is a JSON document listing the repositories to ingest. Its
//! top level is either an array of entries or an object whose values are
//! entries (keys only label the entry in error messages; every entry names
//! its own slug). A bad entry is rejected on its own; only an unusable
//! document fails the whole manifest.

use super::client::{FetchError, Transport};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

/// Manifest errors
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to fetch manifest: {0}")]
    Fetch(#[from] FetchError),

    #[error("Malformed manifest: {0}")]
    Malformed(String),

    #[error("Invalid manifest entry {label}: {reason}")]
    InvalidEntry { label: String, reason: String },
}

impl ManifestError {
    fn invalid(label: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEntry {
            label: label.into(),
            reason: reason.into(),
        }
    }
}

/// One repository to ingest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryManifestEntry {
    pub slug: String,
    /// Lower is preferred
    pub ranking: i32,
    /// Base URL without a trailing slash
    pub uri: String,
    pub aliases: Vec<String>,
    pub dist: Option<String>,
    pub suite: Option<String>,
}

impl RepositoryManifestEntry {
    pub fn new(slug: impl Into<String>, ranking: i32, uri: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            ranking,
            uri: normalize_uri(&uri.into()),
            aliases: Vec::new(),
            dist: None,
            suite: None,
        }
    }

    /// Use the `dists/<dist>/<suite>` layout
    pub fn with_distribution(mut self, dist: impl Into<String>, suite: impl Into<String>) -> Self {
        self.dist = Some(dist.into());
        self.suite = Some(suite.into());
        self
    }

    /// `(dist, suite)` when the repository uses the distribution layout
    pub fn distribution(&self) -> Option<(&str, &str)> {
        match (&self.dist, &self.suite) {
            (Some(dist), Some(suite)) => Some((dist, suite)),
            _ => None,
        }
    }
}

fn normalize_uri(uri: &str) -> String {
    uri.trim().trim_end_matches('/').to_string()
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    slug: Option<String>,
    ranking: Option<i64>,
    uri: Option<String>,
    #[serde(default)]
    aliases: Vec<String>,
    dist: Option<String>,
    suite: Option<String>,
}

/// A parsed manifest
#[derive(Debug, Default)]
pub struct Manifest {
    pub entries: Vec<RepositoryManifestEntry>,
    /// Entries that failed validation, in document order
    pub rejected: Vec<ManifestError>,
}

impl Manifest {
    /// Parse a manifest document
    pub fn parse(content: &str) -> Result<Self, ManifestError> {
        let document: serde_json::Value =
            serde_json::from_str(content).map_err(|e| ManifestError::Malformed(e.to_string()))?;

        let items: Vec<(String, serde_json::Value)> = match document {
            serde_json::Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(index, item)| (index.to_string(), item))
                .collect(),
            serde_json::Value::Object(map) => map.into_iter().collect(),
            other => {
                return Err(ManifestError::Malformed(format!(
                    "expected an array or object, found {}",
                    json_kind(&other)
                )));
            }
        };

        let mut manifest = Manifest::default();
        for (label, item) in items {
            match validate(&label, item) {
                Ok(entry) => manifest.entries.push(entry),
                Err(e) => {
                    warn!("{}", e);
                    manifest.rejected.push(e);
                }
            }
        }

        Ok(manifest)
    }

    /// Fetch and parse the manifest at `url`
    pub fn fetch(transport: &dyn Transport, url: &str) -> Result<Self, ManifestError> {
        info!("Fetching repository manifest from {}", url);
        let content = transport.get_text(url)?;
        let manifest = Self::parse(&content)?;
        info!(
            "Manifest lists {} repositories ({} rejected)",
            manifest.entries.len(),
            manifest.rejected.len()
        );
        Ok(manifest)
    }
}

fn validate(label: &str, item: serde_json::Value) -> Result<RepositoryManifestEntry, ManifestError> {
    // Prefer the entry's own slug in messages once it is known
    let label = item
        .get("slug")
        .and_then(|slug| slug.as_str())
        .unwrap_or(label)
        .to_string();

    let raw: RawEntry =
        serde_json::from_value(item).map_err(|e| ManifestError::invalid(&label, e.to_string()))?;

    let slug = raw
        .slug
        .filter(|slug| !slug.trim().is_empty())
        .ok_or_else(|| ManifestError::invalid(&label, "missing slug"))?;
    let ranking = raw
        .ranking
        .ok_or_else(|| ManifestError::invalid(&label, "missing ranking"))?;
    let ranking = i32::try_from(ranking)
        .map_err(|_| ManifestError::invalid(&label, format!("ranking {} out of range", ranking)))?;
    let uri = raw
        .uri
        .map(|uri| normalize_uri(&uri))
        .filter(|uri| !uri.is_empty())
        .ok_or_else(|| ManifestError::invalid(&label, "missing uri"))?;

    if raw.dist.is_some() != raw.suite.is_some() {
        return Err(ManifestError::invalid(
            &label,
            "dist and suite must be given together",
        ));
    }

    Ok(RepositoryManifestEntry {
        slug,
        ranking,
        uri,
        aliases: raw.aliases,
        dist: raw.dist,
        suite: raw.suite,
    })
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::client::MemoryTransport;

    #[test]
    fn test_parse_array() {
        let manifest = Manifest::parse(
            r#"[
                {"slug": "chariz", "ranking": 1, "uri": "https://repo.chariz.com/", "aliases": ["chariz-old"]},
                {"slug": "bigboss", "ranking": 3, "uri": "http://apt.thebigboss.org/repofiles/cydia",
                 "dist": "stable", "suite": "main"}
            ]"#,
        )
        .unwrap();

        assert!(manifest.rejected.is_empty());
        assert_eq!(manifest.entries.len(), 2);
        assert_eq!(manifest.entries[0].uri, "https://repo.chariz.com");
        assert_eq!(manifest.entries[0].aliases, vec!["chariz-old".to_string()]);
        assert_eq!(manifest.entries[0].distribution(), None);
        assert_eq!(manifest.entries[1].distribution(), Some(("stable", "main")));
    }

    #[test]
    fn test_parse_object_requires_slug() {
        let manifest = Manifest::parse(
            r#"{
                "havoc": {"slug": "havoc", "ranking": 2, "uri": "https://havoc.app"},
                "keyonly": {"ranking": 4, "uri": "https://keyonly.example.com"}
            }"#,
        )
        .unwrap();

        assert_eq!(manifest.entries.len(), 1);
        assert_eq!(manifest.entries[0].slug, "havoc");
        assert_eq!(manifest.entries[0].ranking, 2);

        // The key only labels the rejected entry
        assert_eq!(manifest.rejected.len(), 1);
        assert!(matches!(
            &manifest.rejected[0],
            ManifestError::InvalidEntry { label, reason } if label == "keyonly" && reason == "missing slug"
        ));
    }

    #[test]
    fn test_invalid_entries_are_rejected_individually() {
        let manifest = Manifest::parse(
            r#"[
                {"slug": "ok", "ranking": 1, "uri": "https://ok.example.com"},
                {"ranking": 1, "uri": "https://noslug.example.com"},
                {"slug": "nouri", "ranking": 1},
                {"slug": "half", "ranking": 1, "uri": "https://half.example.com", "dist": "stable"},
                {"slug": "typed", "ranking": "first", "uri": "https://typed.example.com"}
            ]"#,
        )
        .unwrap();

        assert_eq!(manifest.entries.len(), 1);
        let labels: Vec<&str> = manifest
            .rejected
            .iter()
            .map(|e| match e {
                ManifestError::InvalidEntry { label, .. } => label.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(labels, vec!["1", "nouri", "half", "typed"]);
    }

    #[test]
    fn test_malformed_document() {
        assert!(matches!(
            Manifest::parse("not json"),
            Err(ManifestError::Malformed(_))
        ));
        assert!(matches!(
            Manifest::parse("42"),
            Err(ManifestError::Malformed(_))
        ));
    }

    #[test]
    fn test_fetch_unavailable() {
        let transport = MemoryTransport::new();
        let result = Manifest::fetch(&transport, "https://manifest.example.com/repos.json");
        assert!(matches!(result, Err(ManifestError::Fetch(_))));
    }
}
