// src/repository/fetch.rs

//! Release and Packages retrieval
//!
//! Resolves the URLs of a repository's artifacts, downloads them through the
//! [`Transport`] and hands the bytes to the [`ArtifactCache`]. Packages is
//! probed in codec preference order; the first candidate that decodes to a
//! non-empty file wins.

use super::cache::{ArtifactCache, ArtifactResult};
use super::client::Transport;
use super::manifest::RepositoryManifestEntry;
use crate::compression::Codec;
use std::sync::Arc;
use tracing::{debug, warn};

/// Packages archive candidates, most preferred first
pub const PACKAGES_CANDIDATES: &[Option<Codec>] = &[
    Some(Codec::Zstd),
    Some(Codec::Xz),
    Some(Codec::Bzip2),
    Some(Codec::Lzma),
    Some(Codec::Gzip),
    None,
];

/// Default architecture for the distribution layout
pub const DEFAULT_ARCHITECTURE: &str = "iphoneos-arm";

/// Fetches repository artifacts into the cache
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    cache: ArtifactCache,
    architecture: String,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, cache: ArtifactCache) -> Self {
        Self {
            transport,
            cache,
            architecture: DEFAULT_ARCHITECTURE.to_string(),
        }
    }

    pub fn with_architecture(mut self, architecture: impl Into<String>) -> Self {
        self.architecture = architecture.into();
        self
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// URL of the Release file
    pub fn release_url(&self, entry: &RepositoryManifestEntry) -> String {
        match entry.distribution() {
            Some((dist, _)) => format!("{}/dists/{}/Release", entry.uri, dist),
            None => format!("{}/Release", entry.uri),
        }
    }

    /// Directory holding the Packages candidates
    pub fn packages_base(&self, entry: &RepositoryManifestEntry) -> String {
        match entry.distribution() {
            Some((dist, suite)) => format!(
                "{}/dists/{}/{}/binary-{}",
                entry.uri, dist, suite, self.architecture
            ),
            None => entry.uri.clone(),
        }
    }

    /// Every Packages URL to try, in order
    pub fn packages_urls(&self, entry: &RepositoryManifestEntry) -> Vec<String> {
        let base = self.packages_base(entry);
        PACKAGES_CANDIDATES
            .iter()
            .map(|codec| match codec {
                Some(codec) => format!("{}/Packages{}", base, codec.extension()),
                None => format!("{}/Packages", base),
            })
            .collect()
    }

    pub fn fetch_release(&self, entry: &RepositoryManifestEntry) -> ArtifactResult {
        let url = self.release_url(entry);
        let result = self.fetch_artifact(entry, &url);
        if !result.is_available() {
            warn!("Release unavailable for {} ({})", entry.slug, url);
        }
        result
    }

    pub fn fetch_packages(&self, entry: &RepositoryManifestEntry) -> ArtifactResult {
        for url in self.packages_urls(entry) {
            let result = self.fetch_artifact(entry, &url);
            if result.is_available() {
                debug!("Using {} for {}", url, entry.slug);
                return result;
            }
        }

        warn!("No usable Packages archive for {}", entry.slug);
        ArtifactResult::Unavailable
    }

    /// Optional payment endpoint advertised at `<uri>/payment_endpoint`
    ///
    /// Always fetched fresh; not cached.
    pub fn fetch_payment_endpoint(&self, entry: &RepositoryManifestEntry) -> Option<String> {
        let url = format!("{}/payment_endpoint", entry.uri);
        match self.transport.get_text(&url) {
            Ok(body) => {
                let endpoint = body.trim().trim_end_matches('/');
                (!endpoint.is_empty()).then(|| endpoint.to_string())
            }
            Err(e) => {
                debug!("No payment endpoint for {}: {}", entry.slug, e);
                None
            }
        }
    }

    fn fetch_artifact(&self, entry: &RepositoryManifestEntry, url: &str) -> ArtifactResult {
        let cache = match self.cache.scoped(&entry.slug) {
            Ok(cache) => cache,
            Err(e) => {
                warn!("No cache directory for {}: {}", entry.slug, e);
                return ArtifactResult::Unavailable;
            }
        };

        let mut body = match self.transport.get(url) {
            Ok(body) => body,
            Err(e) => {
                debug!("{}", e);
                return ArtifactResult::Unavailable;
            }
        };

        match cache.store(url, &mut body) {
            Ok(result) => result,
            Err(e) => {
                warn!("Failed to store {}: {}", url, e);
                ArtifactResult::Unavailable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::client::MemoryTransport;
    use std::io::Write;
    use tempfile::TempDir;

    fn fetcher(transport: Arc<MemoryTransport>) -> (TempDir, Fetcher) {
        let dir = TempDir::new().unwrap();
        let cache = ArtifactCache::new(dir.path()).unwrap();
        (dir, Fetcher::new(transport, cache))
    }

    fn xz(data: &[u8]) -> Vec<u8> {
        let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_urls_flat_layout() {
        let (_dir, fetcher) = fetcher(Arc::new(MemoryTransport::new()));
        let entry = RepositoryManifestEntry::new("chariz", 1, "https://repo.chariz.com/");

        assert_eq!(fetcher.release_url(&entry), "https://repo.chariz.com/Release");
        assert_eq!(
            fetcher.packages_urls(&entry),
            vec![
                "https://repo.chariz.com/Packages.zst",
                "https://repo.chariz.com/Packages.xz",
                "https://repo.chariz.com/Packages.bz2",
                "https://repo.chariz.com/Packages.lzma",
                "https://repo.chariz.com/Packages.gz",
                "https://repo.chariz.com/Packages",
            ]
        );
    }

    #[test]
    fn test_urls_distribution_layout() {
        let (_dir, fetcher) = fetcher(Arc::new(MemoryTransport::new()));
        let entry = RepositoryManifestEntry::new("bigboss", 3, "http://apt.example.org/cydia")
            .with_distribution("stable", "main");

        assert_eq!(
            fetcher.release_url(&entry),
            "http://apt.example.org/cydia/dists/stable/Release"
        );
        assert_eq!(
            fetcher.packages_base(&entry),
            "http://apt.example.org/cydia/dists/stable/main/binary-iphoneos-arm"
        );
    }

    #[test]
    fn test_packages_candidates_fall_through() {
        let transport = Arc::new(MemoryTransport::new());
        // A corrupt .xz must not stop the probe
        transport.insert("https://repo.example.com/Packages.xz", b"garbage".to_vec());
        transport.insert(
            "https://repo.example.com/Packages.bz2",
            b"still garbage".to_vec(),
        );
        transport.insert("https://repo.example.com/Packages", "Package: a\nVersion: 1\n");

        let (_dir, fetcher) = fetcher(transport.clone());
        let entry = RepositoryManifestEntry::new("example", 1, "https://repo.example.com");

        let result = fetcher.fetch_packages(&entry);
        assert!(matches!(result, ArtifactResult::Fresh(_)));
        assert_eq!(transport.hits("https://repo.example.com/Packages.zst"), 1);
        assert_eq!(transport.hits("https://repo.example.com/Packages.gz"), 1);
        assert_eq!(
            std::fs::read_to_string(result.path().unwrap()).unwrap(),
            "Package: a\nVersion: 1\n"
        );
    }

    #[test]
    fn test_undecodable_preferred_candidate_keeps_cache_hit() {
        let transport = Arc::new(MemoryTransport::new());
        transport.insert(
            "https://repo.example.com/Packages.xz",
            "<html>not found</html>",
        );
        transport.insert("https://repo.example.com/Packages", "Package: a\nVersion: 1\n");

        let (_dir, fetcher) = fetcher(transport);
        let entry = RepositoryManifestEntry::new("example", 1, "https://repo.example.com");

        assert!(matches!(fetcher.fetch_packages(&entry), ArtifactResult::Fresh(_)));
        assert!(fetcher.fetch_packages(&entry).is_cache_hit());
    }

    #[test]
    fn test_entries_sharing_a_uri_use_separate_files() {
        let transport = Arc::new(MemoryTransport::new());
        transport.insert("https://repo.example.com/Release", "Origin: Example\n");

        let (_dir, fetcher) = fetcher(transport);
        let first = RepositoryManifestEntry::new("first", 1, "https://repo.example.com");
        let second = RepositoryManifestEntry::new("second", 2, "https://repo.example.com");

        let a = fetcher.fetch_release(&first);
        let b = fetcher.fetch_release(&second);
        assert!(matches!(b, ArtifactResult::Fresh(_)));
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_packages_prefers_first_candidate() {
        let transport = Arc::new(MemoryTransport::new());
        transport.insert(
            "https://repo.example.com/Packages.xz",
            xz(b"Package: a\nVersion: 2\n"),
        );
        transport.insert("https://repo.example.com/Packages", "Package: a\nVersion: 1\n");

        let (_dir, fetcher) = fetcher(transport.clone());
        let entry = RepositoryManifestEntry::new("example", 1, "https://repo.example.com");

        let first = fetcher.fetch_packages(&entry);
        assert_eq!(
            std::fs::read_to_string(first.path().unwrap()).unwrap(),
            "Package: a\nVersion: 2\n"
        );
        assert_eq!(transport.hits("https://repo.example.com/Packages"), 0);

        assert!(fetcher.fetch_packages(&entry).is_cache_hit());
    }

    #[test]
    fn test_release_unavailable() {
        let (_dir, fetcher) = fetcher(Arc::new(MemoryTransport::new()));
        let entry = RepositoryManifestEntry::new("gone", 1, "https://gone.example.com");
        assert_eq!(fetcher.fetch_release(&entry), ArtifactResult::Unavailable);
    }

    #[test]
    fn test_payment_endpoint() {
        let transport = Arc::new(MemoryTransport::new());
        transport.insert(
            "https://repo.example.com/payment_endpoint",
            "https://pay.example.com/api/\n",
        );
        let (_dir, fetcher) = fetcher(transport);

        let entry = RepositoryManifestEntry::new("example", 1, "https://repo.example.com");
        assert_eq!(
            fetcher.fetch_payment_endpoint(&entry).as_deref(),
            Some("https://pay.example.com/api")
        );

        let other = RepositoryManifestEntry::new("other", 1, "https://other.example.com");
        assert_eq!(fetcher.fetch_payment_endpoint(&other), None);
    }
}
