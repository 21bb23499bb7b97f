// src/repository/cache.rs

//! Content-addressed artifact cache
//!
//! Every fetched artifact lands at a deterministic path derived from its URL.
//! Beside the (decompressed) output sits a `.sha256` sidecar holding the
//! digest of the raw bytes that produced it. A fetch whose bytes hash to the
//! same digest is a cache hit and skips decompression and parsing.

use crate::compression::{self, Codec};
use crate::error::Result;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Read buffer used while streaming a response body to disk
const STREAM_BUFFER: usize = 8 * 1024;

/// Outcome of fetching one remote artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactResult {
    /// Not retrievable or not decodable
    Unavailable,
    /// Bytes identical to the cached copy; the path is the existing output
    CacheHit(PathBuf),
    /// New content written to the path
    Fresh(PathBuf),
}

impl ArtifactResult {
    /// Output path, unless unavailable
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Unavailable => None,
            Self::CacheHit(path) | Self::Fresh(path) => Some(path),
        }
    }

    pub fn is_cache_hit(&self) -> bool {
        matches!(self, Self::CacheHit(_))
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, Self::Unavailable)
    }
}

/// Artifact cache rooted at one directory
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    root: PathBuf,
}

impl ArtifactCache {
    /// Open the cache, creating the root directory if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Cache confined to one repository's subdirectory
    ///
    /// Two manifest entries that share a URI still get separate outputs and
    /// sidecars, so concurrent refreshes never write the same file.
    pub fn scoped(&self, slug: &str) -> Result<Self> {
        Self::new(self.root.join(mangle(slug)))
    }

    /// Path of the decoded output for `url`
    ///
    /// The scheme and any archive extension are dropped, then `.` and `/`
    /// become `_`: `https://repo.example.com/Packages.xz` maps to
    /// `<root>/repo_example_com_Packages`. The mapping is not injective
    /// (`a.b/x` and `a_b/x` collide); [`ArtifactCache::scoped`] keeps such
    /// collisions within one repository.
    pub fn output_path(&self, url: &str) -> PathBuf {
        let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
        let stem = match Codec::from_extension(without_scheme) {
            Some(codec) => &without_scheme[..without_scheme.len() - codec.extension().len()],
            None => without_scheme,
        };

        self.root.join(mangle(stem))
    }

    fn digest_path(output: &Path) -> PathBuf {
        let mut name = output.as_os_str().to_owned();
        name.push(".sha256");
        PathBuf::from(name)
    }

    /// Digest recorded for an existing output, if any
    pub fn cached_digest(&self, output: &Path) -> Option<String> {
        if !output.exists() {
            return None;
        }
        fs::read_to_string(Self::digest_path(output))
            .ok()
            .map(|digest| digest.trim().to_string())
    }

    /// Store the body of `url` read from `body`
    ///
    /// Compressed URLs (by extension) are decoded into a staging file first.
    /// The existing output and its sidecar are only replaced once the new
    /// output is complete and non-empty, so a candidate that fails to decode
    /// leaves the previous cache entry intact. Returns
    /// [`ArtifactResult::Unavailable`] when the decoded output is empty.
    pub fn store(&self, url: &str, body: &mut dyn Read) -> Result<ArtifactResult> {
        let output = self.output_path(url);
        let (download, digest) = self.download(body)?;

        if self.cached_digest(&output).as_deref() == Some(digest.as_str()) {
            debug!("Cache hit for {} ({})", url, digest);
            return Ok(ArtifactResult::CacheHit(output));
        }

        let staged = match Codec::from_extension(url) {
            Some(codec) => {
                let staged = NamedTempFile::new_in(&self.root)?.into_temp_path();
                match compression::decompress(codec, download.path(), &staged) {
                    Ok(written) => debug!("Decoded {} bytes of {} from {}", written, codec, url),
                    Err(e) => {
                        Self::keep_failed_archive(download, &output, codec);
                        return Err(e.into());
                    }
                }
                staged
            }
            None => download.into_temp_path(),
        };

        if fs::metadata(&staged)?.len() == 0 {
            warn!("Artifact {} is empty", url);
            return Ok(ArtifactResult::Unavailable);
        }

        // The sidecar must never describe a half-replaced output
        let sidecar = Self::digest_path(&output);
        remove_if_exists(&sidecar)?;
        staged.persist(&output).map_err(|e| e.error)?;
        fs::write(&sidecar, &digest)?;

        Ok(ArtifactResult::Fresh(output))
    }

    /// Leave an undecodable archive at `<output><ext>` for inspection
    fn keep_failed_archive(download: NamedTempFile, output: &Path, codec: Codec) {
        let mut archive = output.as_os_str().to_owned();
        archive.push(codec.extension());
        if let Err(e) = download.persist(PathBuf::from(archive)) {
            debug!("Failed to keep undecodable archive: {}", e.error);
        }
    }

    /// Stream `body` into a temp file inside the cache, hashing as it goes
    fn download(&self, body: &mut dyn Read) -> Result<(NamedTempFile, String)> {
        let mut temp = NamedTempFile::new_in(&self.root)?;
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; STREAM_BUFFER];

        loop {
            let n = match body.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            hasher.update(&buffer[..n]);
            temp.write_all(&buffer[..n])?;
        }
        temp.flush()?;

        Ok((temp, hex::encode(hasher.finalize())))
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn mangle(name: &str) -> String {
    name.replace(['.', '/'], "_")
}
