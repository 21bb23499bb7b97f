// src/repository/sync.rs

//! Refresh cycle orchestration
//!
//! A refresh fetches the manifest, then runs Fetch -> Parse -> Reconcile for
//! every listed repository on a bounded rayon pool, reporting progress as it
//! goes and a success/failed/cached tally at the end.

use super::cache::{ArtifactCache, ArtifactResult};
use super::client::HttpTransport;
use super::fetch::Fetcher;
use super::manifest::{Manifest, ManifestError, RepositoryManifestEntry};
use super::parsers::{PackagesInfo, ReleaseMetadata};
use super::reconcile;
use crate::config::Config;
use crate::db::Database;
use crate::db::models::Repository;
use crate::error::{Error, Result};
use rayon::prelude::*;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Default number of repositories processed at once
pub const DEFAULT_WORKERS: usize = 8;

/// Progress message emitted during a refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    FetchingManifest,
    ManifestFailed,
    /// A manifest entry was rejected; carries its slug or index
    EntryRejected(String),
    ReleaseFailed(String),
    PackagesFailed(String),
    DatabaseFailed(String),
    Success(usize),
    Failed(usize),
    Cached(usize),
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Progress::FetchingManifest => write!(f, "fetching repository manifest"),
            Progress::ManifestFailed => write!(f, "failed:manifest"),
            Progress::EntryRejected(label) => write!(f, "failed:manifest:{}", label),
            Progress::ReleaseFailed(slug) => write!(f, "failed:release:{}", slug),
            Progress::PackagesFailed(slug) => write!(f, "failed:packages:{}", slug),
            Progress::DatabaseFailed(slug) => write!(f, "failed:database:{}", slug),
            Progress::Success(n) => write!(f, "success:{}", n),
            Progress::Failed(n) => write!(f, "failed:{}", n),
            Progress::Cached(n) => write!(f, "cached:{}", n),
        }
    }
}

/// Counters for one refresh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub successful: usize,
    pub failed: usize,
    pub cached: usize,
}

/// How one repository fared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryOutcome {
    Success,
    Cached,
    Failed,
}

/// Drives refresh cycles against one database
pub struct Refresher<'a> {
    db: &'a Database,
    fetcher: &'a Fetcher,
    workers: usize,
}

impl<'a> Refresher<'a> {
    pub fn new(db: &'a Database, fetcher: &'a Fetcher) -> Self {
        Self {
            db,
            fetcher,
            workers: DEFAULT_WORKERS,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Run one refresh cycle against the manifest at `manifest_url`
    ///
    /// Fails only when the manifest itself cannot be fetched or parsed;
    /// per-repository failures are counted in the summary.
    pub fn refresh<P>(&self, manifest_url: &str, progress: &P) -> Result<RefreshSummary>
    where
        P: Fn(Progress) + Sync,
    {
        let started = Instant::now();
        progress(Progress::FetchingManifest);

        let manifest = match Manifest::fetch(self.fetcher.transport(), manifest_url) {
            Ok(manifest) => manifest,
            Err(e) => {
                error!("{}", e);
                progress(Progress::ManifestFailed);
                return Err(e.into());
            }
        };

        let mut summary = RefreshSummary::default();
        for rejected in &manifest.rejected {
            if let ManifestError::InvalidEntry { label, .. } = rejected {
                progress(Progress::EntryRejected(label.clone()));
            }
            summary.failed += 1;
        }

        let outcomes = self.run_entries(&manifest.entries, progress)?;
        for outcome in outcomes {
            match outcome {
                RepositoryOutcome::Success => summary.successful += 1,
                RepositoryOutcome::Cached => summary.cached += 1,
                RepositoryOutcome::Failed => summary.failed += 1,
            }
        }

        info!(
            "Refresh finished in {:.1}s: {} succeeded, {} failed, {} cached",
            started.elapsed().as_secs_f64(),
            summary.successful,
            summary.failed,
            summary.cached
        );

        progress(Progress::Success(summary.successful));
        progress(Progress::Failed(summary.failed));
        progress(Progress::Cached(summary.cached));

        Ok(summary)
    }

    /// Process entries on a pool of `workers` threads, keeping manifest order
    pub fn run_entries<P>(
        &self,
        entries: &[RepositoryManifestEntry],
        progress: &P,
    ) -> Result<Vec<RepositoryOutcome>>
    where
        P: Fn(Progress) + Sync,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("canister-refresh-{}", i))
            .build()
            .map_err(|e| Error::InitError(format!("Failed to build refresh pool: {}", e)))?;

        Ok(pool.install(|| {
            entries
                .par_iter()
                .map(|entry| self.process(entry, progress))
                .collect()
        }))
    }

    /// Fetch, parse and reconcile one repository
    pub fn process<P>(&self, entry: &RepositoryManifestEntry, progress: &P) -> RepositoryOutcome
    where
        P: Fn(Progress) + Sync,
    {
        info!("Refreshing {} ({})", entry.slug, entry.uri);

        let release = self.fetcher.fetch_release(entry);
        let Some(release_path) = release.path() else {
            progress(Progress::ReleaseFailed(entry.slug.clone()));
            return RepositoryOutcome::Failed;
        };

        let packages = self.fetcher.fetch_packages(entry);
        let Some(packages_path) = packages.path() else {
            progress(Progress::PackagesFailed(entry.slug.clone()));
            return RepositoryOutcome::Failed;
        };

        let existing = match self
            .db
            .with_connection(|conn| Repository::find_by_slug(conn, &entry.slug))
        {
            Ok(existing) => existing,
            Err(e) => {
                error!("Failed to read repository {}: {}", entry.slug, e);
                progress(Progress::DatabaseFailed(entry.slug.clone()));
                return RepositoryOutcome::Failed;
            }
        };

        if release.is_cache_hit() && packages.is_cache_hit() && existing.is_some() {
            info!("{} is unchanged", entry.slug);
            return RepositoryOutcome::Cached;
        }

        let payment_endpoint = self.fetcher.fetch_payment_endpoint(entry);

        let metadata = match read_artifact(release_path) {
            Ok(content) => ReleaseMetadata::parse(&content),
            Err(e) => {
                warn!("Failed to read Release of {}: {}", entry.slug, e);
                progress(Progress::ReleaseFailed(entry.slug.clone()));
                return RepositoryOutcome::Failed;
            }
        };

        // Unchanged package list: only the repository row needs rewriting
        let reuse = match (&packages, existing) {
            (ArtifactResult::CacheHit(_), Some(existing)) => Some(existing),
            _ => None,
        };

        let (info, mut repository) = match reuse {
            Some(existing) => {
                let mut repository = repository_row(entry, &metadata, payment_endpoint.clone());
                repository.package_count = existing.package_count;
                repository.sections = existing.sections;
                (None, repository)
            }
            None => {
                let info = match read_artifact(packages_path) {
                    Ok(content) => PackagesInfo::parse(&content),
                    Err(e) => {
                        warn!("Failed to read Packages of {}: {}", entry.slug, e);
                        progress(Progress::PackagesFailed(entry.slug.clone()));
                        return RepositoryOutcome::Failed;
                    }
                };
                let repository = repository_row(entry, &metadata, payment_endpoint.clone());
                (Some(info), repository)
            }
        };

        if let Some(info) = &info {
            repository.package_count = info.count as i64;
            repository.sections = info.sections.iter().cloned().collect();
        }

        if let Err(e) = self.db.transaction(|tx| repository.upsert(tx)) {
            error!("Failed to write repository {}: {}", entry.slug, e);
            progress(Progress::DatabaseFailed(entry.slug.clone()));
            return RepositoryOutcome::Failed;
        }

        if let Some(info) = info {
            reconcile::reconcile_repository(
                self.db,
                self.fetcher.transport(),
                entry,
                payment_endpoint.as_deref(),
                &info,
            );
        }

        RepositoryOutcome::Success
    }
}

fn read_artifact(path: &Path) -> std::io::Result<String> {
    // Repositories do not all serve valid UTF-8
    Ok(String::from_utf8_lossy(&std::fs::read(path)?).into_owned())
}

/// Repository row for `entry` carrying its Release metadata
fn repository_row(
    entry: &RepositoryManifestEntry,
    metadata: &ReleaseMetadata,
    payment_endpoint: Option<String>,
) -> Repository {
    let field = |value: Option<&str>| value.map(str::to_string);

    let mut repository = Repository::new(entry.slug.clone(), entry.ranking, entry.uri.clone());
    repository.aliases = entry.aliases.clone();
    repository.dist = entry.dist.clone();
    repository.suite = entry.suite.clone();
    repository.name = field(metadata.name());
    repository.version = field(metadata.version());
    repository.description = field(metadata.description());
    repository.date = field(metadata.date());
    repository.payment_gateway = field(metadata.payment_gateway());
    repository.payment_endpoint = payment_endpoint;
    repository
}

/// Run one refresh with the network stack described by `config`
///
/// Builds a blocking HTTP client, so call it from a blocking thread.
pub fn refresh_with_config<P>(
    config: &Config,
    db: &Database,
    progress: &P,
) -> Result<RefreshSummary>
where
    P: Fn(Progress) + Sync,
{
    let manifest_url = config.manifest_url()?;
    let transport = HttpTransport::new(config.refresh.timeout(), &config.headers)?;
    let cache = ArtifactCache::new(&config.storage.cache_dir)?;
    let fetcher =
        Fetcher::new(Arc::new(transport), cache).with_architecture(&config.refresh.architecture);

    Refresher::new(db, &fetcher)
        .with_workers(config.refresh.workers)
        .refresh(manifest_url, progress)
}
