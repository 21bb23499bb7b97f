// src/repository/mod.rs

//! Repository ingestion
//!
//! This module provides functionality for:
//! - Reading the repository manifest
//! - Fetching Release and Packages artifacts with content-hash caching
//! - Parsing APT control files
//! - Reconciling package ownership and current versions across repositories
//! - Orchestrating a full refresh cycle

pub mod cache;
pub mod client;
pub mod fetch;
pub mod manifest;
pub mod parsers;
pub mod reconcile;
pub mod sync;

pub use cache::{ArtifactCache, ArtifactResult};
pub use client::{FetchError, HttpTransport, MemoryTransport, Transport};
pub use fetch::Fetcher;
pub use manifest::{Manifest, ManifestError, RepositoryManifestEntry};
pub use reconcile::{Ownership, Reconciled, ReconcileSummary, reconcile_package, reconcile_repository};
pub use sync::{Progress, RefreshSummary, Refresher, RepositoryOutcome, refresh_with_config};
