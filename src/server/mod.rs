// src/server/mod.rs
//! Canister control plane
//!
//! This module provides an HTTP server that:
//! - Answers health checks
//! - Accepts `refresh` commands on an authenticated WebSocket channel
//! - Streams refresh progress back to the requesting client
//!
//! At most one refresh runs per process. It runs on a blocking thread so
//! the server keeps answering while repositories are ingested.

mod routes;
mod ws;

pub use routes::create_router;

use crate::config::Config;
use crate::db::Database;
use crate::error::Error;
use crate::repository::sync::{self, Progress, RefreshSummary};
use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// Shared server state
pub struct ServerState {
    pub config: Config,
    pub db: Arc<Database>,
    refreshing: AtomicBool,
}

/// Clears the running flag when a refresh ends, even by panic
struct RefreshGuard(Arc<ServerState>);

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.0.refreshing.store(false, Ordering::SeqCst);
    }
}

impl ServerState {
    pub fn new(config: Config, db: Arc<Database>) -> Self {
        Self {
            config,
            db,
            refreshing: AtomicBool::new(false),
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::SeqCst)
    }

    /// Check an `Authorization` header value against the configured token
    ///
    /// With no token configured the channel is open.
    pub fn authorize(&self, authorization: Option<&str>) -> bool {
        let Some(expected) = self.config.server.token.as_deref() else {
            return true;
        };

        authorization
            .and_then(|value| value.strip_prefix("Bearer "))
            .is_some_and(|token| token.trim() == expected)
    }

    /// Start a refresh cycle, streaming its progress lines
    ///
    /// Returns `None` when a refresh is already running.
    pub fn start_refresh(self: &Arc<Self>) -> Option<mpsc::UnboundedReceiver<String>> {
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let guard = RefreshGuard(Arc::clone(self));

        tokio::task::spawn_blocking(move || {
            let state = &guard.0;
            let report = |progress: Progress| {
                // The client may have gone away; the refresh still finishes
                let _ = tx.send(progress.to_string());
            };

            match sync::refresh_with_config(&state.config, &state.db, &report) {
                Ok(RefreshSummary {
                    successful,
                    failed,
                    cached,
                }) => {
                    tracing::info!(
                        "Refresh complete: {} succeeded, {} failed, {} cached",
                        successful,
                        failed,
                        cached
                    );
                }
                // Already reported as failed:manifest
                Err(Error::Manifest(_)) => {}
                Err(e) => {
                    tracing::error!("Refresh could not start: {}", e);
                    report(Progress::ManifestFailed);
                }
            }
        });

        Some(rx)
    }
}

/// Start the Canister server
pub async fn run_server(config: Config) -> Result<()> {
    let bind_addr = config.bind_addr()?;
    tracing::info!("Starting Canister server on {}", bind_addr);
    tracing::info!("Database: {:?}", config.storage.database);
    tracing::info!("Artifact cache: {:?}", config.storage.cache_dir);

    if config.server.token.is_none() {
        tracing::warn!("No control token configured; the command channel is unauthenticated");
    }

    std::fs::create_dir_all(&config.storage.cache_dir)?;
    let db_path = config.storage.database.to_string_lossy().into_owned();
    let db = Arc::new(Database::open(&db_path)?);

    let state = Arc::new(ServerState::new(config, db));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Canister is ready to serve");

    axum::serve(listener, app).await?;
    Ok(())
}
