// src/error.rs

use crate::compression::CodecError;
use crate::repository::client::FetchError;
use crate::repository::manifest::ManifestError;
use thiserror::Error;

/// Core error types for Canister
#[derive(Error, Debug)]
pub enum Error {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Archive decompression errors
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Remote artifact could not be retrieved
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Repository manifest could not be used
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// JSON encoding errors for stored lists
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Database initialization error
    #[error("Failed to initialize database: {0}")]
    InitError(String),

    /// Database not found
    #[error("Database not found at path: {0}")]
    DatabaseNotFound(String),

    /// Configuration file could not be loaded
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type alias using Canister's Error type
pub type Result<T> = std::result::Result<T, Error>;
