// src/lib.rs

//! Canister
//!
//! Ingestion pipeline for APT-style jailbreak package repositories. Fetches
//! every repository named in a manifest, decodes and parses its Release and
//! Packages files, and keeps a deduplicated, ranked view of packages across
//! repositories.
//!
//! # Architecture
//!
//! - Content-hash caching: unchanged repositories are skipped wholesale
//! - Ownership by ranking: a package id belongs to its best-ranked publisher
//! - Current version by dpkg ordering across every publisher
//! - Database-first: all state in SQLite, one transaction per package record

pub mod compression;
pub mod config;
pub mod db;
mod error;
pub mod repository;
pub mod server;
pub mod version;

pub use config::Config;
pub use error::{Error, Result};
