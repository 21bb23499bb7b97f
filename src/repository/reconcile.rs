// src/repository/reconcile.rs

//! Cross-repository reconciliation
//!
//! Many repositories publish the same package id. For every record this
//! decides which repository owns the id (best ranking wins, and ownership
//! only ever moves to a strictly better ranking) and which published
//! version is current (greatest under dpkg ordering). Each record is
//! reconciled in its own transaction.

use super::client::Transport;
use super::manifest::RepositoryManifestEntry;
use super::parsers::{PackageRecord, PackagesInfo};
use crate::db::Database;
use crate::db::models::{Package, Price, Repository, VPackage};
use crate::error::Result;
use crate::version::DebianVersion;
use tracing::{debug, error, info};

/// What happened to the ownership of a package id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// The id was unowned and this repository claimed it
    Claimed,
    /// Ownership moved to this repository
    Transferred,
    /// Another repository with an equal or better ranking keeps it
    Retained,
    /// This repository already owned it
    Owned,
}

/// Result of reconciling one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciled {
    pub ownership: Ownership,
    /// Whether the record's row is the current version afterwards
    pub current: bool,
}

/// Counters for one repository's records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub reconciled: usize,
    pub failed: usize,
}

/// Classify the price of `record`
///
/// Non-commercial packages are free. Commercial ones ask the payment
/// endpoint for `<endpoint>/package/<id>/info`; anything short of a
/// `price` string in the reply is [`Price::Paid`].
pub fn classify_price(
    transport: &dyn Transport,
    endpoint: Option<&str>,
    record: &PackageRecord,
) -> Price {
    if !record.is_commercial() {
        return Price::Free;
    }

    let Some(endpoint) = endpoint else {
        return Price::Paid;
    };

    let url = format!("{}/package/{}/info", endpoint, record.id());
    match transport.post_json(&url, &serde_json::json!({})) {
        Ok(reply) => match reply.get("price").and_then(|price| price.as_str()) {
            Some(price) if !price.trim().is_empty() => Price::Quoted(price.trim().to_string()),
            _ => Price::Paid,
        },
        Err(e) => {
            debug!("Price probe for {} failed: {}", record.id(), e);
            Price::Paid
        }
    }
}

/// Reconcile one package record published by `entry`
pub fn reconcile_package(
    db: &Database,
    entry: &RepositoryManifestEntry,
    record: &PackageRecord,
    price: Price,
) -> Result<Reconciled> {
    let slug = entry.slug.as_str();
    let id = record.id();

    db.transaction(|tx| {
        let ownership = match Package::owner(tx, id)? {
            None => {
                Package::new(id.to_string(), slug.to_string(), price).upsert(tx)?;
                VPackage::from_record(record, slug, true).upsert(tx)?;
                return Ok(Reconciled {
                    ownership: Ownership::Claimed,
                    current: true,
                });
            }
            Some(owner) if owner == slug => {
                Package::new(id.to_string(), slug.to_string(), price).upsert(tx)?;
                Ownership::Owned
            }
            Some(owner) => {
                if entry.ranking < Repository::ranking(tx, &owner)? {
                    debug!("{} moves from {} to {}", id, owner, slug);
                    Package::new(id.to_string(), slug.to_string(), price).upsert(tx)?;
                    Ownership::Transferred
                } else {
                    Ownership::Retained
                }
            }
        };

        let uuid = record.vpackage_uuid(slug);
        let Some(current) = VPackage::current(tx, id)? else {
            // No current row to compare against: this one becomes current
            VPackage::from_record(record, slug, true).upsert(tx)?;
            return Ok(Reconciled {
                ownership,
                current: true,
            });
        };

        let is_current = current.uuid == uuid;
        VPackage::from_record(record, slug, is_current).upsert(tx)?;

        if !is_current
            && DebianVersion::new(record.version()) > DebianVersion::new(current.version)
        {
            VPackage::set_current(tx, &uuid, id)?;
            return Ok(Reconciled {
                ownership,
                current: true,
            });
        }

        Ok(Reconciled {
            ownership,
            current: is_current,
        })
    })
}

/// Reconcile every record of one repository
///
/// A failed record is logged and rolled back; the rest still go through.
pub fn reconcile_repository(
    db: &Database,
    transport: &dyn Transport,
    entry: &RepositoryManifestEntry,
    payment_endpoint: Option<&str>,
    info: &PackagesInfo,
) -> ReconcileSummary {
    let mut summary = ReconcileSummary::default();

    for record in &info.packages {
        let price = classify_price(transport, payment_endpoint, record);
        match reconcile_package(db, entry, record, price) {
            Ok(_) => summary.reconciled += 1,
            Err(e) => {
                error!(
                    "Failed to reconcile {} {} from {}: {}",
                    record.id(),
                    record.version(),
                    entry.slug,
                    e
                );
                summary.failed += 1;
            }
        }
    }

    info!(
        "Reconciled {} packages from {} ({} failed)",
        summary.reconciled, entry.slug, summary.failed
    );
    summary
}
