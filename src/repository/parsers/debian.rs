// src/repository/parsers/debian.rs

//! Release and Packages views over the control-file grammar
//!
//! A Release file is a single block describing the repository. A Packages
//! file holds one block per package version; blocks are parsed in parallel
//! and joined back in file order.

use super::{ControlFields, parse_block, split_blocks};
use rayon::prelude::*;
use std::collections::BTreeSet;
use tracing::debug;

/// Release keys retained for the repository record
pub const RELEASE_KEYS: &[&str] = &[
    "Origin",
    "Label",
    "Name",
    "Suite",
    "Version",
    "Codename",
    "Architectures",
    "Components",
    "Description",
    "Date",
    "Payment-Gateway",
];

/// Packages keys retained for versioned package records
pub const PACKAGE_KEYS: &[&str] = &[
    "Package",
    "Version",
    "Architecture",
    "Filename",
    "SHA256",
    "Name",
    "Description",
    "Author",
    "Maintainer",
    "Depiction",
    "SileoDepiction",
    "Header",
    "Tint",
    "Icon",
    "Section",
    "Tag",
    "Installed-Size",
    "Size",
];

/// Tag marking a package that must be bought through the payment endpoint
pub const COMMERCIAL_TAG: &str = "cydia::commercial";

/// Metadata from a repository's Release file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseMetadata {
    fields: ControlFields,
}

impl ReleaseMetadata {
    pub fn parse(content: &str) -> Self {
        Self {
            fields: parse_block(content, RELEASE_KEYS),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Display name: `Label`, then `Origin`, then `Name`
    pub fn name(&self) -> Option<&str> {
        self.get("Label")
            .or_else(|| self.get("Origin"))
            .or_else(|| self.get("Name"))
    }

    pub fn version(&self) -> Option<&str> {
        self.get("Version")
    }

    pub fn description(&self) -> Option<&str> {
        self.get("Description")
    }

    pub fn date(&self) -> Option<&str> {
        self.get("Date")
    }

    pub fn payment_gateway(&self) -> Option<&str> {
        self.get("Payment-Gateway")
    }
}

/// One package block from a Packages file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    package: String,
    version: String,
    fields: ControlFields,
}

impl PackageRecord {
    /// Build a record from parsed fields
    ///
    /// Returns `None` when `Package` or `Version` is missing or empty, since
    /// such a block can be neither owned nor ordered.
    pub fn from_fields(fields: ControlFields) -> Option<Self> {
        let package = fields.get("Package").filter(|v| !v.is_empty())?.clone();
        let version = fields.get("Version").filter(|v| !v.is_empty())?.clone();

        Some(Self {
            package,
            version,
            fields,
        })
    }

    pub fn parse(block: &str) -> Option<Self> {
        Self::from_fields(parse_block(block, PACKAGE_KEYS))
    }

    /// Package identifier (the `Package` field)
    pub fn id(&self) -> &str {
        &self.package
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn section(&self) -> Option<&str> {
        self.get("Section")
    }

    /// Whether the `Tag` field marks this package as paid
    pub fn is_commercial(&self) -> bool {
        self.get("Tag")
            .is_some_and(|tag| tag.contains(COMMERCIAL_TAG))
    }

    /// Deterministic key of the versioned row this record produces in `slug`
    pub fn vpackage_uuid(&self, slug: &str) -> String {
        vpackage_uuid(&self.package, &self.version, slug)
    }
}

/// Composite key `package$$version$$slug`
pub fn vpackage_uuid(package: &str, version: &str, slug: &str) -> String {
    format!("{}$${}$${}", package, version, slug)
}

/// Aggregate view over one Packages file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackagesInfo {
    pub packages: Vec<PackageRecord>,
    pub count: usize,
    pub sections: BTreeSet<String>,
}

impl PackagesInfo {
    /// Parse every block of a Packages file
    ///
    /// Blocks are parsed in parallel on the current rayon pool; the result
    /// keeps file order. Blocks without `Package`/`Version` are skipped.
    pub fn parse(content: &str) -> Self {
        let blocks = split_blocks(content);
        let total = blocks.len();

        let packages: Vec<PackageRecord> = blocks
            .par_iter()
            .filter_map(|block| PackageRecord::parse(block))
            .collect();

        if packages.len() != total {
            debug!(
                "Skipped {} blocks without Package/Version",
                total - packages.len()
            );
        }

        let sections = packages
            .iter()
            .filter_map(|pkg| pkg.section())
            .map(str::to_string)
            .collect();

        Self {
            count: packages.len(),
            packages,
            sections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELEASE: &str = "Origin: Example Repo\nLabel: Example\nSuite: stable\nVersion: 1.0\n\
Codename: ios\nArchitectures: iphoneos-arm\nComponents: main\nDescription: Tweaks and themes\n\
Date: Sat, 01 Jan 2022 00:00:00 UTC\nMD5Sum:\n 0123 456 Packages\n";

    const PACKAGES: &str = "Package: com.example.tweak\nVersion: 1.0-1\nArchitecture: iphoneos-arm\n\
Section: Tweaks\nTag: purpose::extension, cydia::commercial\nDescription: A tweak\n\n\
Package: com.example.theme\nVersion: 2.0\nSection: Themes\nDepends: firmware (>= 12.0)\n\n\
Version: 3.0\nName: orphan block\n\n\
Package: com.example.other\nVersion: 0.9\nSection: Tweaks\n";

    #[test]
    fn test_release_metadata() {
        let release = ReleaseMetadata::parse(RELEASE);

        assert_eq!(release.name(), Some("Example"));
        assert_eq!(release.version(), Some("1.0"));
        assert_eq!(release.description(), Some("Tweaks and themes"));
        assert_eq!(release.date(), Some("Sat, 01 Jan 2022 00:00:00 UTC"));
        assert_eq!(release.payment_gateway(), None);
        assert_eq!(release.get("MD5Sum"), None);
    }

    #[test]
    fn test_release_name_fallback() {
        let release = ReleaseMetadata::parse("Origin: Only Origin\n");
        assert_eq!(release.name(), Some("Only Origin"));
    }

    #[test]
    fn test_packages_info() {
        let info = PackagesInfo::parse(PACKAGES);

        assert_eq!(info.count, 3);
        assert_eq!(info.packages[0].id(), "com.example.tweak");
        assert_eq!(info.packages[1].id(), "com.example.theme");
        assert_eq!(info.packages[2].id(), "com.example.other");
        assert_eq!(
            info.sections.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["Themes", "Tweaks"]
        );
        assert_eq!(info.packages[1].get("Depends"), None);
    }

    #[test]
    fn test_commercial_tag() {
        let info = PackagesInfo::parse(PACKAGES);
        assert!(info.packages[0].is_commercial());
        assert!(!info.packages[1].is_commercial());
    }

    #[test]
    fn test_vpackage_uuid() {
        let record = PackageRecord::parse("Package: com.example.tweak\nVersion: 1:2.0-3\n").unwrap();
        assert_eq!(record.vpackage_uuid("bigboss"), "com.example.tweak$$1:2.0-3$$bigboss");
    }

    #[test]
    fn test_record_requires_package_and_version() {
        assert!(PackageRecord::parse("Package: a\n").is_none());
        assert!(PackageRecord::parse("Version: 1\n").is_none());
        assert!(PackageRecord::parse("Package: \nVersion: 1\n").is_none());
    }
}
