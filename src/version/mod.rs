// src/version/mod.rs

//! dpkg version ordering
//!
//! Versions have the form `[epoch:]upstream[-revision]`. Epochs compare
//! numerically; upstream and revision compare with dpkg's `verrevcmp`,
//! which alternates between non-digit and digit runs:
//!
//! - `~` sorts before everything, including the end of the string
//! - letters sort by byte value
//! - any other byte sorts after all letters
//! - digit runs compare by magnitude
//!
//! The comparison is total over arbitrary input and never panics.

use std::cmp::Ordering;
use std::fmt;

/// A raw dpkg version string ordered by [`compare`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DebianVersion(String);

/// Components of a dpkg version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct VersionParts<'a> {
    epoch: i64,
    upstream: &'a str,
    revision: &'a str,
}

impl DebianVersion {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DebianVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Ord for DebianVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(&self.0, &other.0)
    }
}

impl PartialOrd for DebianVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Split a raw version into epoch, upstream version and revision
///
/// The epoch is everything before the first `:` (0 when absent or not a
/// number); the revision is everything after the last `-` (`"0"` when absent).
fn split(raw: &str) -> VersionParts<'_> {
    let (epoch, rest) = match raw.split_once(':') {
        Some((epoch, rest)) => (epoch.trim().parse::<i64>().unwrap_or(0), rest),
        None => (0, raw),
    };

    let (upstream, revision) = match rest.rsplit_once('-') {
        Some((upstream, revision)) => (upstream, revision),
        None => (rest, "0"),
    };

    VersionParts {
        epoch,
        upstream,
        revision,
    }
}

/// Compare two dpkg version strings
pub fn compare(left: &str, right: &str) -> Ordering {
    let left = split(left);
    let right = split(right);

    left.epoch
        .cmp(&right.epoch)
        .then_with(|| verrevcmp(left.upstream.as_bytes(), right.upstream.as_bytes()))
        .then_with(|| verrevcmp(left.revision.as_bytes(), right.revision.as_bytes()))
}

/// Compare two versions returning `1`, `0` or `-1`
pub fn compare_i32(left: &str, right: &str) -> i32 {
    match compare(left, right) {
        Ordering::Greater => 1,
        Ordering::Equal => 0,
        Ordering::Less => -1,
    }
}

/// Weight of a byte inside a non-digit run; `None` is end of string
fn order(c: Option<u8>) -> i32 {
    match c {
        None => 0,
        Some(c) if c.is_ascii_digit() => 0,
        Some(c) if c.is_ascii_alphabetic() => i32::from(c),
        Some(b'~') => -1,
        Some(c) => i32::from(c) + 256,
    }
}

fn verrevcmp(a: &[u8], b: &[u8]) -> Ordering {
    let is_digit = |s: &[u8], i: usize| s.get(i).is_some_and(u8::is_ascii_digit);
    let (mut i, mut j) = (0usize, 0usize);

    while i < a.len() || j < b.len() {
        while (i < a.len() && !is_digit(a, i)) || (j < b.len() && !is_digit(b, j)) {
            let ac = order(a.get(i).copied());
            let bc = order(b.get(j).copied());
            if ac != bc {
                return ac.cmp(&bc);
            }
            i += 1;
            j += 1;
        }

        while a.get(i) == Some(&b'0') {
            i += 1;
        }
        while b.get(j) == Some(&b'0') {
            j += 1;
        }

        let mut first_diff = Ordering::Equal;
        while is_digit(a, i) && is_digit(b, j) {
            if first_diff == Ordering::Equal {
                first_diff = a[i].cmp(&b[j]);
            }
            i += 1;
            j += 1;
        }

        if is_digit(a, i) {
            return Ordering::Greater;
        }
        if is_digit(b, j) {
            return Ordering::Less;
        }
        if first_diff != Ordering::Equal {
            return first_diff;
        }
    }

    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    // (left, right, expected) drawn from dpkg's own version test table
    const VECTORS: &[(&str, &str, i32)] = &[
        ("0", "0", 0),
        ("0", "00", 0),
        ("1:0-1", "0-1", 1),
        ("1.0~rc1", "1.0", -1),
        ("1.9", "1.10", -1),
        ("1.0", "1.0a", -1),
        ("1.0", "1.0-0", 0),
        ("1.0-1", "1.0-2", -1),
        ("1.0-1", "1.0-1.1", -1),
        ("1.0~", "1.0~~", 1),
        ("1.0~~a", "1.0~~", 1),
        ("1.0~", "1.0", -1),
        ("2.0", "10.0", -1),
        ("1.0+b1", "1.0", 1),
        ("1.0.", "1.0a", 1),
        ("a", "A", 1),
        ("1:1.0", "2:0.1", -1),
        ("0:1.0", "1.0", 0),
        ("1.2.3-4-5", "1.2.3-4", 1),
        ("001.2", "1.02", 0),
    ];

    #[test]
    fn test_dpkg_vectors() {
        for (left, right, expected) in VECTORS {
            assert_eq!(
                compare_i32(left, right),
                *expected,
                "compare({:?}, {:?})",
                left,
                right
            );
        }
    }

    #[test]
    fn test_antisymmetry_and_reflexivity() {
        for (left, right, _) in VECTORS {
            assert_eq!(compare_i32(left, right), -compare_i32(right, left));
            assert_eq!(compare_i32(left, left), 0);
        }
    }

    #[test]
    fn test_epoch_dominates() {
        assert_eq!(compare("1:0.1", "0:99.9~zzz-99"), Ordering::Greater);
        assert_eq!(compare("-1:5.0", "1.0"), Ordering::Less);
    }

    #[test]
    fn test_malformed_versions_do_not_panic() {
        let junk = ["", ":", "-", "::-", "abc:1.0", "1:", "~", "1.0-", "\u{7f}", "99999999999999999999:1"];
        for left in junk {
            for right in junk {
                assert_eq!(compare_i32(left, right), -compare_i32(right, left));
            }
        }
        assert_eq!(compare("abc:1.0", "1.0"), Ordering::Equal);
    }

    #[test]
    fn test_split() {
        let parts = split("2:1.2.3-4ubuntu1");
        assert_eq!(parts.epoch, 2);
        assert_eq!(parts.upstream, "1.2.3");
        assert_eq!(parts.revision, "4ubuntu1");

        let parts = split("1.0");
        assert_eq!(parts.epoch, 0);
        assert_eq!(parts.upstream, "1.0");
        assert_eq!(parts.revision, "0");
    }

    #[test]
    fn test_debian_version_ordering() {
        let mut versions: Vec<DebianVersion> = ["1.10", "1.0~beta", "1:0.1", "1.9", "1.0"]
            .into_iter()
            .map(DebianVersion::new)
            .collect();
        versions.sort();

        let sorted: Vec<&str> = versions.iter().map(DebianVersion::as_str).collect();
        assert_eq!(sorted, vec!["1.0~beta", "1.0", "1.9", "1.10", "1:0.1"]);
    }
}
