//! SHA-256 checksum utilities
//!
//! One canonical format (`sha256:<hex>`) is used for usage digests,
//! extension fingerprints, recorded file inputs and repository markers.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Prefix for all checksums produced by this module
pub const PREFIX: &str = "sha256:";

/// Compute the prefixed SHA-256 checksum of raw bytes
pub fn sha256_prefixed(bytes: &[u8]) -> String {
    format!("{}{}", PREFIX, sha256_hex(bytes))
}

/// Compute the bare hex SHA-256 of raw bytes
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Checksum of a value's canonical JSON encoding.
///
/// Canonical here means `serde_json` output of types whose maps are
/// `BTreeMap`s, so key order never depends on insertion order.
pub fn canonical_json_checksum<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(value)?;
    Ok(sha256_prefixed(&bytes))
}

/// Strip the `sha256:` prefix, if present, and lowercase the hex digits
pub fn normalize_hex(checksum: &str) -> String {
    checksum
        .strip_prefix(PREFIX)
        .unwrap_or(checksum)
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn content_checksum_has_prefix() {
        assert!(sha256_prefixed(b"hello world").starts_with("sha256:"));
    }

    #[test]
    fn content_checksum_known_value() {
        assert_eq!(
            sha256_prefixed(b"hello world"),
            "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn canonical_json_ignores_insertion_order() {
        let mut a = BTreeMap::new();
        a.insert("b", 2);
        a.insert("a", 1);

        let mut b = BTreeMap::new();
        b.insert("a", 1);
        b.insert("b", 2);

        assert_eq!(
            canonical_json_checksum(&a).unwrap(),
            canonical_json_checksum(&b).unwrap()
        );
    }

    #[test]
    fn normalize_strips_prefix() {
        assert_eq!(normalize_hex("sha256:ABCD"), "abcd");
        assert_eq!(normalize_hex("abcd"), "abcd");
    }
}
