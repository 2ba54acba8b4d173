#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! BLAKE3 fingerprints and source checksums for picopkg
//!
//! Fingerprints key the build cache: a hash over a package's own descriptor
//! fields and the fingerprints of its dependencies. The `checksums` module
//! holds the md5/sha1/sha256/sha512 digests used for source verification.

pub mod checksums;

use blake3::Hasher;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A BLAKE3 fingerprint value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    bytes: [u8; 32],
}

impl Fingerprint {
    /// Compute a fingerprint of a byte slice
    #[must_use]
    pub fn from_data(data: &[u8]) -> Self {
        let hash = blake3::hash(data);
        Self {
            bytes: *hash.as_bytes(),
        }
    }

    /// Fingerprint a package: its serialized descriptor fields chained with
    /// the fingerprints of its dependencies, in declared order
    ///
    /// Dependency fingerprints must already be resolved, which the wave
    /// ordering guarantees. Any upstream change alters a dependency
    /// fingerprint and so invalidates every transitive dependent.
    #[must_use]
    pub fn for_package(descriptor_bytes: &[u8], dependency_fingerprints: &[Fingerprint]) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(descriptor_bytes);
        for dep in dependency_fingerprints {
            hasher.update(&dep.bytes);
        }
        Self {
            bytes: *hasher.finalize().as_bytes(),
        }
    }

    /// Convert to hex string
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Parse from hex string
    ///
    /// # Errors
    /// Returns an error if the input is not exactly 64 hex characters.
    pub fn from_hex(s: &str) -> Result<Self, picopkg_errors::Error> {
        let bytes = hex::decode(s)
            .map_err(|e| picopkg_errors::Error::internal(format!("invalid hex: {e}")))?;
        if bytes.len() != 32 {
            return Err(picopkg_errors::Error::internal(format!(
                "fingerprint must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut array = [0u8; 32];
        array.copy_from_slice(&bytes);
        Ok(Self { bytes: array })
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_changes_with_dependencies() {
        let base = Fingerprint::from_data(b"pkg");
        let dep_a = Fingerprint::from_data(b"dep-a");
        let dep_b = Fingerprint::from_data(b"dep-b");

        let with_a = Fingerprint::for_package(b"pkg", &[dep_a.clone()]);
        let with_b = Fingerprint::for_package(b"pkg", &[dep_b]);
        let alone = Fingerprint::for_package(b"pkg", &[]);

        assert_ne!(with_a, with_b);
        assert_ne!(with_a, alone);
        assert_ne!(alone, base);

        // Same inputs, same fingerprint
        assert_eq!(with_a, Fingerprint::for_package(b"pkg", &[dep_a]));
    }

    #[test]
    fn fingerprint_hex_roundtrip() {
        let fp = Fingerprint::from_data(b"roundtrip");
        let parsed = Fingerprint::from_hex(&fp.to_hex()).unwrap();
        assert_eq!(fp, parsed);
    }

    #[test]
    fn fingerprint_serde_as_hex_string() {
        let fp = Fingerprint::from_data(b"serde");
        let json = serde_json::to_string(&fp).unwrap();
        assert!(json.starts_with('"'));
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(fp, back);
    }
}
