//! Content digests.
//!
//! Alleles are keyed by the SHA-256 digest of their canonicalised source
//! text (spec §3: "digest is a pure function of source"). [`Digest`] is a
//! thin newtype over the 32-byte hash, following the hex-digest pattern of
//! `housaky-core::types::EntityId`.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use sha2::{Digest as _, Sha256};

/// A 32-byte SHA-256 digest, rendered as lowercase hex.
///
/// Serializes as its hex string (not a byte array) so it can be used
/// directly as a `serde_json`/`toml` map key and so `index.json` and
/// `phenotype.toml` stay hand-readable, per spec.md §6.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest([u8; 32]);

impl serde::Serialize for Digest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for Digest {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(|_| D::Error::custom("invalid digest hex"))
    }
}

impl Digest {
    /// Wrap raw bytes without hashing.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Compute the digest of already-canonicalised source text.
    pub fn of_source(canonical_source: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(canonical_source.as_bytes());
        let out = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&out);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

/// Canonicalise source text before hashing: normalise line endings, strip
/// trailing whitespace per line, and drop trailing blank lines. Two alleles
/// whose source differs only by this cosmetic noise hash identically, which
/// is what makes `put` deduplication meaningful in practice.
pub fn canonicalise(source: &str) -> String {
    let normalized = source.replace("\r\n", "\n");
    let mut lines: Vec<&str> = normalized.lines().map(str::trim_end).collect();
    while matches!(lines.last(), Some(l) if l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_source_same_digest() {
        let a = Digest::of_source(&canonicalise("fn x() {}\n"));
        let b = Digest::of_source(&canonicalise("fn x() {}\r\n\n\n"));
        assert_eq!(a, b);
    }

    #[test]
    fn different_source_different_digest() {
        let a = Digest::of_source(&canonicalise("a"));
        let b = Digest::of_source(&canonicalise("b"));
        assert_ne!(a, b);
    }

    #[test]
    fn hex_round_trip() {
        let d = Digest::of_source("hello");
        let hex = d.to_hex();
        let parsed: Digest = hex.parse().unwrap();
        assert_eq!(d, parsed);
    }
}
