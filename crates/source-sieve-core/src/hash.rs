//! Content hashing.
//!
//! A [`ContentHash`] identifies a file by content alone, independent of its
//! path or flat name. Trailing whitespace is trimmed before hashing so files
//! that differ only by a final newline compare equal.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 digest of trimmed file content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Wrap an already computed hex digest, e.g. one loaded from a hash list.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash file content with trailing whitespace trimmed.
pub fn hash_of(content: &str) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(content.trim_end().as_bytes());
    ContentHash(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable() {
        let a = hash_of("contract A {}");
        let b = hash_of("contract A {}");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_trailing_whitespace_ignored() {
        assert_eq!(hash_of("contract A {}"), hash_of("contract A {}\n\n  \t\r\n"));
    }

    #[test]
    fn test_leading_whitespace_and_inner_changes_matter() {
        let base = hash_of("contract A {}");
        assert_ne!(base, hash_of("  contract A {}"));
        assert_ne!(base, hash_of("contract  A {}"));
    }

    #[test]
    fn test_from_hex_normalizes_case() {
        let h = hash_of("x");
        let upper = h.as_str().to_ascii_uppercase();
        assert_eq!(ContentHash::from_hex(upper), h);
    }
}
