//! Cache keys

use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Key for cache lookups: the canonical form of a query
///
/// Produced by [`Canonicalizer`](crate::Canonicalizer). Keys can be large, so
/// log lines use [`CacheKey::checksum`] instead of the raw key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(Arc<str>);

impl CacheKey {
    /// Wrap an already canonical string
    pub fn from_canonical(canonical: impl Into<Arc<str>>) -> Self {
        Self(canonical.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Hex SHA-256 of the key
    pub fn checksum(&self) -> String {
        checksum(&self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercase hex SHA-256 of a string
pub fn checksum(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_is_stable() {
        let key = CacheKey::from_canonical("{\"a\":1}");
        assert_eq!(key.checksum(), checksum("{\"a\":1}"));
        assert_eq!(key.checksum().len(), 64);
        assert_ne!(key.checksum(), checksum("{\"a\":2}"));
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            checksum(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
