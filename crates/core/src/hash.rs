//! Content fingerprints.

use sha2::{Digest, Sha256};
use std::fmt;

/// A SHA-256 content hash represented as 32 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Compute SHA-256 hash of data.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Self::hasher();
        hasher.update(data);
        hasher.finalize()
    }

    /// Create an incremental hasher.
    pub fn hasher() -> ContentHasher {
        ContentHasher(Sha256::new())
    }

    /// Encode as lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Leading `len` hex characters, used for collision-avoiding name suffixes.
    pub fn short_hex(&self, len: usize) -> String {
        let mut hex = self.to_hex();
        hex.truncate(len.min(64));
        hex
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short_hex(16))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Incremental SHA-256 hasher.
pub struct ContentHasher(Sha256);

impl ContentHasher {
    /// Update the hasher with data.
    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> ContentHash {
        ContentHash(self.0.finalize().into())
    }
}
