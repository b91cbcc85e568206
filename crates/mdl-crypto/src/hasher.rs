use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical::{to_canonical_vec, CanonicalError};

/// A 32-byte BLAKE3 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Digest([u8; 32]);

impl Digest {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 8 hex characters.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.short_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Domain-separated BLAKE3 hasher.
///
/// Each hasher carries a domain tag that is prepended to every hash
/// computation, so a write-set digest can never collide with a world-state
/// digest over the same bytes.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for the write set a transition produced on one replica.
    pub const WRITE_SET: Self = Self {
        domain: "mdl-write-set-v1",
    };
    /// Hasher for a replica's full world state.
    pub const WORLD_STATE: Self = Self {
        domain: "mdl-world-state-v1",
    };
    /// Hasher for a single canonical record.
    pub const RECORD: Self = Self {
        domain: "mdl-record-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> Digest {
        let mut hasher = self.start();
        hasher.update(data);
        Digest(*hasher.finalize().as_bytes())
    }

    /// Hash the canonical encoding of a JSON value.
    pub fn hash_canonical(&self, value: &Value) -> Result<Digest, CanonicalError> {
        Ok(self.hash(&to_canonical_vec(value)?))
    }

    /// Hash an ordered sequence of key/value entries.
    ///
    /// Keys and values are length-prefixed so adjacent entries cannot be
    /// re-split into a different sequence with the same bytes. `None`
    /// values (deletions) are tagged distinctly from empty values.
    pub fn hash_entries<'a, I>(&self, entries: I) -> Digest
    where
        I: IntoIterator<Item = (&'a str, Option<&'a [u8]>)>,
    {
        let mut hasher = self.start();
        for (key, value) in entries {
            hasher.update(&(key.len() as u64).to_le_bytes());
            hasher.update(key.as_bytes());
            match value {
                Some(bytes) => {
                    hasher.update(&[1]);
                    hasher.update(&(bytes.len() as u64).to_le_bytes());
                    hasher.update(bytes);
                }
                None => {
                    hasher.update(&[0]);
                }
            }
        }
        Digest(*hasher.finalize().as_bytes())
    }

    /// Verify that data produces the expected digest.
    pub fn verify(&self, data: &[u8], expected: &Digest) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }

    fn start(&self) -> blake3::Hasher {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher
    }
}
