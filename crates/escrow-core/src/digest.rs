//! # Content Digest
//!
//! `ContentDigest` identifies a payload by its SHA-256 hash, tagged with the
//! algorithm. Payload digests are computed only from [`CanonicalBytes`];
//! [`chain_digest`] links a digest to its predecessor to form the audit
//! hash chain.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::canonical::CanonicalBytes;

/// Domain separator mixed into every chain link.
const CHAIN_DOMAIN: &[u8] = b"sale-escrow/audit-chain/v1";

/// The hash algorithm that produced a digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DigestAlgorithm {
    /// SHA-256.
    Sha256,
}

impl DigestAlgorithm {
    /// The algorithm identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
        }
    }
}

impl std::fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A content digest with its algorithm tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest {
    /// The hash algorithm that produced this digest.
    pub algorithm: DigestAlgorithm,
    /// The raw 32-byte digest value.
    pub bytes: [u8; 32],
}

impl ContentDigest {
    /// Create a digest from raw bytes and algorithm.
    pub fn new(algorithm: DigestAlgorithm, bytes: [u8; 32]) -> Self {
        Self { algorithm, bytes }
    }

    /// Lowercase hex rendering of the digest bytes.
    pub fn to_hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_hex())
    }
}

/// SHA-256 digest of canonical bytes.
pub fn sha256_digest(data: &CanonicalBytes) -> ContentDigest {
    finish(Sha256::new_with_prefix(data.as_bytes()))
}

/// Digest of one audit chain link: the predecessor digest (32 zero bytes at
/// the head of the chain) followed by the link's own bytes.
pub fn chain_digest(previous: Option<&ContentDigest>, link: &[u8]) -> ContentDigest {
    let mut hasher = Sha256::new();
    hasher.update(CHAIN_DOMAIN);
    match previous {
        Some(prev) => hasher.update(prev.bytes),
        None => hasher.update([0u8; 32]),
    }
    hasher.update(link);
    finish(hasher)
}

fn finish(hasher: Sha256) -> ContentDigest {
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&hasher.finalize());
    ContentDigest::new(DigestAlgorithm::Sha256, bytes)
}
