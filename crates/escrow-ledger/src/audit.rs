//! # Event Audit Trail
//!
//! Every committed ledger mutation is recorded as an [`AuditEntry`] in an
//! append-only [`AuditTrail`]. Entries are hash-chained: each one stores the
//! digest of its predecessor, and its own digest covers that link, its
//! sequence number, its timestamp and the SHA-256 of the event's canonical
//! JSON. Rewriting or dropping any entry breaks [`AuditTrail::verify`].
//!
//! Recording is split in two so that the fallible half can run before any
//! value moves: [`AuditTrail::prepare`] canonicalizes and digests the event,
//! [`AuditTrail::append`] links and stores it and cannot fail.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use escrow_core::{
    chain_digest, sha256_digest, CanonicalBytes, CanonicalizationError, ContentDigest, Timestamp,
};

use crate::event::SaleEvent;

/// A tamper-evidence failure found by [`AuditTrail::verify`].
#[derive(Error, Debug)]
pub enum AuditError {
    /// Sequence numbers are not contiguous from 1.
    #[error("audit sequence gap: expected {expected}, found {found}")]
    SequenceGap {
        /// The sequence number that should appear.
        expected: u64,
        /// The sequence number that does.
        found: u64,
    },

    /// The stored payload digest does not match the event.
    #[error("audit entry {sequence}: event does not match its payload digest")]
    PayloadMismatch {
        /// The offending entry.
        sequence: u64,
    },

    /// The entry does not point at its predecessor's digest.
    #[error("audit entry {sequence}: link to predecessor is broken")]
    BrokenLink {
        /// The offending entry.
        sequence: u64,
    },

    /// The entry's own digest does not match its contents.
    #[error("audit entry {sequence}: digest mismatch")]
    DigestMismatch {
        /// The offending entry.
        sequence: u64,
    },

    /// An event could not be canonicalized during verification.
    #[error("audit canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),
}

/// One recorded event and its position in the hash chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position in the trail, starting at 1.
    pub sequence: u64,
    /// The recorded event.
    pub event: SaleEvent,
    /// When the entry was appended.
    pub recorded_at: Timestamp,
    /// SHA-256 of the event's canonical JSON.
    pub payload_digest: ContentDigest,
    /// Digest of the preceding entry; `None` for the first.
    pub previous: Option<ContentDigest>,
    /// Chain digest over `previous` and this entry's link bytes.
    pub digest: ContentDigest,
}

impl AuditEntry {
    fn link_bytes(sequence: u64, recorded_at: &Timestamp, payload: &ContentDigest) -> Vec<u8> {
        format!("{sequence}|{recorded_at}|{}", payload.to_hex()).into_bytes()
    }
}

/// An event that has been canonicalized and digested but not yet appended.
#[derive(Debug, Clone)]
pub struct PreparedEvent {
    event: SaleEvent,
    payload_digest: ContentDigest,
}

impl PreparedEvent {
    #[cfg(test)]
    fn event(&self) -> &SaleEvent {
        &self.event
    }
}

/// Append-only, hash-chained record of ledger events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditTrail {
    entries: Vec<AuditEntry>,
}

impl AuditTrail {
    /// An empty trail.
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonicalize and digest `event` ahead of appending it.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalizationError`] if the event cannot be
    /// canonicalized.
    pub fn prepare(&self, event: SaleEvent) -> Result<PreparedEvent, CanonicalizationError> {
        let payload_digest = sha256_digest(&CanonicalBytes::new(&event)?);
        Ok(PreparedEvent {
            event,
            payload_digest,
        })
    }

    /// Link a prepared event onto the head of the chain.
    pub fn append(&mut self, prepared: PreparedEvent) -> &AuditEntry {
        let sequence = self.entries.len() as u64 + 1;
        let recorded_at = Timestamp::now();
        let previous = self.head().cloned();
        let link = AuditEntry::link_bytes(sequence, &recorded_at, &prepared.payload_digest);
        let digest = chain_digest(previous.as_ref(), &link);
        let index = self.entries.len();
        self.entries.push(AuditEntry {
            sequence,
            event: prepared.event,
            recorded_at,
            payload_digest: prepared.payload_digest,
            previous,
            digest,
        });
        &self.entries[index]
    }

    #[cfg(test)]
    fn record(&mut self, event: SaleEvent) -> Result<&AuditEntry, CanonicalizationError> {
        let prepared = self.prepare(event)?;
        Ok(self.append(prepared))
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Digest of the newest entry.
    pub fn head(&self) -> Option<&ContentDigest> {
        self.entries.last().map(|entry| &entry.digest)
    }

    /// Recompute every digest and link, oldest first.
    ///
    /// # Errors
    ///
    /// Returns the first [`AuditError`] found.
    pub fn verify(&self) -> Result<(), AuditError> {
        let mut previous: Option<&ContentDigest> = None;
        for (index, entry) in self.entries.iter().enumerate() {
            let expected = index as u64 + 1;
            if entry.sequence != expected {
                return Err(AuditError::SequenceGap {
                    expected,
                    found: entry.sequence,
                });
            }
            let payload = sha256_digest(&CanonicalBytes::new(&entry.event)?);
            if payload != entry.payload_digest {
                return Err(AuditError::PayloadMismatch {
                    sequence: entry.sequence,
                });
            }
            if entry.previous.as_ref() != previous {
                return Err(AuditError::BrokenLink {
                    sequence: entry.sequence,
                });
            }
            let link = AuditEntry::link_bytes(entry.sequence, &entry.recorded_at, &payload);
            if chain_digest(previous, &link) != entry.digest {
                return Err(AuditError::DigestMismatch {
                    sequence: entry.sequence,
                });
            }
            previous = Some(&entry.digest);
        }
        Ok(())
    }
}
