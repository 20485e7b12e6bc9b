//! # Error Types
//!
//! Errors raised while constructing core primitives. All errors use
//! `thiserror` for derive-based `Display` and `Error` implementations.

use thiserror::Error;

/// Rejection of a malformed primitive value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// An account or token identifier failed validation.
    #[error("invalid {kind} identifier {value:?}: {reason}")]
    InvalidIdentifier {
        /// Which identifier namespace was being constructed.
        kind: &'static str,
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Sale ids start at 1.
    #[error("sale id must be positive")]
    ZeroSaleId,
}

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Float values are not permitted in canonical representations.
    /// Amounts must be integers.
    #[error("float values are not permitted in canonical representations: {0}")]
    FloatRejected(f64),

    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}
