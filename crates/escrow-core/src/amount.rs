//! # Amounts
//!
//! `Amount` is a quantity of value in the asset's smallest indivisible unit.
//! Integer only: canonicalization rejects floats, and custody accounting must
//! balance exactly.

use serde::{Deserialize, Serialize};

/// A non-negative quantity of an asset, in smallest units.
///
/// Zero is representable (balances, "no value attached"); whether zero is
/// acceptable is decided by the operation, e.g. a sale amount must be
/// positive.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    /// No value.
    pub const ZERO: Amount = Amount(0);

    /// Wrap a raw unit count.
    pub const fn new(units: u64) -> Self {
        Self(units)
    }

    /// The raw unit count.
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Whether this amount is zero.
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition; `None` on overflow.
    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    /// Checked subtraction; `None` if `rhs` exceeds `self`.
    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_sub(rhs.0).map(Amount)
    }
}

impl From<u64> for Amount {
    fn from(units: u64) -> Self {
        Self(units)
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
