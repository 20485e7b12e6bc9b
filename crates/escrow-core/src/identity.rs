//! # Domain Identity Newtypes
//!
//! Newtype wrappers for every identifier the ledger handles. These prevent
//! accidental identifier confusion: you cannot pass a `TokenRef` where an
//! `AccountId` is expected, and a `SaleId` is never a bare integer.
//!
//! ## Security Invariant
//!
//! Authorization compares identifiers by exact equality. Identifiers are
//! validated at construction (and on deserialization), so two spellings of
//! "the same" party cannot both exist: no surrounding whitespace, no control
//! characters, no empty strings.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Maximum accepted length of an account or token identifier, in bytes.
pub const MAX_IDENTIFIER_LEN: usize = 128;

fn validate_identifier(kind: &'static str, value: &str) -> Result<(), CoreError> {
    let reject = |reason| CoreError::InvalidIdentifier {
        kind,
        value: value.to_string(),
        reason,
    };
    if value.is_empty() {
        return Err(reject("must not be empty"));
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(reject("exceeds 128 bytes"));
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(reject("must not contain whitespace or control characters"));
    }
    Ok(())
}

/// Identity of a party: a buyer, seller, arbiter, administrator, or the
/// ledger's own custody account.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    /// Create a validated account identifier.
    pub fn new(value: impl Into<String>) -> Result<Self, CoreError> {
        let value = value.into();
        validate_identifier("account", &value)?;
        Ok(Self(value))
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AccountId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.0
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to a fungible-token contract.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenRef(String);

impl TokenRef {
    /// Create a validated token reference.
    pub fn new(value: impl Into<String>) -> Result<Self, CoreError> {
        let value = value.into();
        validate_identifier("token", &value)?;
        Ok(Self(value))
    }

    /// The reference as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TokenRef {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TokenRef> for String {
    fn from(token: TokenRef) -> Self {
        token.0
    }
}

impl std::fmt::Display for TokenRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "token:{}", self.0)
    }
}

/// Sequential sale identifier. The first sale is `1`; zero is never issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct SaleId(u64);

impl SaleId {
    /// The identifier assigned to the first sale of a ledger.
    pub const FIRST: SaleId = SaleId(1);

    /// Create a sale id, rejecting zero.
    pub fn new(value: u64) -> Result<Self, CoreError> {
        if value == 0 {
            return Err(CoreError::ZeroSaleId);
        }
        Ok(Self(value))
    }

    /// The raw integer value.
    pub fn get(&self) -> u64 {
        self.0
    }

    /// The id following this one, or `None` once the space is exhausted.
    pub fn next(&self) -> Option<SaleId> {
        self.0.checked_add(1).map(SaleId)
    }
}

impl TryFrom<u64> for SaleId {
    type Error = CoreError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SaleId> for u64 {
    fn from(id: SaleId) -> Self {
        id.0
    }
}

impl std::fmt::Display for SaleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sale:{}", self.0)
    }
}
