//! Ledger configuration.
//!
//! ```yaml
//! custody_account: escrow-vault
//! administrator: ops-admin
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use escrow_core::AccountId;

/// Invalid ledger configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The YAML document could not be parsed.
    #[error("failed to parse ledger config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The custody account and the administrator are the same account.
    #[error("custody account {account} must not also be the administrator")]
    VaultIsAdministrator {
        /// The account named twice.
        account: AccountId,
    },
}

/// Accounts the ledger is deployed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerConfig {
    /// The account the value rails treat as the ledger's vault: it receives
    /// native deposits and is the spender of token allowances.
    pub custody_account: AccountId,
    /// The deploying administrator. Holds no power over sales.
    pub administrator: AccountId,
}

impl LedgerConfig {
    /// Build a config in code.
    pub fn new(custody_account: AccountId, administrator: AccountId) -> Self {
        Self {
            custody_account,
            administrator,
        }
    }

    /// Parse and validate a YAML document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] for malformed YAML, unknown keys or invalid
    /// account ids; otherwise any error from [`LedgerConfig::validate`].
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the accounts are usable together.
    ///
    /// # Errors
    ///
    /// [`ConfigError::VaultIsAdministrator`] if both roles name one account.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.custody_account == self.administrator {
            return Err(ConfigError::VaultIsAdministrator {
                account: self.custody_account.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_yaml() {
        let config =
            LedgerConfig::from_yaml_str("custody_account: vault\nadministrator: admin\n").unwrap();
        assert_eq!(config.custody_account.as_str(), "vault");
        assert_eq!(config.administrator.as_str(), "admin");
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = LedgerConfig::from_yaml_str(
            "custody_account: vault\nadministrator: admin\nfee_bps: 10\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_invalid_account() {
        let err =
            LedgerConfig::from_yaml_str("custody_account: \"\"\nadministrator: admin\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_vault_as_administrator() {
        let err =
            LedgerConfig::from_yaml_str("custody_account: ops\nadministrator: ops\n").unwrap_err();
        assert!(matches!(err, ConfigError::VaultIsAdministrator { .. }));
        assert!(err.to_string().contains("ops"));
    }
}
