//! Append-only mapping of sale ids to sale records.
//!
//! Ids are allocated sequentially from 1 at insertion time. Records are
//! never removed; there is no delete operation.

use std::collections::BTreeMap;

use escrow_core::SaleId;

use crate::error::LedgerError;
use crate::sale::{Sale, SaleTerms};

/// The ledger's sale records.
#[derive(Debug, Clone, Default)]
pub struct SaleStore {
    sales: BTreeMap<SaleId, Sale>,
    last_id: Option<SaleId>,
}

impl SaleStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The id the next inserted sale will receive.
    ///
    /// # Errors
    ///
    /// [`LedgerError::SaleIdExhausted`] once `u64::MAX` has been issued.
    pub fn next_id(&self) -> Result<SaleId, LedgerError> {
        match self.last_id {
            None => Ok(SaleId::FIRST),
            Some(last) => last.next().ok_or(LedgerError::SaleIdExhausted),
        }
    }

    /// Open a `Pending` sale under the next id.
    pub(crate) fn insert(&mut self, terms: SaleTerms) -> Result<&Sale, LedgerError> {
        let id = self.next_id()?;
        self.last_id = Some(id);
        Ok(self.sales.entry(id).or_insert_with(|| Sale::open(id, terms)))
    }

    /// Look up a sale.
    pub fn get(&self, id: SaleId) -> Option<&Sale> {
        self.sales.get(&id)
    }

    pub(crate) fn require_mut(&mut self, id: SaleId) -> Result<&mut Sale, LedgerError> {
        self.sales.get_mut(&id).ok_or(LedgerError::SaleNotFound(id))
    }

    /// Number of sales ever created.
    pub fn len(&self) -> usize {
        self.sales.len()
    }

    /// Whether no sale has been created.
    pub fn is_empty(&self) -> bool {
        self.sales.is_empty()
    }

    /// All sales in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Sale> {
        self.sales.values()
    }
}
