//! Events emitted by the ledger, one per committed mutation.

use serde::{Deserialize, Serialize};

use escrow_core::{AccountId, Amount, SaleId};

use crate::sale::Asset;

/// A committed ledger mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SaleEvent {
    /// A sale was opened and its value taken into custody.
    SaleCreated {
        sale_id: SaleId,
        buyer: AccountId,
        seller: AccountId,
        amount: Amount,
        asset: Asset,
    },
    /// The value was released to the seller.
    SaleCompleted { sale_id: SaleId },
    /// The value was refunded to the buyer.
    SaleCancelled { sale_id: SaleId },
    /// A dispute was raised and an arbiter named.
    SaleDisputed { sale_id: SaleId },
    /// The arbiter awarded the value to `winner`.
    DisputeResolved { sale_id: SaleId, winner: AccountId },
}

impl SaleEvent {
    /// The sale this event concerns.
    pub fn sale_id(&self) -> SaleId {
        match self {
            Self::SaleCreated { sale_id, .. }
            | Self::SaleCompleted { sale_id }
            | Self::SaleCancelled { sale_id }
            | Self::SaleDisputed { sale_id }
            | Self::DisputeResolved { sale_id, .. } => *sale_id,
        }
    }

    /// The event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SaleCreated { .. } => "SaleCreated",
            Self::SaleCompleted { .. } => "SaleCompleted",
            Self::SaleCancelled { .. } => "SaleCancelled",
            Self::SaleDisputed { .. } => "SaleDisputed",
            Self::DisputeResolved { .. } => "DisputeResolved",
        }
    }
}

impl std::fmt::Display for SaleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), self.sale_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_event_tag() {
        let event = SaleEvent::DisputeResolved {
            sale_id: SaleId::new(3).unwrap(),
            winner: AccountId::new("alice").unwrap(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "dispute_resolved");
        assert_eq!(json["sale_id"], 3);
        assert_eq!(json["winner"], "alice");

        let back: SaleEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn name_and_display() {
        let event = SaleEvent::SaleCompleted {
            sale_id: SaleId::FIRST,
        };
        assert_eq!(event.name(), "SaleCompleted");
        assert_eq!(event.to_string(), "SaleCompleted(sale:1)");
    }

    #[test]
    fn rejects_zero_sale_id() {
        let json = serde_json::json!({
            "event": "sale_completed",
            "sale_id": 0,
        });
        assert!(serde_json::from_value::<SaleEvent>(json).is_err());
    }
}
