//! Append-only audit log records.
//!
//! A history row is written in the same transaction as the balance mutation it
//! describes and is never updated or deleted afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stockledger_core::{
    Actor, DomainError, DomainResult, HistoryEntryId, InboundPlanId, LocationId, ProductId,
    ShippingInstructionId,
};

use crate::balance::BalanceKey;
use crate::kind::OperationKind;
use crate::movement::Movement;
use crate::state::InventoryState;

/// Workflow document a history row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum HistoryReference {
    ShippingInstruction(ShippingInstructionId),
    InboundPlan(InboundPlanId),
}

impl HistoryReference {
    pub fn kind_str(&self) -> &'static str {
        match self {
            HistoryReference::ShippingInstruction(_) => "shipping_instruction",
            HistoryReference::InboundPlan(_) => "inbound_plan",
        }
    }

    pub fn uuid(&self) -> uuid::Uuid {
        match self {
            HistoryReference::ShippingInstruction(id) => *id.as_uuid(),
            HistoryReference::InboundPlan(id) => *id.as_uuid(),
        }
    }

    /// Rebuild from the two persisted columns.
    pub fn from_parts(kind: &str, id: uuid::Uuid) -> DomainResult<Self> {
        match kind {
            "shipping_instruction" => Ok(Self::ShippingInstruction(id.into())),
            "inbound_plan" => Ok(Self::InboundPlan(id.into())),
            other => Err(DomainError::validation(
                "reference",
                format!("unknown reference kind '{other}'"),
            )),
        }
    }
}

/// A history row before the store assigns its id and sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewHistoryEntry {
    pub kind: OperationKind,
    pub product_id: ProductId,
    /// Always the unsigned moved quantity; direction comes from the state columns.
    pub quantity: i64,
    pub from_location_id: Option<LocationId>,
    pub to_location_id: Option<LocationId>,
    pub from_state: Option<InventoryState>,
    pub to_state: Option<InventoryState>,
    /// Monetary amount in minor units (e.g. sale price).
    pub amount: Option<i64>,
    pub memo: Option<String>,
    pub reference: Option<HistoryReference>,
    pub actor_id: String,
    pub occurred_at: DateTime<Utc>,
}

impl NewHistoryEntry {
    /// Row describing a balance mutation.
    pub fn for_movement(
        kind: OperationKind,
        movement: &Movement,
        actor: &Actor,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            product_id: movement.product_id,
            quantity: movement.quantity,
            from_location_id: movement.from.map(|s| s.location_id),
            to_location_id: movement.to.map(|s| s.location_id),
            from_state: movement.from.map(|s| s.state),
            to_state: movement.to.map(|s| s.state),
            amount: None,
            memo: None,
            reference: None,
            actor_id: actor.id().to_string(),
            occurred_at,
        }
    }

    /// Row with no locations or states; never affects balances.
    pub fn informational(
        kind: OperationKind,
        product_id: ProductId,
        quantity: i64,
        actor: &Actor,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            product_id,
            quantity,
            from_location_id: None,
            to_location_id: None,
            from_state: None,
            to_state: None,
            amount: None,
            memo: None,
            reference: None,
            actor_id: actor.id().to_string(),
            occurred_at,
        }
    }

    pub fn with_memo(mut self, memo: Option<String>) -> Self {
        self.memo = memo.filter(|m| !m.trim().is_empty());
        self
    }

    pub fn with_amount(mut self, amount: Option<i64>) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_reference(mut self, reference: HistoryReference) -> Self {
        self.reference = Some(reference);
        self
    }
}

/// A persisted history row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: HistoryEntryId,
    /// Store-assigned, strictly increasing append order.
    pub sequence: i64,
    pub kind: OperationKind,
    pub product_id: ProductId,
    pub quantity: i64,
    pub from_location_id: Option<LocationId>,
    pub to_location_id: Option<LocationId>,
    pub from_state: Option<InventoryState>,
    pub to_state: Option<InventoryState>,
    pub amount: Option<i64>,
    pub memo: Option<String>,
    pub reference: Option<HistoryReference>,
    pub actor_id: String,
    pub occurred_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn recorded(id: HistoryEntryId, sequence: i64, entry: NewHistoryEntry) -> Self {
        Self {
            id,
            sequence,
            kind: entry.kind,
            product_id: entry.product_id,
            quantity: entry.quantity,
            from_location_id: entry.from_location_id,
            to_location_id: entry.to_location_id,
            from_state: entry.from_state,
            to_state: entry.to_state,
            amount: entry.amount,
            memo: entry.memo,
            reference: entry.reference,
            actor_id: entry.actor_id,
            occurred_at: entry.occurred_at,
        }
    }

    /// Balance this row decreased, if any.
    pub fn debit_key(&self) -> Option<BalanceKey> {
        Some(BalanceKey::new(
            self.product_id,
            self.from_location_id?,
            self.from_state?,
        ))
    }

    /// Balance this row increased, if any.
    pub fn credit_key(&self) -> Option<BalanceKey> {
        Some(BalanceKey::new(
            self.product_id,
            self.to_location_id?,
            self.to_state?,
        ))
    }
}

/// Filter for history reads; results come back newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryFilter {
    pub product_id: Option<ProductId>,
    /// Matches either side of a movement.
    pub location_id: Option<LocationId>,
    pub kind: Option<OperationKind>,
    pub limit: Option<usize>,
}

impl HistoryFilter {
    pub fn matches(&self, entry: &HistoryEntry) -> bool {
        self.product_id.is_none_or(|p| p == entry.product_id)
            && self.location_id.is_none_or(|l| {
                entry.from_location_id == Some(l) || entry.to_location_id == Some(l)
            })
            && self.kind.is_none_or(|k| k == entry.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sale(location: LocationId) -> HistoryEntry {
        let product = ProductId::new();
        let movement =
            Movement::in_place(product, location, Some(InventoryState::Normal), None, 3).unwrap();
        let entry = NewHistoryEntry::for_movement(
            OperationKind::Sale,
            &movement,
            &Actor::store("clerk-1"),
            Utc::now(),
        )
        .with_amount(Some(4_500))
        .with_memo(Some("  ".to_string()));
        HistoryEntry::recorded(HistoryEntryId::new(), 1, entry)
    }

    #[test]
    fn sale_records_only_the_source_side() {
        let location = LocationId::new();
        let entry = sale(location);
        assert_eq!(entry.quantity, 3);
        assert_eq!(entry.from_state, Some(InventoryState::Normal));
        assert_eq!(entry.to_state, None);
        assert!(entry.credit_key().is_none());
        assert_eq!(entry.debit_key().unwrap().location_id, location);
        assert_eq!(entry.amount, Some(4_500));
        assert_eq!(entry.memo, None);
    }

    #[test]
    fn location_filter_matches_either_side() {
        let location = LocationId::new();
        let entry = sale(location);
        let filter = HistoryFilter {
            location_id: Some(location),
            ..HistoryFilter::default()
        };
        assert!(filter.matches(&entry));
        let filter = HistoryFilter {
            kind: Some(OperationKind::ShipConfirmed),
            ..HistoryFilter::default()
        };
        assert!(!filter.matches(&entry));
    }

    #[test]
    fn reference_round_trips_through_columns() {
        let reference = HistoryReference::InboundPlan(InboundPlanId::new());
        let rebuilt = HistoryReference::from_parts(reference.kind_str(), reference.uuid()).unwrap();
        assert_eq!(rebuilt, reference);
        assert!(HistoryReference::from_parts("invoice", reference.uuid()).is_err());
    }
}
