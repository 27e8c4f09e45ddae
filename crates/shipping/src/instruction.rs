use core::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockledger_catalog::{Location, LocationKind};
use stockledger_core::{
    Actor, ActorRole, DomainError, DomainResult, LocationId, ProductId, ShippingInstructionId,
    ensure_positive,
};
use stockledger_inventory::{InventoryState, Movement, Slot};

/// Instruction lifecycle: `pending` → `completed`, exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShippingStatus {
    Pending,
    Completed,
}

impl ShippingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShippingStatus::Pending => "pending",
            ShippingStatus::Completed => "completed",
        }
    }
}

impl FromStr for ShippingStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ShippingStatus::Pending),
            "completed" => Ok(ShippingStatus::Completed),
            other => Err(DomainError::validation(
                "status",
                format!("unknown shipping status '{other}'"),
            )),
        }
    }
}

/// Command: create a shipping instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateShippingInstruction {
    pub product_id: ProductId,
    pub source_location_id: LocationId,
    pub destination_location_id: LocationId,
    pub quantity: i64,
    pub requested_by: Option<NaiveDate>,
    pub memo: Option<String>,
    pub actor: Actor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingInstruction {
    pub id: ShippingInstructionId,
    pub product_id: ProductId,
    pub source_location_id: LocationId,
    pub destination_location_id: LocationId,
    pub quantity: i64,
    pub requested_by: Option<NaiveDate>,
    pub status: ShippingStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub completed_by: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ShippingInstruction {
    /// Record a transfer intent. Does not touch balances.
    pub fn create(
        id: ShippingInstructionId,
        cmd: &CreateShippingInstruction,
        at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        cmd.actor
            .ensure_role(&[ActorRole::Store], "create shipping instructions")?;
        ensure_positive("quantity", cmd.quantity)?;
        if cmd.source_location_id == cmd.destination_location_id {
            return Err(DomainError::validation(
                "destination_location_id",
                "source and destination must differ",
            ));
        }

        Ok(Self {
            id,
            product_id: cmd.product_id,
            source_location_id: cmd.source_location_id,
            destination_location_id: cmd.destination_location_id,
            quantity: cmd.quantity,
            requested_by: cmd.requested_by,
            status: ShippingStatus::Pending,
            created_by: cmd.actor.id().to_string(),
            created_at: at,
            completed_by: None,
            completed_at: None,
        })
    }

    /// Source must be an active warehouse, destination an active store.
    pub fn validate_route(source: &Location, destination: &Location) -> DomainResult<()> {
        source.ensure_kind(LocationKind::Warehouse, "source_location_id")?;
        destination.ensure_kind(LocationKind::Store, "destination_location_id")?;
        Ok(())
    }

    pub fn is_pending(&self) -> bool {
        self.status == ShippingStatus::Pending
    }

    pub fn ensure_pending(&self) -> DomainResult<()> {
        if !self.is_pending() {
            return Err(DomainError::invalid_state(format!(
                "shipping instruction {} is already {}",
                self.id,
                self.status.as_str()
            )));
        }
        Ok(())
    }

    /// NORMAL at the warehouse → NORMAL at the store.
    pub fn shipment(&self) -> DomainResult<Movement> {
        Movement::new(
            self.product_id,
            Some(Slot::new(self.source_location_id, InventoryState::Normal)),
            Some(Slot::new(self.destination_location_id, InventoryState::Normal)),
            self.quantity,
        )
    }

    /// Mark completed. Only a warehouse actor may confirm.
    pub fn complete(&mut self, actor: &Actor, at: DateTime<Utc>) -> DomainResult<()> {
        actor.ensure_role(&[ActorRole::Warehouse], "confirm shipping instructions")?;
        self.ensure_pending()?;
        self.status = ShippingStatus::Completed;
        self.completed_by = Some(actor.id().to_string());
        self.completed_at = Some(at);
        Ok(())
    }

    /// The (product, store) pair this instruction replenishes.
    pub fn targets(&self) -> (ProductId, LocationId) {
        (self.product_id, self.destination_location_id)
    }
}
