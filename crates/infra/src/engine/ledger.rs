//! Stock movements: adjustments, transfers, reservations and returns.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use stockledger_catalog::LocationKind;
use stockledger_core::{Actor, ActorRole, DomainError, LocationId, ProductId};
use stockledger_inventory::{
    GradedQuantity, HistoryEntry, InventoryState, Movement, NewHistoryEntry, OperationKind, Slot,
};

use super::{LedgerEngine, load_location, load_product, record_movement};
use crate::error::LedgerResult;
use crate::store::LedgerStore;

/// Single-location adjustment.
///
/// `from_state` only: decrease. `to_state` only: increase. Both: state change
/// in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustInventory {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub from_state: Option<InventoryState>,
    pub to_state: Option<InventoryState>,
    pub quantity: i64,
    pub kind: OperationKind,
    pub memo: Option<String>,
    pub amount: Option<i64>,
    pub actor: Actor,
}

/// Cross-location movement written as one history row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferInventory {
    pub product_id: ProductId,
    pub from_location_id: LocationId,
    pub from_state: InventoryState,
    pub to_location_id: LocationId,
    pub to_state: InventoryState,
    pub quantity: i64,
    pub kind: OperationKind,
    pub memo: Option<String>,
    pub actor: Actor,
}

/// Grade returned goods waiting in IN_INSPECTION.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectReturn {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub good_quantity: i64,
    pub defective_quantity: i64,
    pub memo: Option<String>,
    pub actor: Actor,
}

/// Store sends NORMAL stock back to a warehouse for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreReturn {
    pub product_id: ProductId,
    pub store_location_id: LocationId,
    pub warehouse_location_id: LocationId,
    pub quantity: i64,
    pub memo: Option<String>,
    pub actor: Actor,
}

fn ensure_moves_stock(kind: OperationKind) -> Result<(), DomainError> {
    if kind.is_informational() {
        return Err(DomainError::validation(
            "kind",
            format!("{kind} does not move stock"),
        ));
    }
    Ok(())
}

impl<S: LedgerStore> LedgerEngine<S> {
    /// Atomic single-location adjustment with exactly one history row.
    #[instrument(
        skip(self, cmd),
        fields(
            product_id = %cmd.product_id,
            location_id = %cmd.location_id,
            kind = %cmd.kind,
            quantity = cmd.quantity
        )
    )]
    pub async fn adjust(&self, cmd: AdjustInventory) -> LedgerResult<HistoryEntry> {
        let cmd = &cmd;
        self.with_retry("adjust", move || self.try_adjust(cmd)).await
    }

    async fn try_adjust(&self, cmd: &AdjustInventory) -> LedgerResult<HistoryEntry> {
        cmd.actor.ensure_identified()?;
        ensure_moves_stock(cmd.kind)?;
        let movement = Movement::in_place(
            cmd.product_id,
            cmd.location_id,
            cmd.from_state,
            cmd.to_state,
            cmd.quantity,
        )?;

        let mut tx = self.store.begin().await?;
        load_product(tx.as_mut(), cmd.product_id).await?;
        load_location(tx.as_mut(), cmd.location_id).await?;

        let entry = NewHistoryEntry::for_movement(cmd.kind, &movement, &cmd.actor, Utc::now())
            .with_memo(cmd.memo.clone())
            .with_amount(cmd.amount);
        let recorded = record_movement(tx.as_mut(), &movement, entry).await?;
        tx.commit().await?;

        info!(
            sequence = recorded.sequence,
            actor = %cmd.actor,
            "inventory adjusted"
        );
        Ok(recorded)
    }

    #[instrument(
        skip(self, cmd),
        fields(
            product_id = %cmd.product_id,
            from = %cmd.from_location_id,
            to = %cmd.to_location_id,
            quantity = cmd.quantity
        )
    )]
    pub async fn transfer(&self, cmd: TransferInventory) -> LedgerResult<HistoryEntry> {
        let cmd = &cmd;
        self.with_retry("transfer", move || self.try_transfer(cmd)).await
    }

    async fn try_transfer(&self, cmd: &TransferInventory) -> LedgerResult<HistoryEntry> {
        cmd.actor.ensure_identified()?;
        ensure_moves_stock(cmd.kind)?;
        let movement = Movement::new(
            cmd.product_id,
            Some(Slot::new(cmd.from_location_id, cmd.from_state)),
            Some(Slot::new(cmd.to_location_id, cmd.to_state)),
            cmd.quantity,
        )?;

        let mut tx = self.store.begin().await?;
        load_product(tx.as_mut(), cmd.product_id).await?;
        load_location(tx.as_mut(), cmd.from_location_id).await?;
        load_location(tx.as_mut(), cmd.to_location_id).await?;

        let entry = NewHistoryEntry::for_movement(cmd.kind, &movement, &cmd.actor, Utc::now())
            .with_memo(cmd.memo.clone());
        let recorded = record_movement(tx.as_mut(), &movement, entry).await?;
        tx.commit().await?;

        info!(sequence = recorded.sequence, kind = %cmd.kind, "inventory transferred");
        Ok(recorded)
    }

    /// NORMAL → RESERVED at a warehouse. A plain adjustment, not a workflow step.
    #[instrument(skip_all, fields(product_id = %product_id, location_id = %location_id, quantity = quantity))]
    pub async fn reserve(
        &self,
        product_id: ProductId,
        location_id: LocationId,
        quantity: i64,
        memo: Option<String>,
        actor: &Actor,
    ) -> LedgerResult<HistoryEntry> {
        let memo = memo.as_deref();
        self.with_retry("reserve", move || {
            self.try_reserve(product_id, location_id, quantity, memo, actor)
        })
        .await
    }

    async fn try_reserve(
        &self,
        product_id: ProductId,
        location_id: LocationId,
        quantity: i64,
        memo: Option<&str>,
        actor: &Actor,
    ) -> LedgerResult<HistoryEntry> {
        actor.ensure_role(&[ActorRole::Warehouse], "reserve stock")?;
        let movement = Movement::in_place(
            product_id,
            location_id,
            Some(InventoryState::Normal),
            Some(InventoryState::Reserved),
            quantity,
        )?;

        let mut tx = self.store.begin().await?;
        load_product(tx.as_mut(), product_id).await?;
        load_location(tx.as_mut(), location_id)
            .await?
            .ensure_kind(LocationKind::Warehouse, "location_id")?;

        let entry = NewHistoryEntry::for_movement(OperationKind::Reserve, &movement, actor, Utc::now())
            .with_memo(memo.map(str::to_string));
        let recorded = record_movement(tx.as_mut(), &movement, entry).await?;
        tx.commit().await?;

        info!(quantity, actor = %actor, "stock reserved");
        Ok(recorded)
    }

    /// IN_INSPECTION → NORMAL (good) and → DEFECTIVE (defective); one history
    /// row per non-zero part.
    #[instrument(skip(self, cmd), fields(product_id = %cmd.product_id, location_id = %cmd.location_id))]
    pub async fn inspect_return(&self, cmd: InspectReturn) -> LedgerResult<Vec<HistoryEntry>> {
        let cmd = &cmd;
        self.with_retry("inspect_return", move || self.try_inspect_return(cmd))
            .await
    }

    async fn try_inspect_return(&self, cmd: &InspectReturn) -> LedgerResult<Vec<HistoryEntry>> {
        cmd.actor
            .ensure_role(&[ActorRole::Warehouse], "inspect returns")?;
        let graded = GradedQuantity::new(cmd.good_quantity, cmd.defective_quantity)?;
        let movements = graded.movements_from(
            cmd.product_id,
            cmd.location_id,
            InventoryState::InInspection,
        )?;

        let mut tx = self.store.begin().await?;
        load_product(tx.as_mut(), cmd.product_id).await?;
        load_location(tx.as_mut(), cmd.location_id)
            .await?
            .ensure_active()?;

        let now = Utc::now();
        let mut recorded = Vec::with_capacity(movements.len());
        for movement in &movements {
            let entry =
                NewHistoryEntry::for_movement(OperationKind::ReturnInspected, movement, &cmd.actor, now)
                    .with_memo(cmd.memo.clone());
            recorded.push(record_movement(tx.as_mut(), movement, entry).await?);
        }
        tx.commit().await?;

        info!(
            good = graded.good,
            defective = graded.defective,
            "returned stock inspected"
        );
        Ok(recorded)
    }

    /// Store NORMAL → warehouse IN_INSPECTION.
    #[instrument(
        skip(self, cmd),
        fields(
            product_id = %cmd.product_id,
            store = %cmd.store_location_id,
            warehouse = %cmd.warehouse_location_id
        )
    )]
    pub async fn send_store_return(&self, cmd: StoreReturn) -> LedgerResult<HistoryEntry> {
        let cmd = &cmd;
        self.with_retry("send_store_return", move || self.try_send_store_return(cmd))
            .await
    }

    async fn try_send_store_return(&self, cmd: &StoreReturn) -> LedgerResult<HistoryEntry> {
        cmd.actor.ensure_role(&[ActorRole::Store], "send store returns")?;
        let movement = Movement::new(
            cmd.product_id,
            Some(Slot::new(cmd.store_location_id, InventoryState::Normal)),
            Some(Slot::new(
                cmd.warehouse_location_id,
                InventoryState::InInspection,
            )),
            cmd.quantity,
        )?;

        let mut tx = self.store.begin().await?;
        load_product(tx.as_mut(), cmd.product_id).await?;
        load_location(tx.as_mut(), cmd.store_location_id)
            .await?
            .ensure_kind(LocationKind::Store, "store_location_id")?;
        load_location(tx.as_mut(), cmd.warehouse_location_id)
            .await?
            .ensure_kind(LocationKind::Warehouse, "warehouse_location_id")?;

        let entry =
            NewHistoryEntry::for_movement(OperationKind::StoreReturnSent, &movement, &cmd.actor, Utc::now())
                .with_memo(cmd.memo.clone());
        let recorded = record_movement(tx.as_mut(), &movement, entry).await?;
        tx.commit().await?;

        info!(quantity = cmd.quantity, "store return sent");
        Ok(recorded)
    }
}
