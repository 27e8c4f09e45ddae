//! Warehouse → store shipping instructions.

use chrono::Utc;
use tracing::{info, instrument};

use stockledger_core::{Actor, ActorRole, ShippingInstructionId};
use stockledger_inventory::{HistoryReference, NewHistoryEntry, OperationKind};
use stockledger_shipping::{CreateShippingInstruction, ShippingInstruction};

use super::{LedgerEngine, load_location, load_product, move_stock};
use crate::error::{LedgerError, LedgerResult};
use crate::store::{LedgerStore, LedgerTx};

/// Validate and persist a new instruction inside an open transaction.
///
/// Records intent only: balances are untouched, one informational
/// `ship-request-created` row is appended. Holds the (product, destination)
/// lock until the transaction ends.
pub(super) async fn create_shipping_instruction_in(
    tx: &mut dyn LedgerTx,
    cmd: &CreateShippingInstruction,
) -> LedgerResult<ShippingInstruction> {
    let now = Utc::now();
    let instruction = ShippingInstruction::create(ShippingInstructionId::new(), cmd, now)?;

    load_product(tx, cmd.product_id).await?.ensure_active()?;
    let source = load_location(tx, cmd.source_location_id).await?;
    let destination = load_location(tx, cmd.destination_location_id).await?;
    ShippingInstruction::validate_route(&source, &destination)?;

    let (product_id, destination_id) = instruction.targets();
    tx.lock_shipping_target(product_id, destination_id).await?;
    tx.insert_shipping_instruction(&instruction).await?;
    tx.append_history(
        NewHistoryEntry::informational(
            OperationKind::ShipRequestCreated,
            instruction.product_id,
            instruction.quantity,
            &cmd.actor,
            now,
        )
        .with_memo(cmd.memo.clone())
        .with_reference(HistoryReference::ShippingInstruction(instruction.id)),
    )
    .await?;

    Ok(instruction)
}

impl<S: LedgerStore> LedgerEngine<S> {
    #[instrument(
        skip(self, cmd),
        fields(
            product_id = %cmd.product_id,
            source = %cmd.source_location_id,
            destination = %cmd.destination_location_id,
            quantity = cmd.quantity
        )
    )]
    pub async fn create_shipping_instruction(
        &self,
        cmd: CreateShippingInstruction,
    ) -> LedgerResult<ShippingInstruction> {
        let cmd = &cmd;
        self.with_retry("create_shipping_instruction", move || {
            self.try_create_shipping_instruction(cmd)
        })
        .await
    }

    async fn try_create_shipping_instruction(
        &self,
        cmd: &CreateShippingInstruction,
    ) -> LedgerResult<ShippingInstruction> {
        let mut tx = self.store.begin().await?;
        let instruction = create_shipping_instruction_in(tx.as_mut(), cmd).await?;
        tx.commit().await?;

        info!(
            shipping_instruction_id = %instruction.id,
            actor = %cmd.actor,
            "shipping instruction created"
        );
        Ok(instruction)
    }

    /// Move the stock and complete the instruction in one transaction.
    ///
    /// Insufficient NORMAL stock at the source leaves the instruction pending
    /// and every balance unchanged. A completed instruction is rejected with
    /// `InvalidState`.
    #[instrument(skip(self, actor), fields(shipping_instruction_id = %id, actor = %actor))]
    pub async fn confirm_shipping_instruction(
        &self,
        id: ShippingInstructionId,
        actor: &Actor,
    ) -> LedgerResult<ShippingInstruction> {
        self.with_retry("confirm_shipping_instruction", move || {
            self.try_confirm_shipping_instruction(id, actor)
        })
        .await
    }

    async fn try_confirm_shipping_instruction(
        &self,
        id: ShippingInstructionId,
        actor: &Actor,
    ) -> LedgerResult<ShippingInstruction> {
        actor.ensure_role(&[ActorRole::Warehouse], "confirm shipping instructions")?;

        let mut tx = self.store.begin().await?;
        let mut instruction = tx
            .shipping_instruction_for_update(id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("shipping instruction {id}")))?;
        instruction.ensure_pending()?;

        let now = Utc::now();
        let shipment = instruction.shipment()?;
        move_stock(tx.as_mut(), &shipment, now).await?;

        instruction.complete(actor, now)?;
        tx.update_shipping_instruction(&instruction).await?;
        tx.append_history(
            NewHistoryEntry::for_movement(OperationKind::ShipConfirmed, &shipment, actor, now)
                .with_reference(HistoryReference::ShippingInstruction(instruction.id)),
        )
        .await?;
        tx.commit().await?;

        info!(
            product_id = %instruction.product_id,
            quantity = instruction.quantity,
            "shipping instruction confirmed"
        );
        Ok(instruction)
    }
}
