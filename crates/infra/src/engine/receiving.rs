//! Inbound plans and goods receipt.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use stockledger_catalog::LocationKind;
use stockledger_core::{Actor, ActorRole, InboundPlanId, LocationId};
use stockledger_inventory::{GradedQuantity, HistoryReference, NewHistoryEntry, OperationKind};
use stockledger_purchasing::{CreateInboundPlan, InboundPlan};

use super::{LedgerEngine, load_location, load_product, record_movement};
use crate::error::{LedgerError, LedgerResult};
use crate::store::{LedgerStore, LedgerTx};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveInboundPlan {
    pub plan_id: InboundPlanId,
    pub good_quantity: i64,
    pub defective_quantity: i64,
    /// Warehouse shelf the goods are put on.
    pub shelf_location_id: LocationId,
    pub memo: Option<String>,
    pub actor: Actor,
}

pub(super) async fn create_inbound_plan_in(
    tx: &mut dyn LedgerTx,
    cmd: &CreateInboundPlan,
) -> LedgerResult<InboundPlan> {
    let plan = InboundPlan::create(InboundPlanId::new(), cmd, Utc::now())?;
    load_product(tx, cmd.product_id).await?.ensure_active()?;
    tx.insert_inbound_plan(&plan).await?;
    Ok(plan)
}

async fn lock_plan(tx: &mut dyn LedgerTx, id: InboundPlanId) -> LedgerResult<InboundPlan> {
    tx.inbound_plan_for_update(id)
        .await?
        .ok_or_else(|| LedgerError::not_found(format!("inbound plan {id}")))
}

impl<S: LedgerStore> LedgerEngine<S> {
    #[instrument(
        skip(self, cmd),
        fields(product_id = %cmd.product_id, planned_quantity = cmd.planned_quantity)
    )]
    pub async fn create_inbound_plan(&self, cmd: CreateInboundPlan) -> LedgerResult<InboundPlan> {
        let cmd = &cmd;
        self.with_retry("create_inbound_plan", move || self.try_create_inbound_plan(cmd))
            .await
    }

    async fn try_create_inbound_plan(&self, cmd: &CreateInboundPlan) -> LedgerResult<InboundPlan> {
        let mut tx = self.store.begin().await?;
        let plan = create_inbound_plan_in(tx.as_mut(), cmd).await?;
        tx.commit().await?;

        info!(inbound_plan_id = %plan.id, supplier = %plan.supplier, "inbound plan created");
        Ok(plan)
    }

    /// Put received goods on a warehouse shelf: good units into NORMAL,
    /// defective units into DEFECTIVE, one `goods-received` row per part.
    /// The plan completes once the received total reaches the planned quantity.
    #[instrument(
        skip(self, cmd),
        fields(
            inbound_plan_id = %cmd.plan_id,
            good = cmd.good_quantity,
            defective = cmd.defective_quantity
        )
    )]
    pub async fn receive_inbound_plan(&self, cmd: ReceiveInboundPlan) -> LedgerResult<InboundPlan> {
        let cmd = &cmd;
        self.with_retry("receive_inbound_plan", move || self.try_receive(cmd))
            .await
    }

    async fn try_receive(&self, cmd: &ReceiveInboundPlan) -> LedgerResult<InboundPlan> {
        cmd.actor
            .ensure_role(&[ActorRole::Warehouse], "receive inbound plans")?;
        let graded = GradedQuantity::new(cmd.good_quantity, cmd.defective_quantity)?;

        let mut tx = self.store.begin().await?;
        let mut plan = lock_plan(tx.as_mut(), cmd.plan_id).await?;
        load_location(tx.as_mut(), cmd.shelf_location_id)
            .await?
            .ensure_kind(LocationKind::Warehouse, "shelf_location_id")?;

        let now = Utc::now();
        plan.record_receipt(&graded, now)?;

        let reference = HistoryReference::InboundPlan(plan.id);
        for movement in graded.movements_into(plan.product_id, cmd.shelf_location_id)? {
            let entry =
                NewHistoryEntry::for_movement(OperationKind::GoodsReceived, &movement, &cmd.actor, now)
                    .with_memo(cmd.memo.clone())
                    .with_reference(reference);
            record_movement(tx.as_mut(), &movement, entry).await?;
        }

        tx.update_inbound_plan(&plan).await?;
        tx.commit().await?;

        info!(
            received = plan.received_quantity,
            planned = plan.planned_quantity,
            status = plan.status.as_str(),
            "inbound plan received"
        );
        Ok(plan)
    }

    /// pending → canceled. Balances are untouched.
    #[instrument(skip(self, actor), fields(inbound_plan_id = %id))]
    pub async fn cancel_inbound_plan(
        &self,
        id: InboundPlanId,
        actor: &Actor,
    ) -> LedgerResult<InboundPlan> {
        self.with_retry("cancel_inbound_plan", move || self.try_cancel(id, actor))
            .await
    }

    async fn try_cancel(&self, id: InboundPlanId, actor: &Actor) -> LedgerResult<InboundPlan> {
        let mut tx = self.store.begin().await?;
        let mut plan = lock_plan(tx.as_mut(), id).await?;
        plan.cancel(actor, Utc::now())?;
        tx.update_inbound_plan(&plan).await?;
        tx.commit().await?;

        info!(actor = %actor, "inbound plan canceled");
        Ok(plan)
    }
}
